//! Paragraph-level reading of Word (`.docx`) documents.
//!
//! A `.docx` file is a ZIP package whose main part, `word/document.xml`,
//! holds the body as a sequence of `w:p` paragraphs. Only direct children
//! of `w:body` count as paragraphs: table cells and text boxes are skipped,
//! which keeps paragraph indices identical to what other OOXML tooling
//! reports and stable between reading and [mutation](crate::mutate).
//!
//! Paragraph text is the concatenation of the run text (`w:t`), with
//! `w:tab` rendered as `\t` and `w:br`/`w:cr` as `\n`.

use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::Event;

use crate::error::{DocxError, Result};
use crate::models::{DocumentStats, Paragraph};

pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Main document part inside the package.
pub const DOCUMENT_XML: &str = "word/document.xml";

/// Maximum decompressed bytes read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const PREVIEW_CHARS: usize = 200;

/// Extracted text of a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    /// Every body paragraph, blank ones included, in document order.
    pub paragraphs: Vec<Paragraph>,
}

impl DocumentText {
    /// Number of body paragraphs, blank ones included.
    pub fn total_paragraphs(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn non_blank(&self) -> impl Iterator<Item = &Paragraph> {
        self.paragraphs.iter().filter(|p| !p.is_blank())
    }

    pub fn paragraph_count(&self) -> usize {
        self.non_blank().count()
    }

    pub fn word_count(&self) -> usize {
        self.paragraphs.iter().map(Paragraph::word_count).sum()
    }

    pub fn stats(&self) -> DocumentStats {
        let preview = self
            .non_blank()
            .next()
            .map(|p| p.text.chars().take(PREVIEW_CHARS).collect())
            .unwrap_or_default();
        DocumentStats {
            word_count: self.word_count(),
            paragraph_count: self.paragraph_count(),
            preview,
        }
    }
}

/// Reads a `.docx` file from disk.
pub fn read_document(path: &Path) -> Result<DocumentText> {
    let bytes = std::fs::read(path)?;
    read_document_bytes(&bytes)
}

/// Reads a `.docx` package held in memory.
pub fn read_document_bytes(bytes: &[u8]) -> Result<DocumentText> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(DocxError::unreadable)?;
    let xml = read_document_xml(&mut archive)?;
    Ok(DocumentText {
        paragraphs: paragraphs_from_xml(&xml)?,
    })
}

/// Cheap check used by uploads: is this a ZIP package at all?
pub fn is_zip_package(bytes: &[u8]) -> bool {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).is_ok()
}

pub(crate) fn read_document_xml<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<Vec<u8>> {
    let entry = archive.by_name(DOCUMENT_XML).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            DocxError::UnreadableDocument(format!("{} not found", DOCUMENT_XML))
        }
        other => DocxError::unreadable(other),
    })?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(DocxError::unreadable)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DocxError::UnreadableDocument(format!(
            "{} exceeds size limit ({} bytes)",
            DOCUMENT_XML, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Local names of the open elements, used to decide what is a body paragraph.
#[derive(Default)]
pub(crate) struct ElementStack {
    names: Vec<Vec<u8>>,
}

impl ElementStack {
    pub(crate) fn push(&mut self, local: &[u8]) {
        self.names.push(local.to_vec());
    }

    pub(crate) fn pop(&mut self) {
        self.names.pop();
    }

    pub(crate) fn depth(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn top_is(&self, local: &[u8]) -> bool {
        self.names.last().is_some_and(|n| n.as_slice() == local)
    }

    pub(crate) fn contains(&self, local: &[u8]) -> bool {
        self.names.iter().any(|n| n.as_slice() == local)
    }
}

/// Walks `word/document.xml` and returns the body paragraphs.
pub fn paragraphs_from_xml(xml: &[u8]) -> Result<Vec<Paragraph>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut stack = ElementStack::default();
    let mut paragraphs = Vec::new();
    // Depth of the open body paragraph, if any.
    let mut open: Option<usize> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                if open.is_none() && local.as_ref() == b"p" && stack.top_is(b"body") {
                    open = Some(stack.depth() + 1);
                    text.clear();
                }
                stack.push(local.as_ref());
            }
            Ok(Event::Empty(e)) => {
                let local = e.local_name();
                if open.is_none() && local.as_ref() == b"p" && stack.top_is(b"body") {
                    paragraphs.push(Paragraph {
                        index: paragraphs.len(),
                        text: String::new(),
                    });
                } else if open.is_some() && stack.top_is(b"r") && !stack.contains(b"txbxContent") {
                    match local.as_ref() {
                        b"tab" => text.push('\t'),
                        b"br" | b"cr" => text.push('\n'),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if open.is_some() && stack.top_is(b"t") && !stack.contains(b"txbxContent") {
                    let unescaped = t.unescape().map_err(DocxError::unreadable)?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::End(_)) => {
                if open == Some(stack.depth()) {
                    paragraphs.push(Paragraph {
                        index: paragraphs.len(),
                        text: std::mem::take(&mut text),
                    });
                    open = None;
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocxError::unreadable(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Builds a minimal `.docx` package with one body paragraph per entry.
///
/// Used by tests and by `docxai` demos; real documents carry many more parts,
/// all of which the mutator copies through untouched.
pub fn build_docx(paragraphs: &[&str]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut body = String::new();
    for p in paragraphs {
        if p.is_empty() {
            body.push_str("<w:p/>");
        } else {
            body.push_str(&format!(
                "<w:p><w:pPr><w:pStyle w:val=\"Normal\"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
                escape_text(p)
            ));
        }
    }
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
<w:body>{}<w:sectPr/></w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options)
            .map_err(DocxError::unreadable)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file(DOCUMENT_XML, options)
            .map_err(DocxError::unreadable)?;
        zip.write_all(xml.as_bytes())?;
        zip.finish().map_err(DocxError::unreadable)?;
    }
    Ok(buf)
}

const CONTENT_TYPES: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>\
</Types>";

fn escape_text(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}
