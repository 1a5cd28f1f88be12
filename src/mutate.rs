//! Writes a modified copy of a document with selected suggestions applied.
//!
//! Only `word/document.xml` is rewritten. Every other package entry is
//! copied with [`zip::ZipWriter::raw_copy_file`], i.e. without being
//! decompressed, so styles, media, headers and relationships come through
//! byte for byte. When no paragraph is targeted the document part is raw
//! copied as well.
//!
//! A targeted paragraph keeps its `w:p` element and its `w:pPr`; the rest of
//! its content is replaced by a single run carrying the first original run's
//! `w:rPr`:
//!
//! ```xml
//! <w:p>
//!   <w:pPr>…unchanged…</w:pPr>
//!   <w:r><w:rPr>…from first run…</w:rPr><w:t xml:space="preserve">new text</w:t></w:r>
//! </w:p>
//! ```
//!
//! Before anything is written the selection is validated against the set
//! (unknown ids) and against the document on disk (stale suggestions). On
//! failure no output file exists.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::docx::{paragraphs_from_xml, read_document_xml, ElementStack, DOCUMENT_XML};
use crate::error::{DocxError, Result};
use crate::models::SuggestionSet;

/// What an apply call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdits {
    /// Ids whose text is in the output, deduplicated, in request order.
    pub applied_ids: Vec<String>,
    /// Selected ids replaced by a later suggestion for the same paragraph.
    pub superseded_ids: Vec<String>,
    /// Distinct paragraphs rewritten.
    pub paragraphs_changed: usize,
}

/// Applies `selected_ids` from `set` to the document at `source`, writing
/// the result to `output`. `source` is never modified.
pub fn apply_suggestions(
    source: &Path,
    set: &SuggestionSet,
    selected_ids: &[String],
    output: &Path,
) -> Result<AppliedEdits> {
    let mut selected: Vec<String> = Vec::with_capacity(selected_ids.len());
    for id in selected_ids {
        if set.find(id).is_none() {
            return Err(DocxError::UnknownSuggestion(id.clone()));
        }
        if !selected.contains(id) {
            selected.push(id.clone());
        }
    }

    // Set order decides which suggestion wins for a shared paragraph.
    let mut replacements: BTreeMap<usize, (&str, &str)> = BTreeMap::new();
    for s in set.suggestions.iter().filter(|s| selected.contains(&s.id)) {
        replacements.insert(s.paragraph_index, (s.id.as_str(), s.suggested.as_str()));
    }

    let file = File::open(source)?;
    let mut archive = ZipArchive::new(file).map_err(DocxError::unreadable)?;
    let xml = read_document_xml(&mut archive)?;
    check_fresh(&xml, set, &selected)?;

    let new_xml = if replacements.is_empty() {
        None
    } else {
        let texts: BTreeMap<usize, &str> =
            replacements.iter().map(|(idx, (_, text))| (*idx, *text)).collect();
        Some(rewrite_document_xml(&xml, &texts)?)
    };

    write_package(&mut archive, new_xml.as_deref(), output)?;

    let (applied_ids, superseded_ids): (Vec<String>, Vec<String>) = selected
        .into_iter()
        .partition(|id| replacements.values().any(|(winner, _)| *winner == id.as_str()));
    debug!(
        output = %output.display(),
        applied = applied_ids.len(),
        superseded = superseded_ids.len(),
        paragraphs = replacements.len(),
        "wrote modified document"
    );

    Ok(AppliedEdits {
        applied_ids,
        superseded_ids,
        paragraphs_changed: replacements.len(),
    })
}

/// Every selected suggestion must still describe the document on disk.
fn check_fresh(xml: &[u8], set: &SuggestionSet, applied_ids: &[String]) -> Result<()> {
    let paragraphs = paragraphs_from_xml(xml)?;
    for id in applied_ids {
        let Some(s) = set.find(id) else {
            return Err(DocxError::UnknownSuggestion(id.clone()));
        };
        if paragraphs.len() != set.paragraph_total {
            return Err(DocxError::StaleSuggestion {
                id: id.clone(),
                detail: format!(
                    "document has {} paragraphs, suggestions were generated for {}",
                    paragraphs.len(),
                    set.paragraph_total
                ),
            });
        }
        let current = paragraphs.get(s.paragraph_index).map(|p| p.text.as_str());
        if current != Some(s.original.as_str()) {
            return Err(DocxError::StaleSuggestion {
                id: id.clone(),
                detail: format!("paragraph {} has changed", s.paragraph_index),
            });
        }
    }
    Ok(())
}

/// Copies the package entry by entry into `output`, substituting the
/// document part when `new_xml` is given. Writes through a sibling
/// `.partial` file that is renamed into place on success.
fn write_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    new_xml: Option<&[u8]>,
    output: &Path,
) -> Result<()> {
    let partial = partial_path(output);
    let written = copy_entries(archive, new_xml, &partial)
        .and_then(|()| std::fs::rename(&partial, output).map_err(DocxError::from));
    if written.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    written
}

fn copy_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    new_xml: Option<&[u8]>,
    path: &Path,
) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(DocxError::unreadable)?;
        match new_xml {
            Some(xml) if entry.name() == DOCUMENT_XML => {
                drop(entry);
                let options =
                    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
                zip.start_file(DOCUMENT_XML, options)
                    .map_err(DocxError::unreadable)?;
                zip.write_all(xml)?;
            }
            _ => zip.raw_copy_file(entry).map_err(DocxError::unreadable)?,
        }
    }
    zip.finish().map_err(DocxError::unreadable)?;
    Ok(())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

/// State kept while inside a paragraph that is being replaced.
struct Target {
    /// Stack depth of the `w:p` element itself.
    depth: usize,
    /// Namespace prefix of the paragraph element including the colon, e.g. `w:`.
    prefix: String,
    text: String,
    ppr: Vec<Event<'static>>,
    rpr: Vec<Event<'static>>,
    /// Depth of the subtree currently being captured, and whether it is the `pPr`.
    capturing: Option<(usize, bool)>,
    /// Depth of the first run while it is open.
    first_run: Option<usize>,
    seen_run: bool,
}

impl Target {
    fn new(depth: usize, element: &BytesStart<'_>, text: &str) -> Self {
        let name = element.name();
        let prefix = match name.prefix() {
            Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
            None => String::new(),
        };
        Self {
            depth,
            prefix,
            text: text.to_string(),
            ppr: Vec::new(),
            rpr: Vec::new(),
            capturing: None,
            first_run: None,
            seen_run: false,
        }
    }

    fn capture(&mut self, event: Event<'static>) {
        match self.capturing {
            Some((_, true)) => self.ppr.push(event),
            Some((_, false)) => self.rpr.push(event),
            None => {}
        }
    }

    /// Handles a child start or empty element. `parent_depth` is the stack
    /// depth before the element is pushed.
    fn child(&mut self, local: &[u8], parent_depth: usize, event: Event<'_>, empty: bool) {
        if self.capturing.is_some() {
            self.capture(event.into_owned());
            return;
        }
        let own_depth = parent_depth + 1;
        if local == b"pPr" && parent_depth == self.depth {
            self.ppr.push(event.into_owned());
            if !empty {
                self.capturing = Some((own_depth, true));
            }
        } else if local == b"r" && !self.seen_run {
            self.seen_run = true;
            if !empty {
                self.first_run = Some(own_depth);
            }
        } else if local == b"rPr" && self.first_run == Some(parent_depth) {
            self.rpr.push(event.into_owned());
            if !empty {
                self.capturing = Some((own_depth, false));
            }
        }
    }

    /// Handles an end tag at `depth` (before pop).
    fn end(&mut self, depth: usize, event: Event<'_>) {
        if let Some((capture_depth, _)) = self.capturing {
            self.capture(event.into_owned());
            if capture_depth == depth {
                self.capturing = None;
            }
        } else if self.first_run == Some(depth) {
            self.first_run = None;
        }
    }

    fn write_replacement<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let tag = |local: &str| format!("{}{}", self.prefix, local);
        for e in &self.ppr {
            write(writer, e.clone())?;
        }
        write(writer, Event::Start(BytesStart::new(tag("r"))))?;
        for e in &self.rpr {
            write(writer, e.clone())?;
        }
        let mut segment = String::new();
        for c in self.text.chars() {
            match c {
                '\t' | '\n' => {
                    self.write_text(writer, &segment, &tag)?;
                    segment.clear();
                    let local = if c == '\t' { "tab" } else { "br" };
                    write(writer, Event::Empty(BytesStart::new(tag(local))))?;
                }
                _ => segment.push(c),
            }
        }
        self.write_text(writer, &segment, &tag)?;
        write(writer, Event::End(BytesEnd::new(tag("r"))))
    }

    fn write_text<W: Write>(
        &self,
        writer: &mut Writer<W>,
        text: &str,
        tag: &dyn Fn(&str) -> String,
    ) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let start = BytesStart::new(tag("t")).with_attributes([("xml:space", "preserve")]);
        write(writer, Event::Start(start))?;
        write(writer, Event::Text(BytesText::new(text)))?;
        write(writer, Event::End(BytesEnd::new(tag("t"))))
    }
}

fn write<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(DocxError::unreadable)
}

/// Streams `xml` through a writer, replacing the content of the body
/// paragraphs listed in `replacements` (paragraph index → new text).
pub fn rewrite_document_xml(xml: &[u8], replacements: &BTreeMap<usize, &str>) -> Result<Vec<u8>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut stack = ElementStack::default();
    let mut next_index = 0usize;
    let mut target: Option<Target> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(DocxError::unreadable)?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                let parent_depth = stack.depth();
                if let Some(t) = target.as_mut() {
                    t.child(&local, parent_depth, Event::Start(e), false);
                } else if local == b"p" && stack.top_is(b"body") {
                    let index = next_index;
                    next_index += 1;
                    if let Some(text) = replacements.get(&index) {
                        target = Some(Target::new(parent_depth + 1, &e, text));
                    }
                    write(&mut writer, Event::Start(e))?;
                } else {
                    write(&mut writer, Event::Start(e))?;
                }
                stack.push(&local);
            }
            Event::Empty(e) => {
                let local = e.local_name().as_ref().to_vec();
                let parent_depth = stack.depth();
                if let Some(t) = target.as_mut() {
                    t.child(&local, parent_depth, Event::Empty(e), true);
                } else if local == b"p" && stack.top_is(b"body") {
                    let index = next_index;
                    next_index += 1;
                    match replacements.get(&index) {
                        Some(text) => {
                            let t = Target::new(parent_depth + 1, &e, text);
                            let end = e.to_end().into_owned();
                            write(&mut writer, Event::Start(e))?;
                            t.write_replacement(&mut writer)?;
                            write(&mut writer, Event::End(end))?;
                        }
                        None => write(&mut writer, Event::Empty(e))?,
                    }
                } else {
                    write(&mut writer, Event::Empty(e))?;
                }
            }
            Event::End(e) => {
                let depth = stack.depth();
                match target.take() {
                    Some(t) if t.depth == depth => {
                        t.write_replacement(&mut writer)?;
                        write(&mut writer, Event::End(e))?;
                    }
                    Some(mut t) => {
                        t.end(depth, Event::End(e));
                        target = Some(t);
                    }
                    None => write(&mut writer, Event::End(e))?,
                }
                stack.pop();
            }
            other => match target.as_mut() {
                Some(t) => t.capture(other.into_owned()),
                None => write(&mut writer, other)?,
            },
        }
        buf.clear();
    }

    if let Some(&last) = replacements.keys().next_back() {
        if last >= next_index {
            return Err(DocxError::UnreadableDocument(format!(
                "document has {} paragraphs, cannot rewrite paragraph {}",
                next_index, last
            )));
        }
    }

    Ok(writer.into_inner())
}
