//! Paragraph-boundary chunker for model requests.
//!
//! Groups candidate paragraphs into [`Chunk`]s bounded by a paragraph count
//! and a character budget. Boundaries always fall between paragraphs: a
//! paragraph larger than the character budget becomes a chunk of its own
//! rather than being split.

use crate::models::Paragraph;

/// A batch of paragraphs sent to the model in one request.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of the chunk in the analysis, starting at 0.
    pub index: usize,
    pub paragraphs: Vec<Paragraph>,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.paragraphs.iter().map(|p| p.text.len()).sum()
    }

    pub fn contains(&self, paragraph_index: usize) -> bool {
        self.paragraphs.iter().any(|p| p.index == paragraph_index)
    }

    pub fn paragraph(&self, paragraph_index: usize) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| p.index == paragraph_index)
    }
}

/// Split paragraphs into chunks of at most `max_paragraphs` paragraphs and
/// (where possible) `max_chars` characters, preserving order.
pub fn chunk_paragraphs(
    paragraphs: &[Paragraph],
    max_paragraphs: usize,
    max_chars: usize,
) -> Vec<Chunk> {
    let max_paragraphs = max_paragraphs.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<Paragraph> = Vec::new();
    let mut current_chars = 0usize;

    for para in paragraphs {
        let len = para.text.len();
        let would_overflow = current.len() >= max_paragraphs || current_chars + len > max_chars;

        if would_overflow && !current.is_empty() {
            chunks.push(Chunk {
                index: chunks.len(),
                paragraphs: std::mem::take(&mut current),
            });
            current_chars = 0;
        }

        current_chars += len;
        current.push(para.clone());
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            paragraphs: current,
        });
    }

    chunks
}
