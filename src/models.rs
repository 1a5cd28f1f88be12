//! Core data models used throughout DocxAI.
//!
//! These types represent the uploaded documents, the suggestions generated
//! for them, and the derived files produced when suggestions are applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One body-level paragraph of a document.
///
/// `index` counts every direct `w:body` paragraph, empty ones included, so
/// it stays a stable address for the mutator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub index: usize,
    pub text: String,
}

impl Paragraph {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Summary statistics reported on upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub word_count: usize,
    /// Non-empty body paragraphs.
    pub paragraph_count: usize,
    pub preview: String,
}

/// An uploaded document registered in the [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub filename: String,
    pub path: PathBuf,
    pub stats: DocumentStats,
    pub uploaded_at: DateTime<Utc>,
}

/// Category tag attached to every suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    Tone,
    Clarity,
    Length,
    Grammar,
    Other,
}

impl SuggestionCategory {
    /// Lenient mapping from the free-text category a model may return.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "tone" | "formality" | "style" => Self::Tone,
            "clarity" | "readability" => Self::Clarity,
            "length" | "concision" | "conciseness" => Self::Length,
            "grammar" | "spelling" | "punctuation" => Self::Grammar,
            _ => Self::Other,
        }
    }
}

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Model,
    Heuristic,
}

/// One proposed whole-paragraph replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub paragraph_index: usize,
    /// Paragraph text at generation time.
    pub original: String,
    pub suggested: String,
    pub reason: String,
    pub category: SuggestionCategory,
    pub source: SuggestionSource,
}

/// A suggestion before it has been given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionDraft {
    pub paragraph_index: usize,
    pub original: String,
    pub suggested: String,
    pub reason: String,
    pub category: SuggestionCategory,
    pub source: SuggestionSource,
}

impl SuggestionDraft {
    pub fn into_suggestion(self, id: String) -> Suggestion {
        Suggestion {
            id,
            paragraph_index: self.paragraph_index,
            original: self.original,
            suggested: self.suggested,
            reason: self.reason,
            category: self.category,
            source: self.source,
        }
    }
}

/// All suggestions currently associated with one document.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSet {
    pub doc_id: String,
    pub query: String,
    /// Body paragraph count of the document when the set was generated.
    pub paragraph_total: usize,
    pub suggestions: Vec<Suggestion>,
    pub generated_at: DateTime<Utc>,
}

impl SuggestionSet {
    pub fn find(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }
}

/// A derived document written by an apply call.
#[derive(Debug, Clone, Serialize)]
pub struct ModificationResult {
    pub id: String,
    pub doc_id: String,
    pub path: PathBuf,
    /// Selected ids whose text is in the output file.
    pub applied_ids: Vec<String>,
    /// Selected ids overwritten by a later suggestion for the same paragraph.
    pub superseded_ids: Vec<String>,
    pub download_filename: String,
    pub created_at: DateTime<Utc>,
}

/// `report.docx` → `report_modified.docx`.
pub fn modified_filename(original: &str) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    format!("{}_modified.docx", stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_filename_strips_extension() {
        assert_eq!(modified_filename("Azure.docx"), "Azure_modified.docx");
        assert_eq!(modified_filename("notes"), "notes_modified.docx");
        assert_eq!(modified_filename("a.b.docx"), "a.b_modified.docx");
    }

    #[test]
    fn category_labels_are_lenient() {
        assert_eq!(SuggestionCategory::from_label("Tone"), SuggestionCategory::Tone);
        assert_eq!(
            SuggestionCategory::from_label(" conciseness "),
            SuggestionCategory::Length
        );
        assert_eq!(SuggestionCategory::from_label("vibes"), SuggestionCategory::Other);
    }

    #[test]
    fn suggestion_serializes_lowercase_tags() {
        let s = Suggestion {
            id: "s1".into(),
            paragraph_index: 2,
            original: "a".into(),
            suggested: "b".into(),
            reason: "r".into(),
            category: SuggestionCategory::Clarity,
            source: SuggestionSource::Heuristic,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["category"], "clarity");
        assert_eq!(v["source"], "heuristic");
        assert_eq!(v["paragraph_index"], 2);
    }
}
