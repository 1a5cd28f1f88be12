//! Error taxonomy shared by the reader, generator, mutator and facades.
//!
//! Per-chunk model failures are absorbed inside the generator; everything
//! else surfaces to the caller. The HTTP layer maps each variant onto a
//! status code and a machine-readable error code (see [`DocxError::code`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocxError {
    /// The file is not a ZIP archive, lacks `word/document.xml`, or the XML is malformed.
    #[error("unreadable document: {0}")]
    UnreadableDocument(String),

    /// The remote completion API could not be reached or returned an error status.
    #[error("upstream model unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The model replied, but not with the edit schema (even after the retry).
    #[error("malformed model response: {0}")]
    MalformedModelResponse(String),

    #[error("unknown suggestion: {0}")]
    UnknownSuggestion(String),

    /// The document no longer matches the state the suggestion was generated against.
    #[error("stale suggestion {id}: {detail}")]
    StaleSuggestion { id: String, detail: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocxError {
    /// Machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DocxError::UnreadableDocument(_) => "unreadable_document",
            DocxError::UpstreamUnavailable(_) => "upstream_unavailable",
            DocxError::MalformedModelResponse(_) => "malformed_model_response",
            DocxError::UnknownSuggestion(_) => "unknown_suggestion",
            DocxError::StaleSuggestion { .. } => "stale_suggestion",
            DocxError::NotFound(_) => "not_found",
            DocxError::InvalidRequest(_) => "bad_request",
            DocxError::PayloadTooLarge { .. } => "payload_too_large",
            DocxError::Io(_) => "internal",
        }
    }

    pub(crate) fn unreadable(err: impl std::fmt::Display) -> Self {
        DocxError::UnreadableDocument(err.to_string())
    }
}

pub type Result<T, E = DocxError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(DocxError::NotFound("document x".into()).code(), "not_found");
        assert_eq!(
            DocxError::StaleSuggestion {
                id: "s1".into(),
                detail: "paragraph count changed".into()
            }
            .code(),
            "stale_suggestion"
        );
        assert_eq!(DocxError::InvalidRequest("x".into()).code(), "bad_request");
    }

    #[test]
    fn not_found_message_names_the_subject() {
        let err = DocxError::NotFound("document abc".into());
        assert_eq!(err.to_string(), "document abc not found");
    }
}
