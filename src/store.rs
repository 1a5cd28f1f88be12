//! In-memory registries for documents, suggestion sets and apply results.
//!
//! Both stores are `HashMap`s behind `std::sync::RwLock`. Locks are held
//! for a few map operations at most, never across an `.await`. Nothing is
//! persisted: a restart forgets every document id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{DocxError, Result};
use crate::models::{ModificationResult, StoredDocument, SuggestionSet};

/// Document id → latest [`SuggestionSet`].
///
/// `put` replaces the whole set in one step, so concurrent analyses of the
/// same document leave exactly one complete set behind (the last writer's).
#[derive(Default)]
pub struct SuggestionStore {
    sets: RwLock<HashMap<String, Arc<SuggestionSet>>>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, set: SuggestionSet) -> Arc<SuggestionSet> {
        let set = Arc::new(set);
        self.sets
            .write()
            .unwrap()
            .insert(set.doc_id.clone(), Arc::clone(&set));
        set
    }

    pub fn get(&self, doc_id: &str) -> Result<Arc<SuggestionSet>> {
        self.sets
            .read()
            .unwrap()
            .get(doc_id)
            .cloned()
            .ok_or_else(|| DocxError::NotFound(format!("suggestions for document {}", doc_id)))
    }

    /// Returns `true` if a set was removed.
    pub fn clear(&self, doc_id: &str) -> bool {
        self.sets.write().unwrap().remove(doc_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sets.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uploaded documents and the results derived from them.
#[derive(Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<String, StoredDocument>>,
    results: RwLock<HashMap<String, ModificationResult>>,
    /// Document id → id of its most recent result.
    latest: RwLock<HashMap<String, String>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: StoredDocument) {
        self.docs.write().unwrap().insert(doc.id.clone(), doc);
    }

    pub fn get(&self, doc_id: &str) -> Result<StoredDocument> {
        self.docs
            .read()
            .unwrap()
            .get(doc_id)
            .cloned()
            .ok_or_else(|| DocxError::NotFound(format!("document {}", doc_id)))
    }

    /// Registers a result for a document that is still present. The result
    /// is visible under its own id before it becomes the document's latest.
    pub fn record_result(&self, result: ModificationResult) -> Result<()> {
        // Held until both maps are updated so `remove` cannot interleave.
        let docs = self.docs.read().unwrap();
        if !docs.contains_key(&result.doc_id) {
            return Err(DocxError::NotFound(format!("document {}", result.doc_id)));
        }
        let (doc_id, result_id) = (result.doc_id.clone(), result.id.clone());
        self.results.write().unwrap().insert(result_id.clone(), result);
        self.latest.write().unwrap().insert(doc_id, result_id);
        Ok(())
    }

    /// Looks `id` up as a result id first, then as a document id whose
    /// latest result is returned.
    pub fn resolve_result(&self, id: &str) -> Result<ModificationResult> {
        if let Some(result) = self.results.read().unwrap().get(id) {
            return Ok(result.clone());
        }
        let latest = self.latest.read().unwrap().get(id).cloned();
        latest
            .and_then(|rid| self.results.read().unwrap().get(&rid).cloned())
            .ok_or_else(|| DocxError::NotFound(format!("modified document {}", id)))
    }

    /// Removes a document and every result derived from it. Returns the
    /// removed entries so the caller can delete their files.
    pub fn remove(&self, doc_id: &str) -> Option<(StoredDocument, Vec<ModificationResult>)> {
        let doc = self.docs.write().unwrap().remove(doc_id)?;
        self.latest.write().unwrap().remove(doc_id);
        let mut results = self.results.write().unwrap();
        let ids: Vec<String> = results
            .values()
            .filter(|r| r.doc_id == doc_id)
            .map(|r| r.id.clone())
            .collect();
        let removed = ids.iter().filter_map(|id| results.remove(id)).collect();
        Some((doc, removed))
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStats, Suggestion, SuggestionCategory, SuggestionSource};
    use chrono::Utc;
    use std::path::PathBuf;

    fn set(doc_id: &str, query: &str, n: usize) -> SuggestionSet {
        SuggestionSet {
            doc_id: doc_id.to_string(),
            query: query.to_string(),
            paragraph_total: n,
            suggestions: (0..n)
                .map(|i| Suggestion {
                    id: format!("s{}", i + 1),
                    paragraph_index: i,
                    original: format!("p{}", i),
                    suggested: format!("q{}", i),
                    reason: "r".into(),
                    category: SuggestionCategory::Other,
                    source: SuggestionSource::Heuristic,
                })
                .collect(),
            generated_at: Utc::now(),
        }
    }

    fn doc(id: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            filename: "a.docx".into(),
            path: PathBuf::from(format!("/tmp/{}.docx", id)),
            stats: DocumentStats {
                word_count: 0,
                paragraph_count: 0,
                preview: String::new(),
            },
            uploaded_at: Utc::now(),
        }
    }

    fn result(id: &str, doc_id: &str) -> ModificationResult {
        ModificationResult {
            id: id.to_string(),
            doc_id: doc_id.to_string(),
            path: PathBuf::from(format!("/tmp/{}.docx", id)),
            applied_ids: vec![],
            superseded_ids: vec![],
            download_filename: "a_modified.docx".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = SuggestionStore::new();
        assert!(matches!(store.get("nope"), Err(DocxError::NotFound(_))));
    }

    #[test]
    fn put_replaces_previous_set() {
        let store = SuggestionStore::new();
        store.put(set("d1", "first", 3));
        store.put(set("d1", "second", 1));
        let got = store.get("d1").unwrap();
        assert_eq!(got.query, "second");
        assert_eq!(got.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.clear("d1"));
        assert!(!store.clear("d1"));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_puts_leave_one_whole_set() {
        let store = Arc::new(SuggestionStore::new());
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.put(set("d1", &format!("q{}", n), n));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let got = store.get("d1").unwrap();
        let n: usize = got.query.trim_start_matches('q').parse().unwrap();
        // The surviving set is internally consistent: never a mix of writers.
        assert_eq!(got.len(), n);
        assert_eq!(got.paragraph_total, n);
    }

    #[test]
    fn results_resolve_by_result_or_document_id() {
        let store = DocumentStore::new();
        store.insert(doc("d1"));
        store.record_result(result("r1", "d1")).unwrap();
        store.record_result(result("r2", "d1")).unwrap();

        assert_eq!(store.resolve_result("r1").unwrap().id, "r1");
        assert_eq!(store.resolve_result("d1").unwrap().id, "r2");
        assert!(matches!(
            store.resolve_result("d2"),
            Err(DocxError::NotFound(_))
        ));
    }

    #[test]
    fn remove_drops_document_and_results() {
        let store = DocumentStore::new();
        store.insert(doc("d1"));
        store.insert(doc("d2"));
        store.record_result(result("r1", "d1")).unwrap();
        store.record_result(result("r2", "d2")).unwrap();

        let (removed, results) = store.remove("d1").unwrap();
        assert_eq!(removed.id, "d1");
        assert_eq!(results.len(), 1);
        assert!(store.get("d1").is_err());
        assert!(store.resolve_result("r1").is_err());
        assert!(store.resolve_result("r2").is_ok());
        assert!(store.remove("d1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn result_for_removed_document_is_rejected() {
        let store = DocumentStore::new();
        store.insert(doc("d1"));
        store.remove("d1").unwrap();
        assert!(matches!(
            store.record_result(result("r1", "d1")),
            Err(DocxError::NotFound(_))
        ));
        assert!(store.resolve_result("r1").is_err());
    }

    #[test]
    fn latest_result_is_always_resolvable() {
        let store = Arc::new(DocumentStore::new());
        store.insert(doc("d1"));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.record_result(result(&format!("r{}", i), "d1")).unwrap();
                }
            })
        };

        let mut seen = false;
        while !writer.is_finished() {
            match store.resolve_result("d1") {
                Ok(r) => {
                    assert_eq!(r.doc_id, "d1");
                    seen = true;
                }
                Err(_) => assert!(!seen, "latest result vanished"),
            }
        }
        writer.join().unwrap();
        assert!(store.resolve_result("d1").is_ok());
    }
}
