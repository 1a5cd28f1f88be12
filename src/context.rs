//! Application context shared by the REST API, the MCP bridge and the CLI.
//!
//! [`AppContext`] owns the stores, the suggestion generator and the uploads
//! directory. Handlers receive it explicitly (behind an `Arc`), so every
//! test builds its own isolated instance.
//!
//! File parsing and rewriting are blocking and run on the blocking pool via
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::completion::{create_client, CompletionClient};
use crate::config::Config;
use crate::docx::{is_zip_package, read_document, read_document_bytes};
use crate::error::{DocxError, Result};
use crate::models::{modified_filename, ModificationResult, StoredDocument, SuggestionSet};
use crate::mutate::apply_suggestions;
use crate::public_url::PublicUrlResolver;
use crate::store::{DocumentStore, SuggestionStore};
use crate::suggest::SuggestionGenerator;
use crate::widget::{WidgetConfig, WidgetTemplate};

const URL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppContext {
    config: Config,
    documents: DocumentStore,
    suggestions: SuggestionStore,
    generator: SuggestionGenerator,
    public_url: PublicUrlResolver,
    http: reqwest::Client,
}

impl AppContext {
    /// Builds a context using the completion client implied by the
    /// environment (`OPENAI_API_KEY`), or the heuristics when none is set.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client = create_client(&config.model)?;
        Self::new(config, client)
    }

    pub fn new(config: Config, client: Option<Arc<dyn CompletionClient>>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.storage.uploads_dir).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create uploads directory {}: {}",
                config.storage.uploads_dir.display(),
                e
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(URL_DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            generator: SuggestionGenerator::new(config.model.clone(), client),
            public_url: PublicUrlResolver::new(&config),
            documents: DocumentStore::new(),
            suggestions: SuggestionStore::new(),
            http,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uses_model(&self) -> bool {
        self.generator.uses_model()
    }

    fn uploads_dir(&self) -> &Path {
        &self.config.storage.uploads_dir
    }

    /// Validates and registers an uploaded package. Nothing is written to
    /// disk unless the bytes parse as a document.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<StoredDocument> {
        let limit = self.config.storage.max_upload_bytes;
        if bytes.len() > limit {
            return Err(DocxError::PayloadTooLarge {
                size: bytes.len(),
                limit,
            });
        }
        if !is_zip_package(&bytes) {
            let header: String = bytes.iter().take(4).map(|b| format!("{:02X}", b)).collect();
            return Err(DocxError::UnreadableDocument(format!(
                "not a valid DOCX/ZIP package (header {}, {} bytes)",
                if header.is_empty() { "-" } else { &header },
                bytes.len()
            )));
        }

        let id = Uuid::new_v4().to_string();
        let path = self.uploads_dir().join(format!("{}.docx", id));
        let write_path = path.clone();
        let stats = blocking(move || {
            let text = read_document_bytes(&bytes)?;
            std::fs::write(&write_path, &bytes)?;
            Ok(text.stats())
        })
        .await?;

        let doc = StoredDocument {
            id,
            filename: clean_filename(filename),
            path,
            stats,
            uploaded_at: Utc::now(),
        };
        info!(
            doc_id = %doc.id,
            filename = %doc.filename,
            words = doc.stats.word_count,
            paragraphs = doc.stats.paragraph_count,
            "document uploaded"
        );
        self.documents.insert(doc.clone());
        Ok(doc)
    }

    /// Fetches a package from a URL and uploads it.
    pub async fn upload_from_url(&self, filename: &str, url: &str) -> Result<StoredDocument> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DocxError::InvalidRequest(format!(
                "file_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        info!(url, "downloading document");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DocxError::InvalidRequest(format!("could not download {}: {}", url, e)))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DocxError::InvalidRequest(format!("could not download {}: {}", url, e)))?;
        self.upload(filename, bytes.to_vec()).await
    }

    pub fn document(&self, doc_id: &str) -> Result<StoredDocument> {
        self.documents.get(doc_id)
    }

    pub fn suggestions(&self, doc_id: &str) -> Result<Arc<SuggestionSet>> {
        self.suggestions.get(doc_id)
    }

    /// Generates suggestions for a document and replaces any previous set.
    pub async fn analyze(&self, doc_id: &str, query: &str) -> Result<Arc<SuggestionSet>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DocxError::InvalidRequest("query must not be empty".to_string()));
        }
        let doc = self.documents.get(doc_id)?;
        let path = doc.path.clone();
        let text = blocking(move || read_document(&path)).await?;
        let set = self.generator.generate(doc_id, &text, query).await;
        Ok(self.suggestions.put(set))
    }

    /// Writes a modified copy of the document with the selected suggestions.
    pub async fn apply(&self, doc_id: &str, suggestion_ids: &[String]) -> Result<ModificationResult> {
        let doc = self.documents.get(doc_id)?;
        let set = self.suggestions.get(doc_id)?;
        let result_id = Uuid::new_v4().to_string();
        let output = self
            .uploads_dir()
            .join(format!("{}_modified_{}.docx", doc_id, result_id));

        let ids = suggestion_ids.to_vec();
        let source = doc.path.clone();
        let out = output.clone();
        let applied = blocking(move || apply_suggestions(&source, &set, &ids, &out)).await?;

        let result = ModificationResult {
            id: result_id,
            doc_id: doc_id.to_string(),
            path: output,
            applied_ids: applied.applied_ids,
            superseded_ids: applied.superseded_ids,
            download_filename: modified_filename(&doc.filename),
            created_at: Utc::now(),
        };

        // The document may have been deleted while the copy was written.
        if let Err(e) = self.documents.record_result(result.clone()) {
            if let Err(io) = tokio::fs::remove_file(&result.path).await {
                warn!(path = %result.path.display(), error = %io, "failed to remove file");
            }
            return Err(e);
        }
        info!(
            doc_id,
            result_id = %result.id,
            applied = result.applied_ids.len(),
            superseded = result.superseded_ids.len(),
            "changes applied"
        );
        Ok(result)
    }

    /// Resolves a result id, or a document id to its latest result.
    pub fn download(&self, id: &str) -> Result<ModificationResult> {
        self.documents.resolve_result(id)
    }

    /// Forgets a document, its suggestions and its results, and removes their files.
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let (doc, results) = self
            .documents
            .remove(doc_id)
            .ok_or_else(|| DocxError::NotFound(format!("document {}", doc_id)))?;
        self.suggestions.clear(doc_id);

        let paths: Vec<PathBuf> = std::iter::once(doc.path)
            .chain(results.into_iter().map(|r| r.path))
            .collect();
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }
        info!(doc_id, "document deleted");
        Ok(())
    }

    pub async fn public_url(&self) -> String {
        self.public_url.resolve().await
    }

    /// Renders the widget page pointing at this server's public API.
    pub async fn widget_html(&self) -> String {
        let config = WidgetConfig::for_public_url(&self.public_url().await);
        let path = self.config.widget.html_path.clone();
        let template = tokio::task::spawn_blocking(move || WidgetTemplate::load(&path))
            .await
            .unwrap_or_else(|_| WidgetTemplate::builtin());
        template.render(&config)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocxError::Io(std::io::Error::other(e)))?
}

/// Keeps only the final path component of a client-supplied name.
fn clean_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() {
        "document.docx".to_string()
    } else {
        base.to_string()
    }
}
