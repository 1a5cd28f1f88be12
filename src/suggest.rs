//! Suggestion generation: paragraphs in, [`SuggestionSet`] out.
//!
//! # Model path
//!
//! ```text
//! paragraphs ─▶ filter (min_words) ─▶ chunk ─▶ prompt ─▶ complete ─▶ parse
//!                                                          │           │
//!                                       upstream error ────┘   ParseError
//!                                       → heuristics            → re-ask once
//!                                                               → skip chunk
//! ```
//!
//! Chunks are processed in order and ids are assigned after all chunks are
//! done (`s1`, `s2`, …), so ids are monotonic across chunks.
//!
//! # Fallback path
//!
//! Without a [`CompletionClient`] the [heuristics](crate::heuristics) run over
//! every non-blank paragraph. The same path takes over when the upstream API
//! fails: for the whole document if the first request fails, otherwise for the
//! chunk that failed and every chunk after it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_paragraphs, Chunk};
use crate::completion::{CompletionClient, CompletionRequest};
use crate::config::ModelConfig;
use crate::docx::DocumentText;
use crate::error::{DocxError, Result};
use crate::heuristics;
use crate::models::{
    Paragraph, SuggestionCategory, SuggestionDraft, SuggestionSet, SuggestionSource,
};
use crate::reply::{parse_reply, ModelEdit};

const PARAGRAPH_SEPARATOR: &str = "\n\n---PARAGRAPH SEPARATOR---\n\n";

const STRICT_SUFFIX: &str = "\n\nYour previous reply could not be parsed. Return ONLY the JSON \
object described above: no prose, no Markdown, no code fences.";

pub struct SuggestionGenerator {
    client: Option<Arc<dyn CompletionClient>>,
    config: ModelConfig,
}

impl SuggestionGenerator {
    pub fn new(config: ModelConfig, client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client, config }
    }

    /// A generator that never calls a model.
    pub fn heuristic_only(config: ModelConfig) -> Self {
        Self::new(config, None)
    }

    pub fn uses_model(&self) -> bool {
        self.client.is_some()
    }

    /// Produces the suggestion set for one document. Never fails: model
    /// problems degrade to skipped chunks or heuristic suggestions.
    pub async fn generate(&self, doc_id: &str, document: &DocumentText, query: &str) -> SuggestionSet {
        let drafts = match &self.client {
            Some(client) => self.model_drafts(client.as_ref(), document, query).await,
            None => heuristics::suggest(&document.paragraphs, query),
        };

        let suggestions: Vec<_> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| d.into_suggestion(format!("s{}", i + 1)))
            .collect();

        info!(
            doc_id,
            count = suggestions.len(),
            model = self.uses_model(),
            "generated suggestions"
        );

        SuggestionSet {
            doc_id: doc_id.to_string(),
            query: query.to_string(),
            paragraph_total: document.total_paragraphs(),
            suggestions,
            generated_at: Utc::now(),
        }
    }

    async fn model_drafts(
        &self,
        client: &dyn CompletionClient,
        document: &DocumentText,
        query: &str,
    ) -> Vec<SuggestionDraft> {
        let candidates: Vec<Paragraph> = document
            .non_blank()
            .filter(|p| p.word_count() >= self.config.min_words)
            .cloned()
            .collect();
        let chunks = chunk_paragraphs(
            &candidates,
            self.config.chunk_paragraphs,
            self.config.chunk_max_chars,
        );
        debug!(
            candidates = candidates.len(),
            chunks = chunks.len(),
            model = client.model_name(),
            "analysing with model"
        );

        let mut drafts = Vec::new();
        let mut upstream_down = false;

        for chunk in &chunks {
            if upstream_down {
                drafts.extend(heuristics::suggest(&chunk.paragraphs, query));
                continue;
            }
            match self.suggest_chunk(client, chunk, query).await {
                Ok(chunk_drafts) => drafts.extend(chunk_drafts),
                Err(DocxError::MalformedModelResponse(reason)) => {
                    warn!(chunk = chunk.index, %reason, "skipping chunk with malformed model response");
                }
                Err(e) => {
                    warn!(chunk = chunk.index, error = %e, "model unavailable, using heuristics");
                    if chunk.index == 0 {
                        return heuristics::suggest(&document.paragraphs, query);
                    }
                    upstream_down = true;
                    drafts.extend(heuristics::suggest(&chunk.paragraphs, query));
                }
            }
        }
        drafts
    }

    /// One chunk: ask, parse, re-ask once on a parse failure.
    async fn suggest_chunk(
        &self,
        client: &dyn CompletionClient,
        chunk: &Chunk,
        query: &str,
    ) -> Result<Vec<SuggestionDraft>> {
        let raw = client.complete(&build_request(chunk, query, false)).await?;
        let edits = match parse_reply(&raw) {
            Ok(edits) => edits,
            Err(first) => {
                debug!(chunk = chunk.index, reason = %first, "unparseable reply, retrying strictly");
                let raw = client.complete(&build_request(chunk, query, true)).await?;
                parse_reply(&raw).map_err(|e| DocxError::MalformedModelResponse(e.reason))?
            }
        };
        Ok(accept_edits(chunk, edits))
    }
}

/// Builds the prompt for one chunk. `strict` adds the JSON-only reminder.
pub fn build_request(chunk: &Chunk, query: &str, strict: bool) -> CompletionRequest {
    let mut system = format!(
        "You are a professional document editor. Analyze the given paragraphs and suggest \
improvements based on this request: \"{}\"\n\n\
Return a JSON object in exactly this format:\n\
{{\"edits\": [{{\"paragraph_index\": <number from the [PARAGRAPH n] header>, \
\"original\": \"<current paragraph text>\", \
\"suggested\": \"<the full rewritten paragraph>\", \
\"reason\": \"<brief explanation of the change>\", \
\"category\": \"tone|clarity|length|grammar|other\"}}]}}\n\n\
Only include paragraphs where a change meaningfully improves the text. \
Omit paragraphs that need no change.",
        query.trim()
    );
    if strict {
        system.push_str(STRICT_SUFFIX);
    }

    let user = chunk
        .paragraphs
        .iter()
        .map(|p| format!("[PARAGRAPH {}]\n{}", p.index, p.text))
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR);

    CompletionRequest {
        system,
        user,
        json_mode: true,
    }
}

/// Checks parsed edits against the chunk they answer.
fn accept_edits(chunk: &Chunk, edits: Vec<ModelEdit>) -> Vec<SuggestionDraft> {
    let mut seen = Vec::new();
    let mut drafts = Vec::new();
    for edit in edits {
        let Some(para) = chunk.paragraph(edit.paragraph_index) else {
            warn!(
                chunk = chunk.index,
                paragraph_index = edit.paragraph_index,
                "model referenced a paragraph outside the chunk"
            );
            continue;
        };
        if edit.suggested.trim() == para.text.trim() || seen.contains(&para.index) {
            continue;
        }
        seen.push(para.index);
        drafts.push(SuggestionDraft {
            paragraph_index: para.index,
            original: para.text.clone(),
            suggested: edit.suggested,
            reason: edit.reason.unwrap_or_else(|| "Suggested improvement".to_string()),
            category: edit
                .category
                .as_deref()
                .map(SuggestionCategory::from_label)
                .unwrap_or(SuggestionCategory::Other),
            source: SuggestionSource::Model,
        });
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    /// Replies from a script, recording every request.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DocxError::UpstreamUnavailable("script exhausted".into())))
        }
    }

    fn doc(texts: &[&str]) -> DocumentText {
        DocumentText {
            paragraphs: texts
                .iter()
                .enumerate()
                .map(|(index, t)| Paragraph {
                    index,
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    fn config(chunk_paragraphs: usize) -> ModelConfig {
        ModelConfig {
            chunk_paragraphs,
            min_words: 1,
            ..ModelConfig::default()
        }
    }

    fn generator(client: Arc<ScriptedClient>, chunk_paragraphs: usize) -> SuggestionGenerator {
        SuggestionGenerator::new(config(chunk_paragraphs), Some(client))
    }

    fn edit(index: usize, suggested: &str) -> String {
        serde_json::json!({
            "edits": [{
                "paragraph_index": index,
                "original": "ignored",
                "suggested": suggested,
                "reason": "clearer",
                "category": "clarity"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn ids_are_unique_and_monotonic_across_chunks() {
        let client = ScriptedClient::new(vec![
            Ok(edit(0, "Alpha rewritten.")),
            Ok(edit(2, "Gamma rewritten.")),
        ]);
        let gen = generator(client.clone(), 2);
        let set = gen
            .generate("d1", &doc(&["Alpha text.", "Beta text.", "Gamma text."]), "improve")
            .await;

        let ids: Vec<&str> = set.suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(set.suggestions[1].paragraph_index, 2);
        assert_eq!(set.suggestions[1].original, "Gamma text.");
        assert_eq!(set.suggestions[0].category, SuggestionCategory::Clarity);
        assert_eq!(set.suggestions[0].source, SuggestionSource::Model);
        assert_eq!(set.paragraph_total, 3);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn prompt_carries_query_and_document_indices() {
        let client = ScriptedClient::new(vec![Ok(r#"{"edits": []}"#.to_string())]);
        let gen = generator(client.clone(), 5);
        gen.generate("d1", &doc(&["", "Second paragraph here."]), "Make it formal")
            .await;
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("\"Make it formal\""));
        assert!(requests[0].user.contains("[PARAGRAPH 1]\nSecond paragraph here."));
        assert!(!requests[0].user.contains("[PARAGRAPH 0]"));
        assert!(requests[0].json_mode);
    }

    #[tokio::test]
    async fn malformed_reply_is_retried_once_strictly() {
        let client = ScriptedClient::new(vec![
            Ok("Here you go: edits!".to_string()),
            Ok(edit(0, "Better alpha.")),
        ]);
        let gen = generator(client.clone(), 5);
        let set = gen.generate("d1", &doc(&["Alpha text."]), "improve").await;

        assert_eq!(set.len(), 1);
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].system.contains("could not be parsed"));
        assert!(requests[1].system.contains("Return ONLY the JSON"));
    }

    #[tokio::test]
    async fn twice_malformed_chunk_is_skipped_and_others_kept() {
        let client = ScriptedClient::new(vec![
            Ok("nope".to_string()),
            Ok("still nope".to_string()),
            Ok(edit(1, "Beta improved.")),
        ]);
        let gen = generator(client.clone(), 1);
        let set = gen
            .generate("d1", &doc(&["Alpha text.", "Beta text."]), "improve")
            .await;

        assert_eq!(set.len(), 1);
        assert_eq!(set.suggestions[0].id, "s1");
        assert_eq!(set.suggestions[0].paragraph_index, 1);
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn first_upstream_failure_falls_back_to_heuristics_for_whole_document() {
        let client = ScriptedClient::new(vec![Err(DocxError::UpstreamUnavailable(
            "connection refused".into(),
        ))]);
        let gen = generator(client.clone(), 1);
        let set = gen
            .generate("d1", &doc(&["We don't think this works.", "Fine."]), "improve")
            .await;

        assert_eq!(client.requests().len(), 1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.suggestions[0].source, SuggestionSource::Heuristic);
        assert_eq!(set.suggestions[0].suggested, "We do not think this works.");
    }

    #[tokio::test]
    async fn later_upstream_failure_keeps_model_results() {
        let client = ScriptedClient::new(vec![
            Ok(edit(0, "Alpha improved.")),
            Err(DocxError::UpstreamUnavailable("503".into())),
        ]);
        let gen = generator(client.clone(), 1);
        let set = gen
            .generate(
                "d1",
                &doc(&["Alpha text.", "They can't go.", "We won't stay."]),
                "formal",
            )
            .await;

        // Chunk 2 fails, chunk 3 is not attempted: both go through heuristics.
        assert_eq!(client.requests().len(), 2);
        let sources: Vec<SuggestionSource> = set.suggestions.iter().map(|s| s.source).collect();
        assert_eq!(
            sources,
            vec![
                SuggestionSource::Model,
                SuggestionSource::Heuristic,
                SuggestionSource::Heuristic
            ]
        );
        let ids: Vec<&str> = set.suggestions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn out_of_chunk_and_noop_edits_are_dropped() {
        let reply = serde_json::json!({
            "edits": [
                { "paragraph_index": 7, "suggested": "Ghost." },
                { "paragraph_index": 0, "suggested": "Alpha text." },
                { "paragraph_index": 1, "suggested": "Beta, improved." },
                { "paragraph_index": 1, "suggested": "Beta, twice." }
            ]
        })
        .to_string();
        let client = ScriptedClient::new(vec![Ok(reply)]);
        let gen = generator(client, 5);
        let set = gen
            .generate("d1", &doc(&["Alpha text.", "Beta text."]), "improve")
            .await;

        assert_eq!(set.len(), 1);
        assert_eq!(set.suggestions[0].suggested, "Beta, improved.");
        assert_eq!(set.suggestions[0].reason, "Suggested improvement");
        assert_eq!(set.suggestions[0].category, SuggestionCategory::Other);
    }

    #[tokio::test]
    async fn short_paragraphs_are_not_sent_to_the_model() {
        let client = ScriptedClient::new(vec![Ok(r#"{"edits": []}"#.to_string())]);
        let gen = SuggestionGenerator::new(
            ModelConfig {
                min_words: 4,
                ..ModelConfig::default()
            },
            Some(client.clone()),
        );
        gen.generate("d1", &doc(&["Too short.", "This one has enough words."]), "x")
            .await;
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].user.contains("Too short."));
    }

    #[tokio::test]
    async fn no_client_uses_heuristics() {
        let gen = SuggestionGenerator::heuristic_only(ModelConfig::default());
        assert!(!gen.uses_model());
        let set = gen
            .generate("d1", &doc(&["We don't think this works."]), "Make it more formal")
            .await;
        assert!(!set.is_empty());
        let s = &set.suggestions[0];
        assert_eq!(s.category, SuggestionCategory::Tone);
        assert!(s.suggested.contains("do not"));
        assert!(!s.suggested.contains("don't"));
    }
}
