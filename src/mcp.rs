//! MCP bridge for chat hosts.
//!
//! Exposes the same operations as the REST API over MCP Streamable HTTP
//! (mounted at `/mcp` by [`crate::server`]):
//!
//! * **Resource** `ui://widget/document-editor.html`: the editor widget,
//!   served as `text/html+skybridge` with the public API URL injected.
//! * **Tools** `open_docxai_panel`, `upload_document`, `analyze_document`,
//!   `apply_changes`. Tools that render the widget advertise it through
//!   `openai/outputTemplate` metadata; results carry structured content the
//!   widget reads directly.
//! * **Prompt** `open_panel`: a canned request that opens the panel.

use std::borrow::Cow;
use std::sync::Arc;

use base64::Engine;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::AppContext;
use crate::error::DocxError;

pub const WIDGET_URI: &str = "ui://widget/document-editor.html";
pub const WIDGET_MIME: &str = "text/html+skybridge";

const OPEN_PANEL_PROMPT: &str = "Please open the DocxAI panel now so I can upload my document.";

/// Each MCP session receives a clone of this struct; all sessions share
/// one [`AppContext`].
#[derive(Clone)]
pub struct McpBridge {
    ctx: Arc<AppContext>,
}

impl McpBridge {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn tools() -> Vec<Tool> {
        vec![
            tool(
                "open_docxai_panel",
                "Open the DocxAI panel. Call this when the user wants to edit or improve a \
                 Word document: the panel lets them upload a .docx file, review suggestions \
                 and download the result.",
                json!({ "type": "object", "properties": {}, "additionalProperties": false }),
                ToolAnnotations::new().read_only(true),
                Some(widget_meta("Opening DocxAI panel...", "Panel open. Upload your file above.")),
            ),
            tool(
                "upload_document",
                "Upload a Word document (.docx) for editing, either from a publicly \
                 accessible URL (`file_url`) or as base64 (`content_base64`). Returns the \
                 doc_id to pass to analyze_document.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": { "type": "string", "description": "Name of the file, e.g. report.docx" },
                        "file_url": { "type": "string", "description": "Public URL of the .docx file" },
                        "content_base64": { "type": "string", "description": "File content, base64 encoded" }
                    },
                    "required": ["filename"],
                    "additionalProperties": false
                }),
                ToolAnnotations::new().read_only(false).destructive(false),
                Some(invocation_meta("Uploading document...", "Document uploaded", false)),
            ),
            tool(
                "analyze_document",
                "Generate paragraph-level suggestions for an uploaded document according to \
                 the user's editing request, e.g. \"make it more formal\" or \"make it more \
                 concise\".",
                json!({
                    "type": "object",
                    "properties": {
                        "doc_id": { "type": "string", "description": "Id returned by upload_document" },
                        "request": { "type": "string", "description": "What to change about the document" }
                    },
                    "required": ["doc_id", "request"],
                    "additionalProperties": false
                }),
                ToolAnnotations::new().read_only(true),
                Some(widget_meta("Analyzing document...", "Analysis complete")),
            ),
            tool(
                "apply_changes",
                "Apply selected suggestions to the document and return a download link for \
                 the modified copy. The original upload is never changed.",
                json!({
                    "type": "object",
                    "properties": {
                        "doc_id": { "type": "string" },
                        "suggestion_ids": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Ids of the suggestions to apply, e.g. [\"s1\", \"s3\"]"
                        }
                    },
                    "required": ["doc_id", "suggestion_ids"],
                    "additionalProperties": false
                }),
                ToolAnnotations::new().read_only(false).destructive(false),
                Some(widget_meta("Applying changes...", "Changes applied")),
            ),
        ]
    }

    fn widget_resource() -> Resource {
        let mut raw = RawResource::new(WIDGET_URI, "Document Editor Widget".to_string());
        raw.description = Some("Upload, review and apply document suggestions".to_string());
        raw.mime_type = Some(WIDGET_MIME.to_string());
        raw.no_annotation()
    }

    fn open_panel_prompt() -> Prompt {
        Prompt {
            name: "open_panel".to_string(),
            title: Some("Open DocxAI panel".to_string()),
            description: Some("Open the DocxAI document editing panel".to_string()),
            arguments: None,
            icons: None,
            meta: None,
        }
    }

    pub async fn widget_contents(&self) -> ResourceContents {
        let html = self.ctx.widget_html().await;
        let mut contents = ResourceContents::text(html, WIDGET_URI);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some(WIDGET_MIME.to_string());
        }
        contents
    }

    /// Runs one tool. Domain failures become error results the model can
    /// read; malformed arguments are protocol errors.
    pub async fn dispatch(&self, name: &str, args: &JsonObject) -> Result<CallToolResult, McpError> {
        debug!(tool = name, "mcp tool call");
        let outcome = match name {
            "open_docxai_panel" => Ok(self.open_panel().await),
            "upload_document" => self.upload(args).await,
            "analyze_document" => self.analyze(args).await,
            "apply_changes" => self.apply(args).await,
            other => {
                return Err(McpError::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("no tool registered with name: {}", other),
                    None,
                ))
            }
        };
        match outcome {
            Ok(result) => Ok(result),
            Err(ToolFailure::Arguments(msg)) => Err(McpError::invalid_params(msg, None)),
            Err(ToolFailure::Domain(e)) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Error: {}",
                e
            ))])),
        }
    }

    async fn open_panel(&self) -> CallToolResult {
        let api_url = format!("{}/api", self.ctx.public_url().await);
        with_text(
            json!({ "status": "ready", "api_url": api_url }),
            "The DocxAI panel is open. Upload a .docx file in the panel to get suggestions.",
        )
    }

    async fn upload(&self, args: &JsonObject) -> Result<CallToolResult, ToolFailure> {
        let filename = required_str(args, "filename")?;
        let doc = match (optional_str(args, "file_url"), optional_str(args, "content_base64")) {
            (Some(url), _) => self.ctx.upload_from_url(filename, url).await?,
            (None, Some(encoded)) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ToolFailure::Arguments(format!("content_base64: {}", e)))?;
                self.ctx.upload(filename, bytes).await?
            }
            (None, None) => {
                return Err(ToolFailure::Arguments(
                    "either file_url or content_base64 is required".to_string(),
                ))
            }
        };
        let text = format!(
            "Uploaded '{}' successfully.\n\nDocument ID: {}\nWord count: {}\nParagraphs: {}",
            doc.filename, doc.id, doc.stats.word_count, doc.stats.paragraph_count
        );
        Ok(with_text(
            json!({ "doc_id": doc.id, "filename": doc.filename, "metadata": doc.stats }),
            text,
        ))
    }

    async fn analyze(&self, args: &JsonObject) -> Result<CallToolResult, ToolFailure> {
        let doc_id = required_str(args, "doc_id")?;
        let request = required_str(args, "request")?;
        let doc = self.ctx.document(doc_id)?;
        let set = self.ctx.analyze(doc_id, request).await?;
        Ok(with_text(
            json!({
                "doc_id": doc_id,
                "filename": doc.filename,
                "suggestions": set.suggestions,
            }),
            format!("Found {} suggestions for: '{}'", set.len(), request),
        ))
    }

    async fn apply(&self, args: &JsonObject) -> Result<CallToolResult, ToolFailure> {
        let doc_id = required_str(args, "doc_id")?;
        let ids: Vec<String> = match args.get("suggestion_ids") {
            Some(v) => serde_json::from_value(v.clone()).map_err(|_| {
                ToolFailure::Arguments("suggestion_ids must be an array of strings".to_string())
            })?,
            None => return Err(ToolFailure::Arguments("suggestion_ids is required".to_string())),
        };
        let result = self.ctx.apply(doc_id, &ids).await?;
        let download_url = format!("{}/api/download/{}", self.ctx.public_url().await, result.id);
        Ok(with_text(
            json!({
                "download_url": download_url,
                "result_id": result.id,
                "applied_count": result.applied_ids.len(),
                "applied_ids": result.applied_ids,
                "superseded_ids": result.superseded_ids,
            }),
            format!("Applied {} changes to document", result.applied_ids.len()),
        ))
    }
}

enum ToolFailure {
    Arguments(String),
    Domain(DocxError),
}

impl From<DocxError> for ToolFailure {
    fn from(e: DocxError) -> Self {
        ToolFailure::Domain(e)
    }
}

fn required_str<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str, ToolFailure> {
    optional_str(args, key).ok_or_else(|| ToolFailure::Arguments(format!("{} is required", key)))
}

fn optional_str<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Structured result whose text content is a human-readable summary.
fn with_text(structured: Value, text: impl Into<String>) -> CallToolResult {
    let mut result = CallToolResult::structured(structured);
    result.content = vec![Content::text(text.into())];
    result
}

fn tool(
    name: &'static str,
    description: &'static str,
    schema: Value,
    annotations: ToolAnnotations,
    meta: Option<Meta>,
) -> Tool {
    let input_schema = match schema {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema,
        output_schema: None,
        annotations: Some(annotations),
        execution: None,
        icons: None,
        meta,
    }
}

fn invocation_meta(invoking: &str, invoked: &str, widget_accessible: bool) -> Meta {
    let mut map = JsonObject::new();
    map.insert("openai/toolInvocation/invoking".into(), json!(invoking));
    map.insert("openai/toolInvocation/invoked".into(), json!(invoked));
    map.insert("openai/widgetAccessible".into(), json!(widget_accessible));
    Meta(map)
}

fn widget_meta(invoking: &str, invoked: &str) -> Meta {
    let mut meta = invocation_meta(invoking, invoked, true);
    meta.0.insert("openai/outputTemplate".into(), json!(WIDGET_URI));
    meta
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "docxai".to_string(),
                title: Some("DocxAI".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "DocxAI edits Word documents. Call open_docxai_panel to let the user upload a \
                 .docx file in the widget, or use upload_document, analyze_document and \
                 apply_changes directly."
                    .to_string(),
            ),
        }
    }

    // ── Resources ────────────────────────────────────────────────────────

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListResourcesResult::with_all_items(vec![
            Self::widget_resource(),
        ])))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if request.uri != WIDGET_URI {
            return Err(McpError::resource_not_found(
                "resource_not_found",
                Some(json!({ "uri": request.uri })),
            ));
        }
        Ok(ReadResourceResult {
            contents: vec![self.widget_contents().await],
        })
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        self.dispatch(&request.name, &args).await
    }

    // ── Prompts ──────────────────────────────────────────────────────────

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListPromptsResult::with_all_items(vec![
            Self::open_panel_prompt(),
        ])))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        if request.name != "open_panel" {
            return Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no prompt registered with name: {}", request.name),
                None,
            ));
        }
        Ok(GetPromptResult {
            description: Some("Open the DocxAI document editing panel".to_string()),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                OPEN_PANEL_PROMPT,
            )],
        })
    }
}
