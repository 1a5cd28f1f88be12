//! End-to-end tests against a running server with the heuristic generator.

use std::sync::Arc;
use std::time::Duration;

use docxai::config::Config;
use docxai::context::AppContext;
use docxai::docx::{build_docx, read_document_bytes, MIME_DOCX};
use docxai::server::build_router;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;

const LONG_PARAGRAPH: &str = "This paragraph can't stop talking about the very many things that \
matter to the team, including budgets, timelines, staffing plans, vendor contracts, office moves, \
training schedules, security reviews, and the quarterly offsite that everyone keeps asking about.";

const PARAGRAPHS: [&str; 3] = [
    "We don't really know the answer.",
    LONG_PARAGRAPH,
    "Plain final paragraph.",
];

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let mut cfg = Config::default();
        cfg.server.bind = format!("127.0.0.1:{}", port);
        cfg.server.public_url = Some(format!("http://127.0.0.1:{}", port));
        cfg.storage.uploads_dir = tmp.path().join("uploads");
        cfg.widget.html_path = tmp.path().join("missing/index.html");

        // No completion client: suggestions come from the heuristics.
        let ctx = Arc::new(AppContext::new(cfg.clone(), None).unwrap());
        let app = build_router(ctx);
        let listener = tokio::net::TcpListener::bind(&cfg.server.bind).await.unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        wait_for_server(port).await;

        Self {
            _tmp: tmp,
            base: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(MIME_DOCX)
            .unwrap();
        self.client
            .post(self.url("/api/upload"))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .unwrap()
    }

    async fn upload_ok(&self, filename: &str, paragraphs: &[&str]) -> String {
        let resp = self.upload(filename, build_docx(paragraphs).unwrap()).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["doc_id"].as_str().unwrap().to_string()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoints() {
    let server = TestServer::start().await;
    for path in ["/", "/api", "/health"] {
        let resp = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 200, "GET {}", path);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["suggestions"], "heuristic");
    }
}

/// Upload a 3-paragraph document, get 5 suggestions, apply 2 of them and
/// check that exactly the two targeted paragraphs changed.
#[tokio::test]
async fn test_upload_analyze_apply_download() {
    let server = TestServer::start().await;

    let resp = server
        .upload("Azure.docx", build_docx(&PARAGRAPHS).unwrap())
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "Azure.docx");
    assert_eq!(body["metadata"]["paragraph_count"], 3);
    let doc_id = body["doc_id"].as_str().unwrap().to_string();

    let resp = server
        .post(
            "/api/analyze",
            json!({ "doc_id": doc_id, "query": "improve this document" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let suggestions: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(suggestions.len(), 5);
    let ids: Vec<&str> = suggestions.iter().map(|s| s["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3", "s4", "s5"]);
    assert_eq!(suggestions[0]["paragraph_index"], 0);
    assert_eq!(suggestions[2]["paragraph_index"], 1);

    let resp = server
        .post(
            "/api/apply",
            json!({ "doc_id": doc_id, "suggestion_ids": ["s1", "s3"] }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["applied_count"], 2);
    let download_url = body["download_url"].as_str().unwrap().to_string();
    assert!(download_url.starts_with(&server.base));

    let resp = server.client.get(&download_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], MIME_DOCX);
    let disposition = resp.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("Azure_modified.docx"), "{}", disposition);
    let bytes = resp.bytes().await.unwrap();

    let modified = read_document_bytes(&bytes).unwrap();
    assert_eq!(modified.total_paragraphs(), 3);
    assert_eq!(modified.paragraphs[0].text, "We do not really know the answer.");
    assert_ne!(modified.paragraphs[1].text, LONG_PARAGRAPH);
    assert!(modified.paragraphs[1].text.contains("cannot"));
    assert!(modified.paragraphs[1].text.contains("very"));
    assert_eq!(modified.paragraphs[2].text, PARAGRAPHS[2]);

    // The document id resolves to its latest result.
    let resp = server
        .client
        .get(server.url(&format!("/api/download/{}", doc_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_request_alias_and_validation() {
    let server = TestServer::start().await;
    let doc_id = server
        .upload_ok("a.docx", &["We don't think this works."])
        .await;

    let resp = server
        .post(
            "/api/analyze",
            json!({ "doc_id": doc_id, "request": "Make it more formal" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let suggestions: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(suggestions[0]["suggested"], "We do not think this works.");
    assert_eq!(suggestions[0]["category"], "tone");

    let resp = server.post("/api/analyze", json!({ "doc_id": doc_id })).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = server
        .post("/api/analyze", json!({ "doc_id": "nope", "query": "x" }))
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");
}

#[tokio::test]
async fn test_unreadable_upload() {
    let server = TestServer::start().await;
    let resp = server.upload("a.docx", b"hello, not a zip".to_vec()).await;
    assert_eq!(resp.status(), 422);
    assert_eq!(error_code(resp).await, "unreadable_document");

    let resp = server
        .client
        .post(server.url("/api/upload"))
        .multipart(Form::new().text("other", "value"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_apply_unknown_suggestion_is_rejected() {
    let server = TestServer::start().await;
    let doc_id = server.upload_ok("a.docx", &["They can't come."]).await;

    let resp = server
        .post("/api/apply", json!({ "doc_id": doc_id, "suggestion_ids": ["s1"] }))
        .await;
    assert_eq!(resp.status(), 404, "apply before analyze");

    server
        .post("/api/analyze", json!({ "doc_id": doc_id, "query": "formal" }))
        .await;
    let resp = server
        .post(
            "/api/apply",
            json!({ "doc_id": doc_id, "suggestion_ids": ["s1", "s99"] }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "unknown_suggestion");

    let resp = server
        .client
        .get(server.url(&format!("/api/download/{}", doc_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404, "no file may be written");
}

#[tokio::test]
async fn test_apply_reports_only_written_suggestions() {
    let server = TestServer::start().await;
    let doc_id = server.upload_ok("a.docx", &["We don't really know."]).await;

    let resp = server
        .post("/api/analyze", json!({ "doc_id": doc_id, "query": "improve" }))
        .await;
    let suggestions: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(suggestions.len(), 2);
    assert!(suggestions.iter().all(|s| s["paragraph_index"] == 0));

    let resp = server
        .post(
            "/api/apply",
            json!({ "doc_id": doc_id, "suggestion_ids": ["s1", "s2"] }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["applied_count"], 1);
    assert_eq!(body["applied_ids"], json!(["s2"]));
    assert_eq!(body["superseded_ids"], json!(["s1"]));

    let download_url = body["download_url"].as_str().unwrap();
    let bytes = server
        .client
        .get(download_url)
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let modified = read_document_bytes(&bytes).unwrap();
    assert_eq!(modified.paragraphs[0].text, "We don't know.");
}

#[tokio::test]
async fn test_delete_document() {
    let server = TestServer::start().await;
    let doc_id = server.upload_ok("a.docx", &["It's fine."]).await;
    server
        .post("/api/analyze", json!({ "doc_id": doc_id, "query": "formal" }))
        .await;
    let resp = server
        .post("/api/apply", json!({ "doc_id": doc_id, "suggestion_ids": ["s1"] }))
        .await;
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .delete(server.url(&format!("/api/documents/{}", doc_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .get(server.url(&format!("/api/download/{}", doc_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = server
        .client
        .delete(server.url(&format!("/api/documents/{}", doc_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_concurrent_analyze_same_document() {
    let server = TestServer::start().await;
    let doc_id = server
        .upload_ok("a.docx", &["We don't really know.", "It's very late."])
        .await;

    let a = server.post(
        "/api/analyze",
        json!({ "doc_id": doc_id, "query": "make it formal" }),
    );
    let b = server.post(
        "/api/analyze",
        json!({ "doc_id": doc_id, "query": "improve" }),
    );
    let (a, b) = tokio::join!(a, b);
    assert_eq!(a.status(), 200);
    assert_eq!(b.status(), 200);

    // Whichever set won, its ids apply cleanly.
    let resp = server
        .post("/api/apply", json!({ "doc_id": doc_id, "suggestion_ids": ["s1", "s2"] }))
        .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_widget_has_api_url() {
    let server = TestServer::start().await;
    let resp = server.client.get(server.url("/widget")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains(&format!("window.DOCX_API_URL = \"{}/api\"", server.base)));
}

#[tokio::test]
async fn test_mcp_initialize() {
    let server = TestServer::start().await;
    let mut resp = server
        .client
        .post(server.url("/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "api-test", "version": "0.0.0" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut seen = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = resp.chunk().await.unwrap() {
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains("serverInfo") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no initialize response, got: {}", seen);
    assert!(seen.contains("\"docxai\""), "{}", seen);
}
