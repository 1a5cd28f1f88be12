//! The editor widget page served at `/widget` and as the MCP UI resource.
//!
//! The page is a prebuilt single-file frontend. Before it is served, a
//! script tag telling it where the REST API lives is inserted right after
//! the opening `<head>` tag:
//!
//! ```html
//! <head><script>window.DOCX_API_URL = "https://host.example/api";</script>…
//! ```
//!
//! The URL is emitted as a JSON string literal with `</` escaped, so it can
//! neither end the string nor close the script element.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").expect("head pattern is valid"));

const PLACEHOLDER_HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>Document Editor</title></head>\n<body>\n<div id=\"root\">Widget not built yet. Run 'npm run build' in frontend/</div>\n</body>\n</html>\n";

/// Values injected into the widget page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    /// Base URL of the REST API, e.g. `https://host.example/api`.
    pub api_base_url: String,
}

impl WidgetConfig {
    /// Builds the config from a public base URL (without the `/api` suffix).
    pub fn for_public_url(public_url: &str) -> Self {
        Self {
            api_base_url: format!("{}/api", public_url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WidgetTemplate {
    html: String,
    builtin: bool,
}

impl WidgetTemplate {
    /// Reads the built page, falling back to a placeholder page when the
    /// frontend has not been built.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(html) => Self {
                html,
                builtin: false,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "widget build not found, serving placeholder");
                Self::builtin()
            }
        }
    }

    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            builtin: false,
        }
    }

    pub fn builtin() -> Self {
        Self {
            html: PLACEHOLDER_HTML.to_string(),
            builtin: true,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn render(&self, config: &WidgetConfig) -> String {
        let script = format!(
            "<script>window.DOCX_API_URL = {};</script>",
            js_string(&config.api_base_url)
        );
        match HEAD_OPEN.find(&self.html) {
            Some(m) => {
                let mut out = String::with_capacity(self.html.len() + script.len());
                out.push_str(&self.html[..m.end()]);
                out.push_str(&script);
                out.push_str(&self.html[m.end()..]);
                out
            }
            None => format!("{}{}", script, self.html),
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace("</", "<\\/")
}
