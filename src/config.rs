//! TOML configuration parsing and validation.
//!
//! Every section is optional; an empty file yields a working local setup
//! (fallback heuristics, uploads in `./uploads`, server on port 8787).
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8787"
//! public_url = "https://docs.example.com"
//!
//! [storage]
//! uploads_dir = "./uploads"
//!
//! [model]
//! model = "gpt-4o"
//! chunk_paragraphs = 5
//!
//! [widget]
//! html_path = "../frontend/dist/index.html"
//! ```
//!
//! The model credential is never read from the file: it comes from the
//! `OPENAI_API_KEY` environment variable (see [`ModelConfig::api_key`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Placeholder shipped in `.env.example`; treated the same as no key.
const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub widget: WidgetConfigFile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Fixed public base URL. When unset it is discovered at request time.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Local tunnel inspection API used for discovery.
    #[serde(default = "default_tunnel_api")]
    pub tunnel_api: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            tunnel_api: default_tunnel_api(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8787".to_string()
}
fn default_tunnel_api() -> String {
    "http://127.0.0.1:4040/api/tunnels".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum paragraphs sent in one completion request.
    #[serde(default = "default_chunk_paragraphs")]
    pub chunk_paragraphs: usize,
    /// Maximum paragraph characters sent in one completion request.
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    /// Paragraphs with fewer words are not sent to the model.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            chunk_paragraphs: default_chunk_paragraphs(),
            chunk_max_chars: default_chunk_max_chars(),
            min_words: default_min_words(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_chunk_paragraphs() -> usize {
    5
}
fn default_chunk_max_chars() -> usize {
    6000
}
fn default_min_words() -> usize {
    10
}

impl ModelConfig {
    /// Returns the configured credential, or `None` when the fallback
    /// heuristics should be used instead.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .and_then(|key| usable_api_key(&key))
    }
}

fn usable_api_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key == PLACEHOLDER_API_KEY {
        None
    } else {
        Some(key.to_string())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfigFile {
    /// Prebuilt widget page; a built-in placeholder is served when missing.
    #[serde(default = "default_widget_path")]
    pub html_path: PathBuf,
}

impl Default for WidgetConfigFile {
    fn default() -> Self {
        Self {
            html_path: default_widget_path(),
        }
    }
}

fn default_widget_path() -> PathBuf {
    PathBuf::from("../frontend/dist/index.html")
}

impl Config {
    /// Port part of `server.bind`, used for the localhost fallback URL.
    pub fn bind_port(&self) -> Option<u16> {
        self.server
            .bind
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

fn validate(config: &Config) -> Result<()> {
    if config.model.chunk_paragraphs == 0 {
        anyhow::bail!("model.chunk_paragraphs must be > 0");
    }
    if config.model.chunk_max_chars == 0 {
        anyhow::bail!("model.chunk_max_chars must be > 0");
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }
    if config.storage.max_upload_bytes == 0 {
        anyhow::bail!("storage.max_upload_bytes must be > 0");
    }
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    Ok(())
}
