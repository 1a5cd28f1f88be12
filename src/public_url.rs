//! Discovery of the base URL remote clients use to reach this server.
//!
//! Resolution order:
//!
//! 1. `server.public_url` from the config file
//! 2. the local ngrok inspection API (`server.tunnel_api`, 2 second timeout)
//! 3. the `NGROK_URL` environment variable
//! 4. `http://localhost:<port>`
//!
//! Discovery runs per request, so a tunnel started after the server is
//! picked up without a restart.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::Config;

const TUNNEL_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PORT: u16 = 8787;

#[derive(Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<Tunnel>,
}

#[derive(Deserialize)]
struct Tunnel {
    public_url: String,
    #[serde(default)]
    proto: String,
}

pub struct PublicUrlResolver {
    configured: Option<String>,
    tunnel_api: String,
    port: u16,
    http: reqwest::Client,
}

impl PublicUrlResolver {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(TUNNEL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            configured: config
                .server
                .public_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            tunnel_api: config.server.tunnel_api.clone(),
            port: config.bind_port().unwrap_or(DEFAULT_PORT),
            http,
        }
    }

    /// Base URL without a trailing slash.
    pub async fn resolve(&self) -> String {
        self.resolve_with_env(std::env::var("NGROK_URL").ok()).await
    }

    async fn resolve_with_env(&self, env_url: Option<String>) -> String {
        let url = match &self.configured {
            Some(url) => url.clone(),
            None => match self.discover_tunnel().await {
                Some(url) => url,
                None => env_url
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| format!("http://localhost:{}", self.port)),
            },
        };
        url.trim_end_matches('/').to_string()
    }

    async fn discover_tunnel(&self) -> Option<String> {
        let response = match self.http.get(&self.tunnel_api).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "tunnel API returned an error");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "tunnel API unreachable");
                return None;
            }
        };
        let list: TunnelList = response.json().await.ok()?;
        pick_tunnel(list.tunnels)
    }
}

/// Prefers an https tunnel, otherwise the first one listed.
fn pick_tunnel(tunnels: Vec<Tunnel>) -> Option<String> {
    let https = tunnels
        .iter()
        .position(|t| t.proto == "https" || t.public_url.starts_with("https://"));
    let index = https.unwrap_or(0);
    tunnels.into_iter().nth(index).map(|t| t.public_url)
}
