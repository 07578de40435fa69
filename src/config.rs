use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::{ACTION_PATH, DEFAULT_STREAM_PATH};
use crate::util::{env_flag, is_local_endpoint_url};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";
const LOCAL_CONNECT_TIMEOUT_MS: u64 = 2_000;
const REMOTE_CONNECT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub action_path: String,
    pub stream_path: String,
    pub connect_timeout_ms: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let base_url =
            std::env::var("ACTIONWIRE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let auth_token = std::env::var("ACTIONWIRE_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let action_path =
            std::env::var("ACTIONWIRE_ACTION_PATH").unwrap_or_else(|_| ACTION_PATH.to_string());
        let stream_path = std::env::var("ACTIONWIRE_STREAM_PATH")
            .unwrap_or_else(|_| DEFAULT_STREAM_PATH.to_string());
        let connect_timeout_ms = match std::env::var("ACTIONWIRE_CONNECT_TIMEOUT_MS") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid ACTIONWIRE_CONNECT_TIMEOUT_MS '{raw}'"))?,
            ),
            _ => None,
        };

        Ok(Self {
            base_url,
            auth_token,
            action_path,
            stream_path,
            connect_timeout_ms,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!(
                "Invalid ACTIONWIRE_URL '{}': expected http:// or https:// URL",
                self.base_url
            );
        }

        if url.starts_with("http://") && !self.is_local_endpoint() && !insecure_http_allowed() {
            bail!(
                "Refusing plain http:// for non-local runtime '{}'; use https:// or set ACTIONWIRE_ALLOW_INSECURE_HTTP=1",
                self.base_url
            );
        }

        if self.action_path.trim().is_empty() {
            bail!("ACTIONWIRE_ACTION_PATH must not be empty");
        }
        if self.stream_path.trim().is_empty() {
            bail!("ACTIONWIRE_STREAM_PATH must not be empty");
        }
        if self.connect_timeout_ms == Some(0) {
            bail!("ACTIONWIRE_CONNECT_TIMEOUT_MS must be greater than zero");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.base_url)
    }

    pub fn connect_timeout(&self) -> Duration {
        let millis = self.connect_timeout_ms.unwrap_or(if self.is_local_endpoint() {
            LOCAL_CONNECT_TIMEOUT_MS
        } else {
            REMOTE_CONNECT_TIMEOUT_MS
        });
        Duration::from_millis(millis)
    }
}

fn insecure_http_allowed() -> bool {
    env_flag("ACTIONWIRE_ALLOW_INSECURE_HTTP")
}
