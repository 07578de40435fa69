use crate::util::env_flag;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEBUG_PAYLOAD_ENV: &str = "ACTIONWIRE_DEBUG_PAYLOAD";
const LOG_PATH_ENV: &str = "ACTIONWIRE_LOG_PATH";
const DEFAULT_FILTER: &str = "warn";

pub fn debug_payload_enabled() -> bool {
    env_flag(DEBUG_PAYLOAD_ENV)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "actionwire::payload",
        url = request_url,
        "request payload:\n{formatted_payload}"
    );
}

pub fn emit_frame_parse_error(event: &str, raw_frame: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        event,
        error = %parse_error,
        "event-stream frame data is not valid JSON:\n{raw_frame}"
    );
}

/// Installs the global subscriber. `RUST_LOG` controls the filter; output
/// goes to `ACTIONWIRE_LOG_PATH` when set, stderr otherwise.
pub fn init_tracing() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match resolve_log_path() {
        Some(path) => {
            let file = open_log_file(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

fn resolve_log_path() -> Option<PathBuf> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
