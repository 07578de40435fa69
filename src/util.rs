use reqwest::Url;

/// Reads a boolean switch from the environment. Unset or unrecognized
/// values count as off.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|value| parse_flag(&value))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether `url` points at this machine: `localhost`, any `127.x` address,
/// `::1`, or `0.0.0.0`. Unparseable URLs are treated as remote.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };

    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    matches!(host.as_str(), "localhost" | "::1" | "0.0.0.0") || host.starts_with("127.")
}
