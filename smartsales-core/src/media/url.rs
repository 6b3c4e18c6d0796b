//! Base URL helpers for the device media server

use reqwest::Url;

use super::error::{MediaError, MediaResult};

/// Trim, add `http://` when no scheme is present, drop trailing `/`
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    Some(with_scheme.trim_end_matches('/').to_string())
}

/// Resolve a server-relative URL against the base
pub fn absolute_url(base: &str, relative: &str) -> String {
    if has_http_scheme(relative) {
        return relative.to_string();
    }
    if relative.starts_with('/') {
        format!("{base}{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

/// Build `<scheme>://<host>:<port>` from an address reported by the device
///
/// Explicit schemes and ports in `host` are kept; otherwise `http` and
/// `default_port` apply.
pub fn build_base_url(host: &str, default_port: u16) -> Option<String> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?;
    let port = url.port().unwrap_or(default_port);
    Some(format!("{}://{}:{}", url.scheme(), host, port))
}

/// `<base>/<segments...>` with each segment percent-encoded
pub fn endpoint_url(base: &str, segments: &[&str]) -> MediaResult<Url> {
    let normalized = normalize_base_url(base).ok_or_else(|| MediaError::InvalidBaseUrl(base.to_string()))?;
    let mut url = Url::parse(&normalized).map_err(|_| MediaError::InvalidBaseUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| MediaError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
