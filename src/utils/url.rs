//! URL helpers for talking to AIM nodes.
//!
//! Keeps endpoint construction free of double slashes and rewrites
//! server-advertised stream URLs onto the configured stream base.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use aimchat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://node.example:8880"), "https://node.example:8880");
/// assert_eq!(normalize_base_url("https://node.example:8880/"), "https://node.example:8880");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without producing double slashes.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Build the URL of a slot-scoped endpoint on a node, e.g.
/// `aim_url("https://node:8880", "0", "models")` →
/// `https://node:8880/aim/0/models`.
pub fn aim_url(node_url: &str, slot: &str, endpoint: &str) -> String {
    join_url(node_url, &format!("aim/{}/{}", slot, endpoint.trim_start_matches('/')))
}

/// Rewrite a server-advertised stream URL onto our own stream base.
///
/// Nodes advertise stream URLs relative to themselves (often a loopback
/// host:port such as `http://localhost:4001/stream`). Only the path is
/// trusted; the host is replaced with the configured stream base. Returns
/// `None` when the hint is not a parseable URL.
pub fn rewrite_stream_hint(stream_base: &str, hint: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(hint).ok()?;
    Some(format!("{}{}", normalize_base_url(stream_base), parsed.path()))
}
