//! Item identity extraction.
//!
//! The platform's URL shape drifts between polls (short links, trailing
//! slashes, tracking query strings), so identity is derived in two tiers:
//! the numeric `/video/<digits>` id when present, otherwise the last path
//! segment.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::domain::ItemId;

static VIDEO_ID: OnceLock<Regex> = OnceLock::new();

fn video_id_re() -> &'static Regex {
    VIDEO_ID.get_or_init(|| Regex::new(r"/video/(\d+)(?:/|$)").expect("valid regex"))
}

/// Derive the canonical identity for an item URL.
///
/// Returns `None` for empty input and for URLs whose last segment is only a
/// marker (`@` or an `@handle` profile segment).
pub fn extract(url: &str) -> Option<ItemId> {
    let path = path_of(url.trim());

    if let Some(caps) = video_id_re().captures(&path) {
        return Some(ItemId(caps[1].to_string()));
    }

    let last = path.split('/').rev().find(|s| !s.trim().is_empty())?.trim();
    if is_marker(last) {
        return None;
    }
    Some(ItemId(last.to_string()))
}

/// True for absolute `http`/`https` URLs with a host. Anything else must not
/// reach a downloader, which would read it as a local path or an option.
pub fn is_web_url(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.has_host(),
        Err(_) => false,
    }
}

/// Path component without query string or fragment.
///
/// Absolute URLs are parsed so the host never counts as a segment; anything
/// else is treated as a bare path.
fn path_of(raw: &str) -> String {
    if let Ok(parsed) = Url::parse(raw) {
        if parsed.has_host() {
            return parsed.path().to_string();
        }
    }
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    raw[..end].to_string()
}

fn is_marker(segment: &str) -> bool {
    segment.starts_with('@')
}
