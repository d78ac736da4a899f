//! URL canonicalization for lead deduplication.
//!
//! A canonical URL has no fragment, a lower-case host without `www.`, no
//! tracking parameters, no dangling `?`, and no trailing slash (except the
//! root path). Unparseable input is passed through unchanged.

use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Query keys removed by exact match. Any key starting with `utm_` is removed too.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "gclid",
    "fbclid",
    "ref",
    "source",
    "campaign",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalUrl {
    pub canonical: String,
    /// SHA-256 hex digest of `canonical`.
    pub hash: String,
}

pub fn canonicalize(raw_url: &str) -> CanonicalUrl {
    let canonical = match Url::parse(raw_url) {
        Ok(url) => normalize(url),
        Err(_) => raw_url.to_string(),
    };
    let hash = sha256_hex(&canonical);
    CanonicalUrl { canonical, hash }
}

/// Lower-cased host without a leading `www.`, or `"unknown"`.
pub fn extract_domain(raw_url: &str) -> String {
    Url::parse(raw_url)
        .ok()
        .and_then(|url| url.host_str().map(normalize_host))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn normalize(mut url: Url) -> String {
    url.set_fragment(None);

    if let Some(host) = url.host_str().map(str::to_string) {
        let normalized = normalize_host(&host);
        if normalized != host && !normalized.is_empty() {
            // An invalid replacement host keeps the parsed one.
            let _ = url.set_host(Some(&normalized));
        }
    }

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = url.path();
    if path != "/" && path.ends_with('/') {
        // Collapse every trailing slash so a second pass is a no-op.
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        url.set_path(&trimmed);
    }

    url.to_string()
}

// Every leading `www.` goes, so a second pass has nothing left to strip.
fn normalize_host(host: &str) -> String {
    host.to_lowercase().trim_start_matches("www.").to_string()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
