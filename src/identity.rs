use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::Source;

static ACRES_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spid-([A-Za-z0-9]+)").unwrap());
static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=([0-9A-Za-z]+)").unwrap());
static TRAILING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-([0-9A-Za-z]{6,})(?:[&?#].*)?$").unwrap());
const FALLBACK_PREFIX: &str = "unknown_";

static SHORT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]\d+$").unwrap());

/// A property identifier plus whether it can be derived again from the
/// same URL. Fallback ids are timestamp based and differ between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyId {
    pub value: String,
    pub stable: bool,
}

/// Origin tag from the page host, when the host is a known listing site.
pub fn source_from_url(url: &str) -> Option<Source> {
    let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
    if host.contains("99acres") {
        Some(Source::Acres)
    } else if host.contains("magicbricks") {
        Some(Source::MagicBricks)
    } else {
        None
    }
}

/// Best-effort origin from the identifier's shape alone.
pub fn source_from_id(id: &str) -> Source {
    let id = id.trim();
    if id.starts_with(FALLBACK_PREFIX) {
        Source::Unknown
    } else if SHORT_CODE_RE.is_match(id) {
        Source::Acres
    } else if id.chars().count() > 15 {
        Source::MagicBricks
    } else {
        Source::Unknown
    }
}

/// Derive the property id from a listing URL: the `spid-` token, then an
/// `id=` query parameter, then (on the long-id site) the trailing
/// dash-separated token. Anything else gets a non-stable `unknown_<ts>` id.
pub fn derive_property_id(url: &str) -> PropertyId {
    if let Some(caps) = ACRES_ID_RE.captures(url) {
        return stable(&caps[1]);
    }
    if let Some(caps) = QUERY_ID_RE.captures(url) {
        return stable(&caps[1]);
    }
    if source_from_url(url) == Some(Source::MagicBricks) {
        if let Some(caps) = TRAILING_ID_RE.captures(url) {
            return stable(&caps[1]);
        }
    }
    PropertyId {
        value: format!("{}{}", FALLBACK_PREFIX, chrono::Utc::now().timestamp()),
        stable: false,
    }
}

fn stable(value: &str) -> PropertyId {
    PropertyId {
        value: value.to_string(),
        stable: true,
    }
}

/// File-system safe form of an id, used for record and media paths. Ids
/// that had to be rewritten get a short digest of the original appended,
/// so `A/1` and `A_1` never share a file.
pub fn file_stem(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        return "unnamed".to_string();
    }
    let stem: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem == id {
        return stem;
    }
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{}-{}", stem, &digest[..8])
}
