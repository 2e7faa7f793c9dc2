//! Share-link parsing.
//!
//! Turns the link strings users paste (full share URLs, export URLs, or bare
//! file ids) into the canonical file id the rest of the pipeline works with.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not extract a file id from link: {0}")]
    UnrecognizedLink(String),
}

/// Canonical identifier of a file within the sharing service.
///
/// Immutable once resolved; the fetcher derives every URL it touches from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Ordered: URL-shaped patterns first so a full link is never read as a bare id.
static LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/file/d/([a-zA-Z0-9_-]+)",
        r"id=([a-zA-Z0-9_-]+)",
        r"/open\?id=([a-zA-Z0-9_-]+)",
        r"^([a-zA-Z0-9_-]{25,})$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static link pattern"))
    .collect()
});

/// Resolve a user-supplied link into a [`ResourceId`].
///
/// Tries each known link shape in order and returns the first captured id.
/// The input is used as-is: no trimming or case folding.
pub fn resolve(link: &str) -> Result<ResourceId, ResolveError> {
    for pattern in LINK_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(link) {
            return Ok(ResourceId(captures[1].to_string()));
        }
    }

    Err(ResolveError::UnrecognizedLink(link.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_path_style_link() {
        let id = resolve("https://drive.google.com/file/d/1A2b3C4d5E6f7G8h/view?usp=sharing")
            .unwrap();
        assert_eq!(id.as_str(), "1A2b3C4d5E6f7G8h");
    }

    #[test]
    fn resolves_query_parameter_link() {
        let id = resolve("https://drive.google.com/uc?export=download&id=XyZ_123-abc").unwrap();
        assert_eq!(id.as_str(), "XyZ_123-abc");
    }

    #[test]
    fn resolves_open_link() {
        let id = resolve("https://drive.google.com/open?id=0B1234abcd_efgh").unwrap();
        assert_eq!(id.as_str(), "0B1234abcd_efgh");
    }

    #[test]
    fn resolves_bare_id() {
        let id = resolve("ABCDEF1234567890abcdef1234").unwrap();
        assert_eq!(id.as_str(), "ABCDEF1234567890abcdef1234");
    }

    #[test]
    fn rejects_short_bare_token() {
        // 24 chars, below the bare-id threshold
        assert!(resolve("ABCDEF1234567890abcdef12").is_err());
    }

    #[test]
    fn rejects_unrecognized_link() {
        let err = resolve("https://example.com/nothing/here").unwrap_err();
        assert!(matches!(err, ResolveError::UnrecognizedLink(_)));
    }

    #[test]
    fn url_patterns_win_over_bare_id() {
        // A full URL contains plenty of id-alphabet characters; the path-style
        // pattern must capture the real id, not the whole string.
        let id = resolve("https://drive.google.com/file/d/ABCDEF1234567890abcdef12/view").unwrap();
        assert_eq!(id.as_str(), "ABCDEF1234567890abcdef12");
    }
}
