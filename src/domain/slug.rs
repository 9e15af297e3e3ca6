//! Slug handling for catalog entities.
//!
//! Hardcover slugs are lowercase ASCII with `-` separators. Requests may arrive
//! in any case, so everything entering the aggregator goes through
//! [`normalize_slug`] first. Cache keys end with the slug, which
//! [`slug_from_key`] recovers when a bulk loader maps keys back to queries.

use thiserror::Error;

const MAX_SLUG_LEN: usize = 128;

/// Errors raised when a path segment cannot be used as a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug is empty")]
    EmptyInput,
    #[error("slug `{input}` contains unsupported characters")]
    InvalidCharacters { input: String },
    #[error("slug exceeds {MAX_SLUG_LEN} characters")]
    TooLong,
}

/// Lower-case and validate a user-supplied slug or username.
pub fn normalize_slug(input: &str) -> Result<String, SlugError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if trimmed.len() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SlugError::InvalidCharacters {
            input: trimmed.to_string(),
        });
    }

    Ok(trimmed.to_ascii_lowercase())
}

/// Final `/`-separated segment of a cache key.
pub fn slug_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case() {
        assert_eq!(
            normalize_slug("Brandon-Sanderson").as_deref(),
            Ok("brandon-sanderson")
        );
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(matches!(
            normalize_slug("../etc"),
            Err(SlugError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn rejects_blank() {
        assert_eq!(normalize_slug("  "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn extracts_slug_from_key() {
        assert_eq!(slug_from_key("hardcover/series/stormlight"), "stormlight");
        assert_eq!(slug_from_key("plain"), "plain");
    }
}
