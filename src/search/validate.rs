//! Bounds checks for raw query input.

use thiserror::Error;

use super::normalize::fold_key;

pub const MIN_QUERY_CHARS: usize = 3;
pub const MAX_QUERY_CHARS: usize = 100;

/// A query that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Trimmed input, original casing and diacritics. Sent to the backend.
    pub trimmed: String,
    /// Folded comparison key. Used for cache keys and fallback matching.
    pub key: String,
}

/// Why a query was refused before any lookup.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRejection {
    #[error("Query too short (minimum {} characters)", MIN_QUERY_CHARS)]
    TooShort,
    #[error("Query too long (maximum {} characters)", MAX_QUERY_CHARS)]
    TooLong,
}

/// Trim `raw` and check its length in characters.
pub fn validate_query(raw: &str) -> Result<NormalizedQuery, QueryRejection> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len < MIN_QUERY_CHARS {
        return Err(QueryRejection::TooShort);
    }
    if len > MAX_QUERY_CHARS {
        return Err(QueryRejection::TooLong);
    }
    Ok(NormalizedQuery {
        trimmed: trimmed.to_string(),
        key: fold_key(trimmed),
    })
}
