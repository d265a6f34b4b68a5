//! Comparison keys for case- and diacritic-insensitive matching.
//!
//! The same key is used for session cache lookups and for matching queries
//! against static index titles, so "Poltéra", "POLTERA" and "Poltera" all
//! resolve to one cache entry and match the same documents.
//!
//! # Processing Pipeline
//!
//! 1. **Case folding** - full Unicode lower-casing ("Ä" → "ä")
//! 2. **Canonical decomposition (NFD)** - "é" → "e" + U+0301
//! 3. **Mark stripping** - combining marks are dropped
//!
//! Precomposed and decomposed input produce identical keys.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold `text` into its comparison key.
pub fn fold_key(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Whether `haystack` contains an already-folded `needle_key`.
///
/// An empty key never matches.
pub fn contains_folded(haystack: &str, needle_key: &str) -> bool {
    !needle_key.is_empty() && fold_key(haystack).contains(needle_key)
}
