//! Data model for search queries and results.

pub mod types;
