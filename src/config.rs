//! Runtime configuration for the search pipeline.
//!
//! Defaults match the production site; every field can be overridden through
//! `CONTENT_SEARCH_*` environment variables (a `.env` file is honored) and,
//! in the binary, through command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::types::CollectionKind;

/// Wall-clock budget for the live backend before falling back.
pub const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound for loading the static fallback index.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Result limit forwarded to the backend.
pub const DEFAULT_RESULT_LIMIT: usize = 20;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one collection must be recognized")]
    NoCollections,

    #[error("primary timeout must be greater than zero")]
    ZeroTimeout,

    #[error("fallback timeout must be greater than zero")]
    ZeroFallbackTimeout,

    #[error("result limit must be greater than zero")]
    ZeroLimit,

    #[error("base URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),
}

/// Where the static fallback index is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    /// `{base_url}/search-index-{locale}.json` on the site host.
    Http { base_url: String },
    /// `{dir}/search-index-{locale}.json` on local disk.
    Directory(PathBuf),
}

/// How fallback matches are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FallbackRanking {
    /// Keep index order; every hit gets priority 0.
    #[default]
    #[value(name = "index")]
    IndexOrder,
    /// Carry the descriptor priority and sort descending (stable).
    Priority,
}

impl std::str::FromStr for FallbackRanking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index" | "index-order" => Ok(Self::IndexOrder),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown fallback ranking '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Backend origin, without trailing slash.
    pub base_url: String,
    pub primary_timeout: Duration,
    pub fallback_timeout: Duration,
    pub result_limit: usize,
    pub index_location: IndexLocation,
    pub fallback_ranking: FallbackRanking,
    /// Collections that get a bucket; docs outside this set are dropped.
    pub collections: Vec<CollectionKind>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            result_limit: DEFAULT_RESULT_LIMIT,
            index_location: IndexLocation::Http {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            fallback_ranking: FallbackRanking::default(),
            collections: CollectionKind::DEFAULT_RECOGNIZED.to_vec(),
        }
    }
}

impl SearchConfig {
    /// Load config from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(url) = dotenvy::var("CONTENT_SEARCH_BASE_URL") {
            cfg = cfg.with_base_url(url);
        }

        if let Ok(val) = dotenvy::var("CONTENT_SEARCH_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg.primary_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("CONTENT_SEARCH_FALLBACK_TIMEOUT_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            cfg.fallback_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = dotenvy::var("CONTENT_SEARCH_LIMIT")
            && let Ok(limit) = val.parse::<usize>()
        {
            cfg.result_limit = limit;
        }

        if let Ok(dir) = dotenvy::var("CONTENT_SEARCH_INDEX_DIR")
            && !dir.trim().is_empty()
        {
            cfg.index_location = IndexLocation::Directory(PathBuf::from(dir));
        }

        if let Ok(val) = dotenvy::var("CONTENT_SEARCH_FALLBACK_RANKING")
            && let Ok(ranking) = val.parse::<FallbackRanking>()
        {
            cfg.fallback_ranking = ranking;
        }

        if let Ok(val) = dotenvy::var("CONTENT_SEARCH_COLLECTIONS")
            && let Some(kinds) = parse_collections(&val)
        {
            cfg.collections = kinds;
        }

        cfg
    }

    /// Point both the backend and an HTTP-hosted index at `url`.
    ///
    /// A directory index location is left untouched.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into().trim().trim_end_matches('/').to_string();
        if let IndexLocation::Http { base_url } = &mut self.index_location {
            *base_url = url.clone();
        }
        self.base_url = url;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.is_empty() {
            return Err(ConfigError::NoCollections);
        }
        if self.primary_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.fallback_timeout.is_zero() {
            return Err(ConfigError::ZeroFallbackTimeout);
        }
        if self.result_limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if !is_http_url(&self.base_url) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if let IndexLocation::Http { base_url } = &self.index_location
            && !is_http_url(base_url)
        {
            return Err(ConfigError::InvalidBaseUrl(base_url.clone()));
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Parse a comma-separated collection list. Unknown names are skipped; an
/// empty result yields `None` so the caller keeps its default.
fn parse_collections(raw: &str) -> Option<Vec<CollectionKind>> {
    let mut kinds: Vec<CollectionKind> = Vec::new();
    for kind in raw
        .split(',')
        .filter_map(|part| part.trim().to_ascii_lowercase().parse::<CollectionKind>().ok())
    {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    (!kinds.is_empty()).then_some(kinds)
}
