//! Search layer facade.
//!
//! This module provides the content search resolution pipeline:
//!
//! - **[`validate`]**: Trimming and length bounds for raw query input.
//! - **[`normalize`]**: Case- and diacritic-folded comparison keys.
//! - **[`cache`]**: Session-scoped memo of resolved result sets.
//! - **[`coordinator`]**: Per-locale supersession and the primary/timeout race.
//! - **[`primary`]**: Live backend search client.
//! - **[`fallback`]**: Static per-locale index with local contains-matching.
//! - **[`group`]**: Classification of hits into collection buckets.
//! - **[`orchestrator`]**: The composed, never-failing entry point.
//!
//! The free functions below operate on a process-wide default orchestrator,
//! built on first use from [`SearchConfig::from_env`] unless [`init`] ran
//! first.

pub mod cache;
pub mod coordinator;
pub mod fallback;
pub mod group;
pub mod normalize;
pub mod orchestrator;
pub mod primary;
pub mod validate;

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::SearchConfig;
use crate::model::types::{Locale, ResultSource, SearchResultSet};

pub use orchestrator::{SearchError, SearchOrchestrator, UNAVAILABLE_MESSAGE};

static DEFAULT: OnceCell<SearchOrchestrator> = OnceCell::new();

/// Install the process-wide orchestrator built from `config`.
pub fn init(config: SearchConfig) -> Result<(), SearchError> {
    let orchestrator = SearchOrchestrator::from_config(config)?;
    DEFAULT
        .set(orchestrator)
        .map_err(|_| SearchError::AlreadyInitialized)
}

fn default_orchestrator() -> Result<&'static SearchOrchestrator, SearchError> {
    DEFAULT.get_or_try_init(|| SearchOrchestrator::from_config(SearchConfig::from_env()))
}

/// Resolve `query` for `locale` on the default orchestrator. Never fails.
pub async fn search_content(query: &str, locale: Locale) -> Arc<SearchResultSet> {
    match default_orchestrator() {
        Ok(orchestrator) => orchestrator.search_content(query, locale).await,
        Err(err) => {
            tracing::error!(error = %err, "search pipeline could not be constructed");
            let config = SearchConfig::default();
            Arc::new(
                group::ResultGrouper::new(config.collections)
                    .empty(ResultSource::Fallback, Some(UNAVAILABLE_MESSAGE.to_string())),
            )
        }
    }
}

/// Empty the default orchestrator's session cache.
pub fn clear_search_cache() {
    if let Some(orchestrator) = DEFAULT.get() {
        orchestrator.clear_search_cache();
    }
}
