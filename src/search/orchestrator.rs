//! The single public entry point of the search pipeline.
//!
//! ```text
//! query ─► validate ─► cache hit? ──────────────────────────────► return
//!                         │ miss
//!                         ▼
//!              begin(locale) + race(primary, timeout)
//!                ├─ Completed ─► group ─► cache ─► return (primary)
//!                ├─ Superseded ─► newer request's result
//!                │                  (own fallback if the newer one was dropped)
//!                └─ Failed ─► fallback ─► group ─► cache ─► return (fallback)
//!                                  └─ error ─► "Search temporarily unavailable"
//! ```
//!
//! [`SearchOrchestrator::search_content`] never fails: every path resolves to
//! a well-formed [`SearchResultSet`].

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cache::SessionCache;
use super::coordinator::{RaceOutcome, RequestCoordinator, Successor, Ticket};
use super::fallback::{FallbackError, FallbackSearch, StaticIndexClient};
use super::group::ResultGrouper;
use super::primary::{HttpPrimaryClient, PrimarySearch};
use super::validate::{NormalizedQuery, validate_query};
use crate::config::{ConfigError, SearchConfig};
use crate::model::types::{Locale, ResultSource, SearchResultSet};

/// Message for the terminal result when both tiers failed.
pub const UNAVAILABLE_MESSAGE: &str = "Search temporarily unavailable";

/// Errors raised while building an orchestrator. Searching itself never fails.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid search configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("building http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("search pipeline already initialized")]
    AlreadyInitialized,
}

pub struct SearchOrchestrator<P = HttpPrimaryClient, F = StaticIndexClient> {
    primary: P,
    fallback: F,
    grouper: ResultGrouper,
    cache: SessionCache,
    coordinator: RequestCoordinator,
    result_limit: usize,
}

impl SearchOrchestrator {
    /// HTTP-backed orchestrator for `config`.
    pub fn from_config(config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let primary = HttpPrimaryClient::new(config.base_url.clone())?;
        let fallback = StaticIndexClient::new(
            config.index_location.clone(),
            config.fallback_ranking,
            config.fallback_timeout,
        )?;
        Ok(Self::new(&config, primary, fallback))
    }
}

impl<P, F> SearchOrchestrator<P, F>
where
    P: PrimarySearch,
    F: FallbackSearch,
{
    pub fn new(config: &SearchConfig, primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            grouper: ResultGrouper::new(config.collections.iter().copied()),
            cache: SessionCache::new(),
            coordinator: RequestCoordinator::new(config.primary_timeout),
            result_limit: config.result_limit,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Empty the session cache. In-flight requests are unaffected.
    pub fn clear_search_cache(&self) {
        self.cache.clear();
        debug!("search cache cleared");
    }

    /// Resolve `raw` for `locale`.
    pub async fn search_content(&self, raw: &str, locale: Locale) -> Arc<SearchResultSet> {
        let query = match validate_query(raw) {
            Ok(query) => query,
            Err(rejection) => {
                debug!(%locale, reason = %rejection, "query rejected");
                return Arc::new(
                    self.grouper
                        .empty(ResultSource::Primary, Some(rejection.to_string())),
                );
            }
        };

        if let Some(hit) = self.cache.get(locale, &query.key) {
            debug!(%locale, key = %query.key, "search cache hit");
            return hit;
        }

        let started = Instant::now();
        let ticket = self.coordinator.begin(locale);
        let _settle = self.coordinator.settle_on_drop(&ticket);
        info!(
            %locale,
            query = %query.trimmed,
            generation = ticket.generation,
            "search_start"
        );

        let outcome = self
            .coordinator
            .race(
                &ticket,
                self.primary
                    .search(&query.trimmed, locale, self.result_limit, ticket.token()),
            )
            .await;

        let (result, cacheable) = match outcome {
            RaceOutcome::Completed(docs) => {
                (self.grouper.group(docs, ResultSource::Primary), true)
            }
            RaceOutcome::Superseded => return self.successor_result(&ticket, &query).await,
            RaceOutcome::Failed(err) => {
                warn!(%locale, query = %query.trimmed, error = %err, "primary search unavailable, using fallback");
                match self.fallback_result(&query, locale).await {
                    Ok(result) => (result, true),
                    Err(fallback_err) => {
                        error!(
                            %locale,
                            query = %query.trimmed,
                            primary_error = %err,
                            error = %fallback_err,
                            "search unavailable"
                        );
                        (self.unavailable(), false)
                    }
                }
            }
        };

        // a newer request for this locale may have begun while the fallback loaded
        if !self.coordinator.is_latest(&ticket) {
            return self.successor_result(&ticket, &query).await;
        }

        let result = Arc::new(result);
        if cacheable {
            self.cache.set(locale, &query.key, Arc::clone(&result));
        }
        self.coordinator.publish(&ticket, Arc::clone(&result));
        info!(
            %locale,
            source = %result.source,
            hits = result.total(),
            cached = cacheable,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search_settled"
        );
        result
    }

    /// Result for a superseded request. Nothing here touches the cache.
    async fn successor_result(
        &self,
        ticket: &Ticket,
        query: &NormalizedQuery,
    ) -> Arc<SearchResultSet> {
        match self.coordinator.await_successor(ticket).await {
            Successor::Settled(result) => result,
            Successor::Abandoned => {
                debug!(
                    locale = %ticket.locale,
                    generation = ticket.generation,
                    "successor dropped, answering from fallback"
                );
                match self.fallback_result(query, ticket.locale).await {
                    Ok(result) => Arc::new(result),
                    Err(err) => {
                        error!(
                            locale = %ticket.locale,
                            query = %query.trimmed,
                            error = %err,
                            "search unavailable"
                        );
                        Arc::new(self.unavailable())
                    }
                }
            }
        }
    }

    async fn fallback_result(
        &self,
        query: &NormalizedQuery,
        locale: Locale,
    ) -> Result<SearchResultSet, FallbackError> {
        let docs = self.fallback.search(query, locale).await?;
        Ok(self.grouper.group(docs, ResultSource::Fallback))
    }

    fn unavailable(&self) -> SearchResultSet {
        self.grouper
            .empty(ResultSource::Fallback, Some(UNAVAILABLE_MESSAGE.to_string()))
    }
}
