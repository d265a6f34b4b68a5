//! Live backend search client.
//!
//! Talks to `GET {base}/api/search?q=&locale=&limit=`. Intermediate HTTP
//! caches are bypassed so every call reflects current content.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::types::{Locale, RawSearchDoc};

/// Errors from the primary tier. All of them route the pipeline to fallback.
#[derive(Error, Debug)]
pub enum PrimaryError {
    #[error("primary search cancelled")]
    Cancelled,

    #[error("primary search timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("primary search returned HTTP {0}")]
    Status(u16),

    #[error("primary search transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("primary search response undecodable: {0}")]
    Decode(String),
}

/// Transport seam for the live backend.
pub trait PrimarySearch: Send + Sync {
    /// Fetch raw hits. Must return [`PrimaryError::Cancelled`] promptly once
    /// `cancel` fires.
    fn search(
        &self,
        query: &str,
        locale: Locale,
        limit: usize,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Vec<RawSearchDoc>, PrimaryError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PrimaryResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Decode a response body hit by hit. Malformed hits are skipped; only a
/// body that is not a result envelope fails.
fn decode_results(body: &[u8]) -> Result<Vec<RawSearchDoc>, PrimaryError> {
    let parsed: PrimaryResponse =
        serde_json::from_slice(body).map_err(|e| PrimaryError::Decode(e.to_string()))?;
    let total = parsed.results.len();
    let docs: Vec<RawSearchDoc> = parsed
        .results
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawSearchDoc>(value) {
            Ok(doc) => Some(doc),
            Err(err) => {
                debug!(error = %err, "skipping malformed search hit");
                None
            }
        })
        .collect();
    if docs.len() < total {
        warn!(skipped = total - docs.len(), total, "primary response had malformed hits");
    }
    Ok(docs)
}

#[derive(Debug, Clone)]
pub struct HttpPrimaryClient {
    client: Client,
    base_url: String,
}

impl HttpPrimaryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("content-search/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, query: &str, locale: Locale, limit: usize) -> String {
        format!(
            "{}/api/search?q={}&locale={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            locale,
            limit
        )
    }

    async fn fetch(&self, url: &str) -> Result<Vec<RawSearchDoc>, PrimaryError> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrimaryError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        decode_results(&body)
    }
}

impl PrimarySearch for HttpPrimaryClient {
    async fn search(
        &self,
        query: &str,
        locale: Locale,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<RawSearchDoc>, PrimaryError> {
        let url = self.endpoint(query, locale, limit);
        debug!(backend = "primary", %locale, limit, "search_start");
        // dropping the request future closes the connection
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PrimaryError::Cancelled),
            result = self.fetch(&url) => result,
        }
    }
}
