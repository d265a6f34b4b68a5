//! Static-index fallback tier.
//!
//! When the live backend is unavailable, the pipeline loads the build-time
//! snapshot `search-index-<locale>.json` and matches titles locally:
//! a descriptor is a hit iff the folded query is a substring of its folded
//! display title. There is no freshness guarantee and no third tier; a load
//! failure here is terminal for the query.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::normalize::contains_folded;
use super::validate::NormalizedQuery;
use crate::config::{FallbackRanking, IndexLocation};
use crate::model::types::{IndexDescriptor, Locale, RawSearchDoc, StaticIndex};

#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("fetching static index failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("static index {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("reading static index {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing static index: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Seam for the fallback tier.
pub trait FallbackSearch: Send + Sync {
    fn search(
        &self,
        query: &NormalizedQuery,
        locale: Locale,
    ) -> impl Future<Output = Result<Vec<RawSearchDoc>, FallbackError>> + Send;
}

pub fn index_file_name(locale: Locale) -> String {
    format!("search-index-{locale}.json")
}

#[derive(Debug, Clone)]
pub struct StaticIndexClient {
    client: Client,
    location: IndexLocation,
    ranking: FallbackRanking,
}

impl StaticIndexClient {
    pub fn new(
        location: IndexLocation,
        ranking: FallbackRanking,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("content-search/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            location,
            ranking,
        })
    }

    pub async fn load(&self, locale: Locale) -> Result<StaticIndex, FallbackError> {
        let file_name = index_file_name(locale);
        let bytes = match &self.location {
            IndexLocation::Http { base_url } => {
                let url = format!("{}/{file_name}", base_url.trim_end_matches('/'));
                let response = self.client.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FallbackError::Status {
                        url,
                        status: status.as_u16(),
                    });
                }
                response.bytes().await?.to_vec()
            }
            IndexLocation::Directory(dir) => {
                let path = dir.join(&file_name);
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| FallbackError::Read { path, source })?
            }
        };
        let index: StaticIndex = serde_json::from_slice(&bytes)?;
        debug!(
            %locale,
            version = %index.version,
            updated = %index.updated,
            docs = index.docs.len(),
            "static index loaded"
        );
        Ok(index)
    }
}

impl FallbackSearch for StaticIndexClient {
    async fn search(
        &self,
        query: &NormalizedQuery,
        locale: Locale,
    ) -> Result<Vec<RawSearchDoc>, FallbackError> {
        let index = self.load(locale).await?;
        Ok(match_descriptors(&index.docs, &query.key, self.ranking))
    }
}

/// Contains-match `key` against every descriptor title.
pub fn match_descriptors(
    docs: &[IndexDescriptor],
    key: &str,
    ranking: FallbackRanking,
) -> Vec<RawSearchDoc> {
    let mut hits: Vec<RawSearchDoc> = docs
        .iter()
        .filter(|doc| contains_folded(&doc.display_title, key))
        .map(|doc| descriptor_to_doc(doc, ranking))
        .collect();
    if ranking == FallbackRanking::Priority {
        // sort_by is stable, so equal priorities keep index order
        hits.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    }
    hits
}

fn descriptor_to_doc(doc: &IndexDescriptor, ranking: FallbackRanking) -> RawSearchDoc {
    let slug = doc.slug.as_deref().filter(|s| !s.trim().is_empty());
    let id = slug.unwrap_or(&doc.display_title).to_string();
    let priority = match ranking {
        FallbackRanking::IndexOrder => 0.0,
        FallbackRanking::Priority => doc.priority.unwrap_or(0.0),
    };
    RawSearchDoc {
        id: id.clone(),
        title: doc.display_title.clone(),
        relation_to: doc.relation_to.clone(),
        relation_id: id,
        slug: slug.map(str::to_string),
        priority,
        contact_persons: None,
    }
}
