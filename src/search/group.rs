//! Classification of raw hits into collection buckets.
//!
//! `relationTo` is validated here, at the ingestion boundary. Hits for
//! collections that are unknown or not configured are dropped so the result
//! shape stays stable while backend content types evolve.

use std::collections::BTreeMap;

use tracing::trace;

use crate::model::types::{CollectionKind, RawSearchDoc, ResultSource, SearchDoc, SearchResultSet};

#[derive(Debug, Clone)]
pub struct ResultGrouper {
    kinds: Vec<CollectionKind>,
}

impl ResultGrouper {
    pub fn new(kinds: impl IntoIterator<Item = CollectionKind>) -> Self {
        let mut recognized: Vec<CollectionKind> = Vec::new();
        for kind in kinds {
            if !recognized.contains(&kind) {
                recognized.push(kind);
            }
        }
        Self { kinds: recognized }
    }

    pub fn kinds(&self) -> &[CollectionKind] {
        &self.kinds
    }

    fn empty_buckets(&self) -> BTreeMap<CollectionKind, Vec<SearchDoc>> {
        self.kinds.iter().map(|kind| (*kind, Vec::new())).collect()
    }

    /// All buckets present and empty.
    pub fn empty(&self, source: ResultSource, error: Option<String>) -> SearchResultSet {
        SearchResultSet {
            results: self.empty_buckets(),
            source,
            error,
        }
    }

    /// File each doc under its collection, preserving input order.
    pub fn group(&self, docs: Vec<RawSearchDoc>, source: ResultSource) -> SearchResultSet {
        let mut results = self.empty_buckets();
        for raw in docs {
            let Ok(kind) = raw.relation_to.parse::<CollectionKind>() else {
                trace!(relation_to = %raw.relation_to, id = %raw.id, "dropping hit with unknown collection");
                continue;
            };
            match results.get_mut(&kind) {
                Some(bucket) => bucket.push(SearchDoc::from_raw(raw, kind)),
                None => {
                    trace!(relation_to = %kind, id = %raw.id, "dropping hit outside recognized collections");
                }
            }
        }
        SearchResultSet {
            results,
            source,
            error: None,
        }
    }
}

impl Default for ResultGrouper {
    fn default() -> Self {
        Self::new(CollectionKind::DEFAULT_RECOGNIZED)
    }
}
