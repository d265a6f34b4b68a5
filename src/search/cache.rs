//! Session-scoped memo of resolved queries.
//!
//! Entries live until [`SessionCache::clear`]; there is no eviction and no
//! TTL. Values are shared, so a hit hands back the very allocation that was
//! stored.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::model::types::{Locale, SearchResultSet};

#[derive(Debug, Default)]
pub struct SessionCache {
    entries: Mutex<FxHashMap<String, Arc<SearchResultSet>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locale: Locale, key: &str) -> Option<Arc<SearchResultSet>> {
        self.entries.lock().get(&cache_key(locale, key)).cloned()
    }

    pub fn set(&self, locale: Locale, key: &str, value: Arc<SearchResultSet>) {
        self.entries.lock().insert(cache_key(locale, key), value);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(locale: Locale, key: &str) -> String {
    format!("{locale}:{key}")
}
