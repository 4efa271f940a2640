//! In-run price cache
//!
//! Memoizes resolved prices per (source, coin id, date) so a batch with many
//! rewards of the same coin on the same day costs one API request. The cache
//! lives for a single run and is dropped at exit.

use crate::sources::{PriceResult, SourceKind};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::future::Future;

/// Cache key for one provider lookup
///
/// The `source` tag keeps the two id namespaces (CoinGecko coin ids,
/// Coinhall pair addresses) explicitly apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub source: SourceKind,
    pub coin_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Default)]
pub struct PriceCache {
    entries: HashMap<PriceKey, PriceResult>,
    hits: u64,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, or run `fetch` and store it.
    ///
    /// `NoCoverage` is cached too, so a source known to lack a coin on a
    /// date is not asked again. Transient failures are never stored; a later
    /// lookup for the same key fetches again.
    pub async fn get_or_fetch<F, Fut>(&mut self, key: PriceKey, fetch: F) -> PriceResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PriceResult>,
    {
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            log::debug!(
                "Price cache hit for {} {} on {}",
                key.source.as_str(),
                key.coin_id,
                key.date
            );
            return hit.clone();
        }

        let result = fetch().await;
        if !matches!(result, PriceResult::TransientError(_)) {
            self.entries.insert(key, result.clone());
        }
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}
