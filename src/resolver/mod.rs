//! Price resolution
//!
//! Orchestrates the lookup order for one (symbol, date) pair: CoinGecko
//! first, Coinhall as fallback when CoinGecko has no coverage, both behind
//! the in-run cache. Rate-limit pacing and retry state live here so the
//! whole thing runs against fake sources and a paused clock in tests.
//!
//! A failed row never aborts the batch. Every unresolvable pair lands in
//! the `UnresolvedReport` with a reason, and `resolve` always returns a
//! terminal `PriceResult`.

use crate::cache::{PriceCache, PriceKey};
use crate::registry::SymbolRegistry;
use crate::sources::{PacingPolicy, PriceFetch, PriceResult, PriceSource, SourceError};
use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;

/// Retries per request on transient failure before giving up on the row
const MAX_RETRIES: u32 = 3;

/// Backoff base for transient failures that are not rate-limit signals
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);

/// Why a row could not be priced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Symbol missing from every provider mapping
    MissingConfig,
    /// Every applicable provider reported no data for the date
    NoMarketData,
    /// Providers kept failing after retries
    SourceError,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConfig => write!(f, "no symbol configuration"),
            Self::NoMarketData => write!(f, "no market data"),
            Self::SourceError => write!(f, "source error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub reason: UnresolvedReason,
}

/// Ordered list of rows that could not be priced, accumulated across the run
#[derive(Debug, Default)]
pub struct UnresolvedReport {
    rows: Vec<UnresolvedRow>,
}

impl UnresolvedReport {
    fn record(&mut self, symbol: &str, date: NaiveDate, reason: UnresolvedReason) {
        log::warn!("Could not price {} on {}: {}", symbol, date, reason);
        self.rows.push(UnresolvedRow {
            symbol: symbol.to_string(),
            date,
            reason,
        });
    }

    pub fn rows(&self) -> &[UnresolvedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Sleeps between requests per the provider's pacing policy
#[derive(Debug)]
pub struct Pacer {
    policy: PacingPolicy,
    sent: u32,
}

impl Pacer {
    pub fn new(policy: PacingPolicy) -> Self {
        Self { policy, sent: 0 }
    }

    /// Call once after every request, success or failure.
    pub async fn pace(&mut self) {
        self.sent += 1;
        let delay = match self.policy.burst {
            Some(burst) if self.sent % burst == 0 => {
                log::debug!(
                    "Request budget reached after {} requests, cooling down for {:?}",
                    self.sent,
                    self.policy.cooldown
                );
                self.policy.cooldown
            }
            _ => self.policy.per_request,
        };
        tokio::time::sleep(delay).await;
    }
}

pub struct PriceResolver {
    registry: SymbolRegistry,
    cache: PriceCache,
    primary: Box<dyn PriceSource>,
    secondary: Box<dyn PriceSource>,
    primary_pacer: Pacer,
    secondary_pacer: Pacer,
    unresolved: UnresolvedReport,
}

impl PriceResolver {
    pub fn new(
        registry: SymbolRegistry,
        primary: Box<dyn PriceSource>,
        secondary: Box<dyn PriceSource>,
    ) -> Self {
        let primary_pacer = Pacer::new(primary.pacing());
        let secondary_pacer = Pacer::new(secondary.pacing());
        Self {
            registry,
            cache: PriceCache::new(),
            primary,
            secondary,
            primary_pacer,
            secondary_pacer,
            unresolved: UnresolvedReport::default(),
        }
    }

    /// Resolve the USD price of `symbol` on `date`.
    ///
    /// Always returns a terminal result; unresolvable pairs are recorded in
    /// the report and come back as `NoCoverage` or `TransientError`.
    pub async fn resolve(&mut self, symbol: &str, date: NaiveDate) -> PriceResult {
        let primary_id = self.registry.lookup_primary(symbol).map(str::to_string);

        let primary_outcome = match &primary_id {
            Some(id) => Some(
                lookup(
                    &mut self.cache,
                    self.primary.as_ref(),
                    &mut self.primary_pacer,
                    id,
                    date,
                )
                .await,
            ),
            None => {
                log::debug!("No primary mapping for {}, trying fallback", symbol);
                None
            }
        };

        match primary_outcome {
            Some(result @ PriceResult::Resolved { .. }) => return result,
            Some(result @ PriceResult::TransientError(_)) => {
                // Retries are exhausted at this point; the fallback source
                // must not mask a primary outage with partial coverage.
                self.unresolved
                    .record(symbol, date, UnresolvedReason::SourceError);
                return result;
            }
            Some(PriceResult::NoCoverage) | None => {}
        }

        if let Some(id) = self.registry.lookup_secondary(symbol).map(str::to_string) {
            let result = lookup(
                &mut self.cache,
                self.secondary.as_ref(),
                &mut self.secondary_pacer,
                &id,
                date,
            )
            .await;
            match &result {
                PriceResult::Resolved { .. } => {}
                PriceResult::NoCoverage => {
                    self.unresolved
                        .record(symbol, date, UnresolvedReason::NoMarketData);
                }
                PriceResult::TransientError(_) => {
                    self.unresolved
                        .record(symbol, date, UnresolvedReason::SourceError);
                }
            }
            return result;
        }

        let reason = if primary_id.is_none() {
            UnresolvedReason::MissingConfig
        } else {
            UnresolvedReason::NoMarketData
        };
        self.unresolved.record(symbol, date, reason);
        PriceResult::NoCoverage
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn unresolved(&self) -> &UnresolvedReport {
        &self.unresolved
    }

    pub fn into_report(self) -> UnresolvedReport {
        self.unresolved
    }
}

/// One cached provider lookup, with retries folded in before caching.
async fn lookup(
    cache: &mut PriceCache,
    source: &dyn PriceSource,
    pacer: &mut Pacer,
    coin_id: &str,
    date: NaiveDate,
) -> PriceResult {
    let key = PriceKey {
        source: source.kind(),
        coin_id: coin_id.to_string(),
        date,
    };
    cache
        .get_or_fetch(key, || fetch_with_retry(source, pacer, coin_id, date))
        .await
}

async fn fetch_with_retry(
    source: &dyn PriceSource,
    pacer: &mut Pacer,
    coin_id: &str,
    date: NaiveDate,
) -> PriceResult {
    let policy = source.pacing();
    let mut attempt = 0u32;
    loop {
        let outcome = source.fetch_price(coin_id, date).await;
        pacer.pace().await;

        match outcome {
            Ok(PriceFetch::Price(price)) => {
                log::debug!(
                    "{} resolved {} on {} at {}",
                    source.kind().as_str(),
                    coin_id,
                    date,
                    price
                );
                return PriceResult::Resolved {
                    price,
                    source: source.kind(),
                };
            }
            Ok(PriceFetch::NoData) => return PriceResult::NoCoverage,
            Err(err) => {
                if attempt >= MAX_RETRIES {
                    log::error!(
                        "{} request for {} on {} failed after {} attempts: {}",
                        source.kind().as_str(),
                        coin_id,
                        date,
                        attempt + 1,
                        err
                    );
                    return PriceResult::TransientError(err.to_string());
                }
                let delay = retry_delay(&err, &policy, attempt);
                log::warn!(
                    "{} request for {} on {} failed ({}), retrying in {:?}",
                    source.kind().as_str(),
                    coin_id,
                    date,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential backoff; a 429 starts from the provider's cooldown window.
fn retry_delay(err: &SourceError, policy: &PacingPolicy, attempt: u32) -> Duration {
    let base = match err {
        SourceError::RateLimited => policy.cooldown,
        _ => TRANSIENT_BACKOFF,
    };
    base * 2u32.pow(attempt)
}
