//! Price Source Framework
//!
//! Historical daily USD prices come from two providers:
//! - CoinGecko (general market data, queried first)
//! - Coinhall (Terra DEX pair tracker, fallback for symbols CoinGecko lacks)
//!
//! Both speak HTTP and both enforce hard rate limits, so every adapter
//! publishes a `PacingPolicy` that the resolver's pacer honors between
//! requests.

pub mod coingecko;
pub mod coinhall;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which provider a price (or cache entry) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    CoinGecko,
    Coinhall,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoinGecko => "COINGECKO",
            Self::Coinhall => "COINHALL",
        }
    }
}

/// Outcome of a single provider request that got a well-formed answer
#[derive(Debug, Clone, PartialEq)]
pub enum PriceFetch {
    /// Daily USD spot price
    Price(f64),
    /// The provider has no data for this id/date combination
    NoData,
}

/// Request failures, distinct from the semantic "no data" answer
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Self-throttling policy for a provider's rate limit
#[derive(Debug, Clone, Copy)]
pub struct PacingPolicy {
    /// Delay inserted after every request
    pub per_request: Duration,
    /// Requests allowed before the long `cooldown` pause kicks in
    pub burst: Option<u32>,
    /// Pause after a full burst, and the backoff base after an HTTP 429
    pub cooldown: Duration,
}

/// A historical daily price provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn pacing(&self) -> PacingPolicy;

    /// Daily USD spot price for `coin_id` on `date`.
    ///
    /// The id lives in the provider's own namespace (CoinGecko coin id,
    /// Coinhall pair-contract address).
    async fn fetch_price(&self, coin_id: &str, date: NaiveDate) -> Result<PriceFetch, SourceError>;
}

/// Terminal outcome of resolving one (symbol, date) pair
#[derive(Debug, Clone, PartialEq)]
pub enum PriceResult {
    Resolved { price: f64, source: SourceKind },
    NoCoverage,
    TransientError(String),
}

impl PriceResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}
