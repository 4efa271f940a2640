//! Coinhall Price Source
//!
//! Fallback provider for Terra-ecosystem tokens that CoinGecko does not
//! list. Prices come from the Coinhall candles endpoint, keyed by the
//! Terra pair-contract address and quoted against UST (`uusd`). One daily
//! candle is requested and its high is used as the spot price for the day.
//!
//! Coinhall throttles after every single request, hence the 10 s pacing.

use super::{PacingPolicy, PriceFetch, PriceSource, SourceError, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.coinhall.org/api/v1";

const PER_REQUEST_DELAY: Duration = Duration::from_secs(10);

/// One OHLC bar from the candles endpoint
#[derive(Debug, Deserialize)]
struct Candle {
    #[allow(dead_code)]
    #[serde(default)]
    open: f64,
    high: f64,
    #[allow(dead_code)]
    #[serde(default)]
    low: f64,
    #[allow(dead_code)]
    #[serde(default)]
    close: f64,
}

pub struct Coinhall {
    client: Client,
    base_url: String,
}

impl Coinhall {
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Override the API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn candles_url(&self, pair_address: &str, date: NaiveDate) -> String {
        let (from, to) = day_range(date);
        format!(
            "{}/charts/terra/candles?bars=1&from={}&to={}&quoteAsset=uusd&interval=1d&pairAddress={}",
            self.base_url, from, to, pair_address
        )
    }
}

/// Unix timestamp range covering `date` (UTC)
fn day_range(date: NaiveDate) -> (i64, i64) {
    let start = date.and_hms_opt(0, 0, 0).expect("valid time").and_utc();
    let end = date.and_hms_opt(23, 59, 59).expect("valid time").and_utc();
    (start.timestamp(), end.timestamp())
}

#[async_trait]
impl PriceSource for Coinhall {
    fn kind(&self) -> SourceKind {
        SourceKind::Coinhall
    }

    fn pacing(&self) -> PacingPolicy {
        PacingPolicy {
            per_request: PER_REQUEST_DELAY,
            burst: None,
            cooldown: PER_REQUEST_DELAY,
        }
    }

    async fn fetch_price(
        &self,
        pair_address: &str,
        date: NaiveDate,
    ) -> Result<PriceFetch, SourceError> {
        let url = self.candles_url(pair_address, date);
        log::debug!("Fetching Coinhall candle for {} from {}", pair_address, url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!(
                "Coinhall API error for {}: {} - {}",
                pair_address,
                status,
                body
            );
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let candles: Vec<Candle> = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        match candles.first() {
            // No trades on that day means no coverage, not an error
            None => Ok(PriceFetch::NoData),
            Some(candle) => Ok(PriceFetch::Price(candle.high)),
        }
    }
}
