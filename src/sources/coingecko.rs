//! CoinGecko Price Source
//!
//! Fetches the historical daily USD price of a coin from the CoinGecko
//! public API (`/coins/{id}/history`). The public tier allows roughly
//! 50 calls/minute, so the pacing policy inserts a short delay after every
//! request and a long cooldown after every ninth.
//!
//! API documentation: https://docs.coingecko.com/

use super::{PacingPolicy, PriceFetch, PriceSource, SourceError, SourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Requests allowed before the long cooldown (50/min limit with headroom)
const BURST_REQUESTS: u32 = 9;
const BURST_COOLDOWN: Duration = Duration::from_secs(61);
const PER_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// CoinGecko `/coins/{id}/history` response
///
/// `market_data` is absent for ids that exist but carry no price for the
/// requested date; `current_price` can also lack the `usd` key.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    market_data: Option<MarketData>,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    #[serde(default)]
    current_price: HashMap<String, f64>,
}

impl HistoryResponse {
    fn usd_price(&self) -> Option<f64> {
        self.market_data
            .as_ref()
            .and_then(|m| m.current_price.get("usd"))
            .copied()
    }
}

pub struct CoinGecko {
    client: Client,
    base_url: String,
}

impl CoinGecko {
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

    fn history_url(&self, coin_id: &str, date: NaiveDate) -> String {
        format!(
            "{}/coins/{}/history?date={}&localization=false",
            self.base_url,
            coin_id,
            date.format("%d-%m-%Y")
        )
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    fn kind(&self) -> SourceKind {
        SourceKind::CoinGecko
    }

    fn pacing(&self) -> PacingPolicy {
        PacingPolicy {
            per_request: PER_REQUEST_DELAY,
            burst: Some(BURST_REQUESTS),
            cooldown: BURST_COOLDOWN,
        }
    }

    async fn fetch_price(&self, coin_id: &str, date: NaiveDate) -> Result<PriceFetch, SourceError> {
        let url = self.history_url(coin_id, date);
        log::debug!("Fetching CoinGecko history for {} from {}", coin_id, url);

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
        // Unknown coin id: no coverage rather than a request failure
        if status == StatusCode::NOT_FOUND {
            return Ok(PriceFetch::NoData);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("CoinGecko API error for {}: {} - {}", coin_id, status, body);
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data: HistoryResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        match data.usd_price() {
            Some(price) => Ok(PriceFetch::Price(price)),
            // Some listed coins store history without a USD quote for the day
            None => Ok(PriceFetch::NoData),
        }
    }
}
