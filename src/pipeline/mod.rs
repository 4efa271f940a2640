//! Valuation pipeline
//!
//! Walks the ledger rows in input order, prices the ones matching the
//! configured metric and attaches `usdValue = price * quantity`. Rows
//! outside the metric, and rows no source can price, pass through with the
//! value left unset. Per-row failures never abort the batch.

use crate::models::{Metric, OutputRecord, TransactionRecord};
use crate::resolver::{PriceResolver, UnresolvedReport};
use crate::sources::PriceResult;

pub struct ValuationPipeline {
    resolver: PriceResolver,
    metric: Metric,
}

impl ValuationPipeline {
    pub fn new(resolver: PriceResolver, metric: Metric) -> Self {
        Self { resolver, metric }
    }

    /// Value every matching record, preserving input order and all fields.
    pub async fn run(
        mut self,
        records: impl IntoIterator<Item = TransactionRecord>,
    ) -> (Vec<OutputRecord>, UnresolvedReport) {
        let mut output = Vec::new();
        let mut matched = 0usize;
        let mut valued = 0usize;

        for record in records {
            let mut usd_value = None;

            if self.metric.matches(&record) {
                if let Some(date) = record.date {
                    matched += 1;
                    if let PriceResult::Resolved { price, source } =
                        self.resolver.resolve(&record.symbol, date).await
                    {
                        match record.quantity {
                            Some(quantity) => {
                                valued += 1;
                                usd_value = Some(price * quantity);
                                log::debug!(
                                    "{} x {} on {} = {} USD (via {})",
                                    quantity,
                                    record.symbol,
                                    date,
                                    price * quantity,
                                    source.as_str()
                                );
                            }
                            None => log::warn!(
                                "Row for {} on {} matched the metric but has no quantity",
                                record.symbol,
                                date
                            ),
                        }
                    }
                }
            }

            output.push(OutputRecord { record, usd_value });
        }

        log::info!(
            "Valued {}/{} matching rows ({} price lookups cached, {} cache hits)",
            valued,
            matched,
            self.resolver.cache().len(),
            self.resolver.cache().hits()
        );

        (output, self.resolver.into_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SymbolConfig, SymbolRegistry};
    use crate::resolver::UnresolvedReason;
    use crate::sources::{PacingPolicy, PriceFetch, PriceSource, SourceError, SourceKind};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Source with a fixed price table keyed by coin id
    struct TableSource {
        kind: SourceKind,
        prices: HashMap<String, f64>,
    }

    impl TableSource {
        fn new(kind: SourceKind, prices: &[(&str, f64)]) -> Self {
            Self {
                kind,
                prices: prices
                    .iter()
                    .map(|(id, price)| (id.to_string(), *price))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PriceSource for TableSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn pacing(&self) -> PacingPolicy {
            PacingPolicy {
                per_request: Duration::ZERO,
                burst: None,
                cooldown: Duration::ZERO,
            }
        }

        async fn fetch_price(
            &self,
            coin_id: &str,
            _date: NaiveDate,
        ) -> Result<PriceFetch, SourceError> {
            match self.prices.get(coin_id) {
                Some(price) => Ok(PriceFetch::Price(*price)),
                None => Ok(PriceFetch::NoData),
            }
        }
    }

    fn registry() -> SymbolRegistry {
        let entry = |id: &str| SymbolConfig {
            id: id.to_string(),
            symbol: None,
            name: None,
        };
        let primary = HashMap::from([
            ("DAI".to_string(), entry("dai")),
            ("MINE".to_string(), entry("pylon-mine")),
        ]);
        let secondary = HashMap::from([(
            "MINE".to_string(),
            entry("terra178jydtjvj4gw8earkgnqc80c3hrmqj4kw2welz"),
        )]);
        SymbolRegistry::new(primary, secondary)
    }

    fn pipeline() -> ValuationPipeline {
        // DAI priced by the primary source only; MINE only by the fallback
        let primary = TableSource::new(SourceKind::CoinGecko, &[("dai", 1.0)]);
        let secondary = TableSource::new(
            SourceKind::Coinhall,
            &[("terra178jydtjvj4gw8earkgnqc80c3hrmqj4kw2welz", 0.05)],
        );
        let resolver = PriceResolver::new(registry(), Box::new(primary), Box::new(secondary));
        let metric = Metric::new(
            ["staked".to_string(), "airdrop".to_string()],
            [2021],
        );
        ValuationPipeline::new(resolver, metric)
    }

    fn row(symbol: &str, classification: &str, quantity: f64, date: &str) -> TransactionRecord {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
        TransactionRecord {
            symbol: symbol.to_string(),
            date,
            quantity: Some(quantity),
            classification: Some(classification.to_string()),
            fields: vec![
                symbol.to_string(),
                quantity.to_string(),
                classification.to_string(),
            ],
        }
    }

    fn assert_close(value: f64, expected: f64) {
        assert!(
            (value - expected).abs() < 1e-9,
            "expected {} to be close to {}",
            value,
            expected
        );
    }

    #[tokio::test]
    async fn test_staked_dai_is_valued() {
        let (output, report) = pipeline()
            .run(vec![row("DAI", "staked", 100.0, "2021-06-01")])
            .await;

        assert_eq!(output.len(), 1);
        assert_close(output[0].usd_value.unwrap(), 100.0);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_terra_only_symbol_uses_fallback() {
        let (output, report) = pipeline()
            .run(vec![row("MINE", "airdrop", 1000.0, "2021-11-01")])
            .await;

        assert_close(output[0].usd_value.unwrap(), 50.0);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_symbol_is_reported() {
        let (output, report) = pipeline()
            .run(vec![row("FOO", "staked", 5.0, "2021-06-01")])
            .await;

        assert_eq!(output[0].usd_value, None);
        assert_eq!(report.len(), 1);
        assert_eq!(report.rows()[0].symbol, "FOO");
        assert_eq!(report.rows()[0].reason, UnresolvedReason::MissingConfig);
    }

    #[tokio::test]
    async fn test_non_matching_rows_pass_through_unchanged() {
        let deposit = row("DAI", "deposit", 100.0, "2021-06-01");
        let wrong_year = row("DAI", "staked", 100.0, "2020-06-01");
        let expected_fields = deposit.fields.clone();

        let (output, report) = pipeline().run(vec![deposit, wrong_year]).await;

        assert_eq!(output[0].usd_value, None);
        assert_eq!(output[1].usd_value, None);
        assert_eq!(output[0].record.fields, expected_fields);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_output_preserves_input_order() {
        let rows = vec![
            row("DAI", "staked", 1.0, "2021-06-01"),
            row("FOO", "staked", 1.0, "2021-06-01"),
            row("MINE", "airdrop", 2.0, "2021-06-02"),
            row("DAI", "deposit", 9.0, "2021-06-03"),
        ];

        let (output, _) = pipeline().run(rows).await;

        let symbols: Vec<&str> = output
            .iter()
            .map(|o| o.record.symbol.as_str())
            .collect();
        assert_eq!(symbols, ["DAI", "FOO", "MINE", "DAI"]);
    }

    #[tokio::test]
    async fn test_signed_quantities_are_respected() {
        let mut refund = row("DAI", "staked", -25.0, "2021-06-01");
        refund.quantity = Some(-25.0);

        let (output, _) = pipeline().run(vec![refund]).await;
        assert_close(output[0].usd_value.unwrap(), -25.0);
    }
}
