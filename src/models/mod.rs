use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

/// Reward classifications valued by default
pub const DEFAULT_CLASSIFICATIONS: &[&str] = &["staked", "airdrop"];

/// One row from the ledger export
///
/// The typed fields are parsed from the configured columns; `fields` keeps
/// every column value verbatim for the output. Cells that fail to parse
/// become `None` and simply never match the valuation metric.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub symbol: String,
    pub date: Option<NaiveDate>,
    pub quantity: Option<f64>,
    pub classification: Option<String>,
    pub fields: Vec<String>,
}

/// A transaction plus its USD valuation, when one could be resolved
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub record: TransactionRecord,
    pub usd_value: Option<f64>,
}

/// Selects which rows are in scope for valuation
#[derive(Debug, Clone)]
pub struct Metric {
    classifications: HashSet<String>,
    years: HashSet<i32>,
}

impl Metric {
    pub fn new(
        classifications: impl IntoIterator<Item = String>,
        years: impl IntoIterator<Item = i32>,
    ) -> Self {
        Self {
            classifications: classifications.into_iter().collect(),
            years: years.into_iter().collect(),
        }
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        let Some(classification) = record.classification.as_deref() else {
            return false;
        };
        let Some(date) = record.date else {
            return false;
        };
        !record.symbol.is_empty()
            && self.classifications.contains(classification)
            && self.years.contains(&date.year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, classification: &str, year: i32) -> TransactionRecord {
        TransactionRecord {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(year, 6, 1),
            quantity: Some(1.0),
            classification: Some(classification.to_string()),
            fields: vec![],
        }
    }

    fn metric() -> Metric {
        Metric::new(
            DEFAULT_CLASSIFICATIONS.iter().map(|s| s.to_string()),
            [2021],
        )
    }

    #[test]
    fn test_matching_row() {
        assert!(metric().matches(&record("DAI", "staked", 2021)));
        assert!(metric().matches(&record("MINE", "airdrop", 2021)));
    }

    #[test]
    fn test_wrong_classification_or_year() {
        assert!(!metric().matches(&record("DAI", "deposit", 2021)));
        assert!(!metric().matches(&record("DAI", "staked", 2022)));
    }

    #[test]
    fn test_incomplete_rows_never_match() {
        let mut row = record("", "staked", 2021);
        assert!(!metric().matches(&row));
        row.symbol = "DAI".to_string();
        row.date = None;
        assert!(!metric().matches(&row));
        row.date = NaiveDate::from_ymd_opt(2021, 6, 1);
        row.classification = None;
        assert!(!metric().matches(&row));
    }
}
