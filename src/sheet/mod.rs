//! CSV ledger input/output
//!
//! The ledger export is treated as a plain table: every column is carried
//! through to the output verbatim, with one `usdValue` column appended.
//! Column names are configurable because different export versions label
//! them differently.

use crate::models::{Metric, OutputRecord, TransactionRecord};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::path::Path;

pub const USD_VALUE_HEADER: &str = "usdValue";
const CLASSIFICATION_HEADER: &str = "classification";

/// Which input columns hold the typed fields
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub symbol: String,
    pub quantity: String,
    pub date: String,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            symbol: "boughtCurrency".to_string(),
            quantity: "boughtQuantity".to_string(),
            date: "timeExecuted".to_string(),
        }
    }
}

/// Read the ledger export, returning its headers and all rows in file order.
pub fn read_records(
    path: &Path,
    columns: &ColumnSpec,
) -> Result<(Vec<String>, Vec<TransactionRecord>)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open input file {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .context("cannot read input headers")?
        .iter()
        .map(str::to_string)
        .collect();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let symbol_idx = position(&columns.symbol)
        .ok_or_else(|| anyhow!("input file has no '{}' column", columns.symbol))?;
    let quantity_idx = position(&columns.quantity)
        .ok_or_else(|| anyhow!("input file has no '{}' column", columns.quantity))?;
    let date_idx = position(&columns.date)
        .ok_or_else(|| anyhow!("input file has no '{}' column", columns.date))?;
    // Optional: rows without a classification simply never match the metric
    let classification_idx = position(CLASSIFICATION_HEADER);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.context("cannot read input row")?;
        let fields: Vec<String> = row.iter().map(str::to_string).collect();

        let cell = |idx: usize| fields.get(idx).map(|s| s.trim()).unwrap_or_default();
        let symbol = cell(symbol_idx).to_string();
        let date = parse_date(cell(date_idx));
        let quantity = cell(quantity_idx).parse::<f64>().ok();
        let classification = classification_idx
            .map(|idx| cell(idx).to_string())
            .filter(|s| !s.is_empty());

        records.push(TransactionRecord {
            symbol,
            date,
            quantity,
            classification,
            fields,
        });
    }

    Ok((headers, records))
}

/// Accepts date-only and datetime cells; the time part is dropped.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%d.%m.%Y %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d.%m.%Y"))
        .ok()
}

/// Write all rows with the original columns plus `usdValue` (empty when
/// unresolved).
pub fn write_records(path: &Path, headers: &[String], records: &[OutputRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;

    let mut output_headers = headers.to_vec();
    output_headers.push(USD_VALUE_HEADER.to_string());
    writer.write_record(&output_headers)?;

    for record in records {
        let mut row = record.record.fields.clone();
        // Short rows can happen in hand-edited exports; pad to the header width
        row.resize(headers.len(), String::new());
        row.push(record.usd_value.map(format_usd).unwrap_or_default());
        writer.write_record(&row)?;
    }

    writer.flush().context("cannot flush output file")?;
    Ok(())
}

/// Write the condensed companion file: date, symbol, quantity, usdValue and
/// a comment column flagging matched rows that could not be priced, plus a
/// final total row.
pub fn write_summary(
    path: &Path,
    columns: &ColumnSpec,
    metric: &Metric,
    records: &[OutputRecord],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create summary file {}", path.display()))?;

    writer.write_record([
        columns.date.as_str(),
        columns.symbol.as_str(),
        columns.quantity.as_str(),
        USD_VALUE_HEADER,
        "comment",
    ])?;

    let mut total = 0.0;
    for output in records.iter().filter(|o| metric.matches(&o.record)) {
        let record = &output.record;
        let (usd, comment) = match output.usd_value {
            Some(value) => {
                total += value;
                (format_usd(value), "")
            }
            None => (String::new(), "Not covered, fixme"),
        };
        writer.write_record([
            record.date.map(|d| d.to_string()).unwrap_or_default(),
            record.symbol.clone(),
            record.quantity.map(format_usd).unwrap_or_default(),
            usd,
            comment.to_string(),
        ])?;
    }

    let total = format_usd(total);
    writer.write_record(["", "", "", total.as_str(), "total"])?;
    writer.flush().context("cannot flush summary file")?;
    Ok(())
}

/// Fixed 8-decimal precision (sub-cent reward prices are common), trailing
/// zeros trimmed.
fn format_usd(value: f64) -> String {
    let fixed = format!("{:.8}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_CLASSIFICATIONS;
    use std::fs;

    const SAMPLE: &str = "\
timeExecuted,transactionType,boughtQuantity,boughtCurrency,classification
2021-06-01 00:00:00,deposit,100,DAI,staked
2021-11-01 14:30:00,deposit,1000,MINE,airdrop
2021-03-05 09:00:00,withdraw,12.5,ADA,
";

    fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("input.csv");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_read_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let (headers, records) = read_records(&path, &ColumnSpec::default()).unwrap();

        assert_eq!(headers.len(), 5);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].symbol, "DAI");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2021, 6, 1));
        assert_eq!(records[0].quantity, Some(100.0));
        assert_eq!(records[0].classification.as_deref(), Some("staked"));
        // blank classification comes back as None
        assert_eq!(records[2].classification, None);
        // every raw cell is preserved
        assert_eq!(records[1].fields[1], "deposit");
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let columns = ColumnSpec {
            symbol: "nonexistent".to_string(),
            ..ColumnSpec::default()
        };
        let result = read_records(&path, &columns);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2021, 6, 1);
        assert_eq!(parse_date("2021-06-01"), expected);
        assert_eq!(parse_date("2021-06-01 13:45:00"), expected);
        assert_eq!(parse_date("2021-06-01T13:45:00"), expected);
        assert_eq!(parse_date("01.06.2021"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_write_records_appends_usd_value_column() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(&dir);
        let output = dir.path().join("output.csv");

        let (headers, records) = read_records(&input, &ColumnSpec::default()).unwrap();
        let outputs: Vec<OutputRecord> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| OutputRecord {
                record,
                usd_value: (i == 0).then_some(100.0),
            })
            .collect();

        write_records(&output, &headers, &outputs).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        let mut lines = written.lines();
        assert!(lines.next().unwrap().ends_with(",usdValue"));
        assert!(lines.next().unwrap().ends_with(",100"));
        // unresolved rows keep the cell empty
        assert!(lines.next().unwrap().ends_with(","));
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample(&dir);
        let summary = dir.path().join("summary.csv");

        let (_, records) = read_records(&input, &ColumnSpec::default()).unwrap();
        let outputs: Vec<OutputRecord> = records
            .into_iter()
            .map(|record| {
                let usd_value = (record.symbol == "DAI").then_some(100.0);
                OutputRecord { record, usd_value }
            })
            .collect();

        let metric = Metric::new(
            DEFAULT_CLASSIFICATIONS.iter().map(|s| s.to_string()),
            [2021],
        );
        write_summary(&summary, &ColumnSpec::default(), &metric, &outputs).unwrap();

        let written = fs::read_to_string(&summary).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        // header + DAI + MINE + total (the ADA row has no classification)
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("DAI"));
        assert!(lines[2].contains("Not covered, fixme"));
        assert!(lines[3].ends_with("100,total"));
    }

    #[test]
    fn test_format_usd_trims_trailing_zeros() {
        assert_eq!(format_usd(100.0), "100");
        assert_eq!(format_usd(0.05), "0.05");
        assert_eq!(format_usd(50.000000000000004), "50");
        assert_eq!(format_usd(1.001), "1.001");
    }
}
