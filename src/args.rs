use clap::{Parser, ValueHint};
use std::path::PathBuf;

pub const DEFAULT_SYMBOL_COLUMN: &str = "boughtCurrency";
pub const DEFAULT_QUANTITY_COLUMN: &str = "boughtQuantity";
pub const DEFAULT_DATE_COLUMN: &str = "timeExecuted";
pub const DEFAULT_YEAR: i32 = 2022;

/// Compute the USD cost basis for staking and airdrop rewards in a
/// portfolio ledger export.
///
/// Prices come from CoinGecko, with Coinhall as fallback for Terra tokens
/// CoinGecko does not cover. Rows that cannot be priced are listed at the
/// end of the run instead of aborting it.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Ledger export to read (CSV)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub input_file: PathBuf,

    /// Where to write the valued rows (CSV)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output_file: PathBuf,

    /// Overwrite the output file if it already exists
    #[arg(long)]
    pub overwrite: bool,

    /// JSON file mapping ledger symbols to CoinGecko coin ids
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub coingecko_ids: PathBuf,

    /// JSON file mapping ledger symbols to Coinhall pair-contract addresses
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub coinhall_ids: PathBuf,

    /// Column holding the reward symbol
    #[arg(long, default_value = DEFAULT_SYMBOL_COLUMN)]
    pub symbol_column: String,

    /// Column holding the reward quantity
    #[arg(long, default_value = DEFAULT_QUANTITY_COLUMN)]
    pub quantity_column: String,

    /// Column holding the transaction date
    #[arg(long, default_value = DEFAULT_DATE_COLUMN)]
    pub date_column: String,

    /// Year whose rewards should be valued (repeatable)
    #[arg(long = "year", default_values_t = [DEFAULT_YEAR])]
    pub years: Vec<i32>,

    /// Classification tag to value (repeatable)
    #[arg(
        long = "classification",
        default_values_t = crate::models::DEFAULT_CLASSIFICATIONS.iter().map(|s| s.to_string())
    )]
    pub classifications: Vec<String>,

    /// Also write a condensed report (date, symbol, quantity, usdValue)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub summary_file: Option<PathBuf>,
}
