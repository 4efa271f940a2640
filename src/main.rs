use anyhow::{bail, Result};
use clap::Parser;
use staking_rewards::args::Cli;
use staking_rewards::models::Metric;
use staking_rewards::pipeline::ValuationPipeline;
use staking_rewards::registry::SymbolRegistry;
use staking_rewards::resolver::PriceResolver;
use staking_rewards::sheet::{self, ColumnSpec};
use staking_rewards::sources::coingecko::CoinGecko;
use staking_rewards::sources::coinhall::Coinhall;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.output_file.exists() && !cli.overwrite {
        bail!(
            "output file {} already exists, pass --overwrite to replace it",
            cli.output_file.display()
        );
    }

    let registry = SymbolRegistry::load(&cli.coingecko_ids, &cli.coinhall_ids)?;

    let columns = ColumnSpec {
        symbol: cli.symbol_column.clone(),
        quantity: cli.quantity_column.clone(),
        date: cli.date_column.clone(),
    };
    let (headers, records) = sheet::read_records(&cli.input_file, &columns)?;
    println!(
        "Loaded {} rows from {}",
        records.len(),
        cli.input_file.display()
    );

    let metric = Metric::new(cli.classifications.clone(), cli.years.clone());
    let resolver = PriceResolver::new(
        registry,
        Box::new(CoinGecko::new()?),
        Box::new(Coinhall::new()?),
    );

    println!("Resolving prices, this may take a while under API rate limits...");
    let (output, report) = ValuationPipeline::new(resolver, metric.clone())
        .run(records)
        .await;

    sheet::write_records(&cli.output_file, &headers, &output)?;
    println!(
        "Wrote {} rows to {}",
        output.len(),
        cli.output_file.display()
    );

    if let Some(summary_file) = &cli.summary_file {
        sheet::write_summary(summary_file, &columns, &metric, &output)?;
        println!("Wrote summary to {}", summary_file.display());
    }

    if report.is_empty() {
        println!("All matching rows were priced.");
    } else {
        println!(
            "{} rows could not be priced, fix them up manually:",
            report.len()
        );
        for row in report.rows() {
            println!(
                "\tSymbol: {}\t\tDate: {}\t\tReason: {}",
                row.symbol, row.date, row.reason
            );
        }
    }

    Ok(())
}
