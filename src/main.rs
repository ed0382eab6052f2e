//! Command line entry point for reflect-gains
//!
//! Looks up a wallet's history in a token, prices every transfer and prints
//! the cost basis, reflection gains and market cap projections.

use anyhow::{Context, Result};
use clap::Parser;
use reflect_gains::gains::format::format_token_amount;
use reflect_gains::gains::{
    AnalysisReport, BalanceMode, Collaborators, FixedPoint, GainsAnalyzer, GainsConfig, GainsError,
    HttpDataSources, SqlitePriceCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Cost basis and reflection gains for BSC tokens", long_about = None)]
struct Cli {
    /// Token contract address or a known alias such as `pye`
    contract: String,

    /// Wallet address to analyze
    wallet: String,

    /// Rank of the top coin to project the balance onto
    #[arg(short, long)]
    rank: Option<usize>,

    /// Price cache database file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Read the balance from the indexer instead of the chain
    #[arg(long)]
    indexed_balance: bool,

    /// Transactions priced concurrently
    #[arg(long)]
    parallel: Option<usize>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = GainsConfig::from_env();
    if let Some(rank) = cli.rank {
        config = config.with_comparison_rank(rank);
    }
    if let Some(path) = cli.cache {
        config = config.with_cache_db_path(path);
    }
    if let Some(parallel) = cli.parallel {
        config = config.with_max_parallel_resolutions(parallel);
    }
    if cli.indexed_balance {
        config = config.with_balance_mode(BalanceMode::Indexed);
    }

    let cache = Arc::new(SqlitePriceCache::open(&config.cache_db_path).await?);
    let sources = Arc::new(HttpDataSources::new(config.clone()).context("Failed to set up data sources")?);
    let analyzer = GainsAnalyzer::new(config, Collaborators::from_http(sources), cache.clone());

    info!("Analyzing {} for {}", cli.contract, cli.wallet);
    let outcome = analyzer.analyze(&cli.contract, &cli.wallet).await;
    cache.close().await;

    match outcome {
        Ok(report) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(report) => print_report(&report),
        Err(GainsError::NoTransactionsFound) => {
            warn!("No transactions found for {} in {}", cli.wallet, cli.contract);
            println!("No transactions found");
        }
        Err(e) if e.is_retryable() => {
            error!("{}", e);
            println!("Error: {}. Try again in a moment.", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let suffix = report.display_suffix;
    let symbol = &report.token.symbol;
    let basis = &report.cost_basis;
    let amount = |a: &FixedPoint| format_token_amount(a, suffix);

    println!(
        "{} ({})",
        report.token.name.as_deref().unwrap_or(symbol),
        report.contract
    );
    println!(
        "Price ${}  Market cap ${}",
        report.token.current_price_usd,
        report.market_cap_usd.to_currency_string()
    );
    println!();
    println!("Balance        {} {}  (${})", amount(&report.live_balance), symbol, report.balance_usd.to_currency_string());
    println!("Net bought     {} {}", amount(&basis.net_balance), symbol);
    println!("Reflections    {} {}  (${})", amount(&report.gains), symbol, report.gains_usd.to_currency_string());
    println!("Total bought   {} {}", amount(&basis.total_bought), symbol);
    println!("Total sold     {} {}", amount(&basis.total_sold), symbol);
    if let Some(share) = &report.supply_share {
        println!("Supply share   {}‱", share);
    }
    println!();
    println!(
        "{} transactions, net spend ${}",
        basis.transaction_count,
        basis.total_spent_usd.to_currency_string()
    );
    match (&basis.average_cost_basis_per_token, &basis.tokens_per_usd) {
        (Some(cost), Some(per_usd)) => println!(
            "Average cost basis ${} per {} ({} {} per USD)",
            cost.to_currency_string(),
            symbol,
            amount(per_usd),
            symbol
        ),
        (Some(cost), None) => println!("Average cost basis ${} per {}", cost.to_currency_string(), symbol),
        _ => println!("Average cost basis undefined (net balance is zero)"),
    }
    if let Some(percent) = &report.earnings_percent {
        println!("Simple earnings {}%", percent.to_currency_string());
    }
    if report.unresolved_prices > 0 {
        println!("{} transactions could not be priced and count as $0", report.unresolved_prices);
    }

    if let Some(projection) = &report.comparison {
        println!();
        println!(
            "At the market cap of #{} {} (${}), your balance would be worth ${}",
            projection.rank,
            projection.coin.name.as_deref().unwrap_or(&projection.coin.code),
            projection.market_cap_usd.to_currency_string(),
            projection.projected_usd.to_currency_string()
        );
    }

    println!();
    println!("{:<68} {:>20} {:>16}", "Transaction", symbol, "USD");
    for txn in &report.transactions {
        let signed = if txn.is_inflow(&report.wallet) { "" } else { "-" };
        println!(
            "{:<68} {:>20} {:>16}",
            txn.hash,
            format!("{}{}", signed, amount(&txn.token_amount)),
            format!(
                "${}",
                txn.usd_value
                    .as_ref()
                    .map(|v| v.to_currency_string())
                    .unwrap_or_else(|| "0.00".to_string())
            )
        );
    }
}
