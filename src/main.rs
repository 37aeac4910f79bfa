//! Options Protocol Keeper
//!
//! Keeps the options protocol's market makers in shape on Polygon.
//! Features:
//! - Hedge rebalancing through the lending pool and the 1inch aggregator
//! - Option expiry polling across exchanges
//! - Option trading around spot on the configured underlyings
//! - Capital and hedge balance reports
//! - ABI artifact verification against the contract build
//!
//! Reports go to stdout; logs and the banner go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keeper_api::OneInchClient;
use keeper_chain::{ArtifactStore, ChainReader, TransactionSenderBuilder, TxSubmitter};
use keeper_core::{
    keeper_private_key, CallRunner, CapitalReporter, ExpiryKeeper, HedgeRebalancer, KeeperConfig,
    OptionTrader,
};

#[derive(Parser)]
#[command(name = "keeper", author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (overrides --profile)
    #[arg(long, env = "KEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Built-in profile: polygon or mumbai
    #[arg(long)]
    profile: Option<String>,

    /// Build and log transactions without sending them
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebalance market maker hedges
    Hedge {
        /// Keep running on the configured interval
        #[arg(long)]
        watch: bool,
        /// Adjust loans only
        #[arg(long)]
        skip_swap: bool,
    },
    /// Expire options on every configured exchange
    Expire {
        #[arg(long)]
        watch: bool,
    },
    /// Buy a call and a put around spot on each configured underlying
    Trade {
        #[arg(long)]
        watch: bool,
    },
    /// Print market maker capital and hedge balances
    Capital {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check the contract build's ABI files
    VerifyAbi,
}

impl Cli {
    /// The banner stays out of machine-readable output.
    fn shows_banner(&self) -> bool {
        !matches!(self.command, Command::Capital { json: true })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.shows_banner() {
        print_banner();
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let mut config = KeeperConfig::load(cli.config.as_deref(), cli.profile.as_deref())?;
    config.dry_run |= cli.dry_run;
    config.log_config();

    match cli.command {
        Command::VerifyAbi => verify_abi(&config),
        Command::Capital { json } => capital(&config, json).await,
        Command::Hedge { watch, skip_swap } => {
            if config.abi.verify_on_start {
                verify_abi(&config)?;
            }
            config.hedge.skip_swap |= skip_swap;
            hedge(&config, watch).await
        }
        Command::Expire { watch } => {
            if config.abi.verify_on_start {
                verify_abi(&config)?;
            }
            expire(&config, watch).await
        }
        Command::Trade { watch } => {
            if config.abi.verify_on_start {
                verify_abi(&config)?;
            }
            trade(&config, watch).await
        }
    }
}

/// Text logs by default, JSON with `LOG_FORMAT=json`. Both go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keeper_core=debug,keeper_chain=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn verify_abi(config: &KeeperConfig) -> Result<()> {
    let store = ArtifactStore::new(&config.abi.dir);
    let artifacts = store
        .verify_all()
        .with_context(|| format!("ABI verification failed (searched {:?})", store.search_dirs()))?;
    for artifact in &artifacts {
        info!(contract = %artifact.name, "ABI ok");
    }
    Ok(())
}

/// Reader for protocol state, checked against the configured chain.
async fn connect(config: &KeeperConfig) -> Result<Arc<ChainReader>> {
    let reader = ChainReader::new(&config.chain.rpc_url).await?;
    reader.health_check(config.chain.chain_id).await?;
    Ok(Arc::new(reader))
}

/// Signer-backed runner for the keeper account.
async fn call_runner(config: &KeeperConfig) -> Result<CallRunner> {
    let gas = &config.gas;
    let sender = TransactionSenderBuilder::new(&config.chain.rpc_url, config.chain.chain_id)
        .gas_from_config(
            gas.pricing.as_str(),
            gas.default_gas_price_gwei,
            gas.max_gas_price_gwei,
            gas.priority_fee_gwei,
        )
        .default_gas_limit(gas.default_gas_limit)
        .confirmation_timeout(config.hedge.confirmation_timeout())
        .build(&keeper_private_key()?)
        .await?;

    match sender.get_balance().await {
        Ok(balance) => info!(keeper = %sender.address(), balance_wei = %balance, "Keeper account"),
        Err(e) => warn!(error = %e, "Failed to read keeper balance"),
    }
    if config.dry_run {
        warn!("Dry run: transactions are logged, not sent");
    }

    Ok(CallRunner::new(Arc::new(sender), config.dry_run))
}

async fn hedge(config: &KeeperConfig, watch: bool) -> Result<()> {
    let reader = connect(config).await?;
    let aggregator = OneInchClient::new(config.chain.chain_id)
        .with_base_url(config.aggregator.base_url.as_str())
        .with_api_key(config.aggregator.api_key.clone());
    let rebalancer = HedgeRebalancer::new(
        reader,
        Arc::new(aggregator),
        call_runner(config).await?,
        config.gas.clone(),
    )
    .with_skip_swap(config.hedge.skip_swap);

    let markets = &config.contracts.markets;
    if markets.is_empty() {
        warn!("No markets configured, nothing to hedge");
        return Ok(());
    }

    let rebalancer = &rebalancer;
    run_periodically(watch, config.hedge.poll_interval(), move || async move {
        let reports = rebalancer.rebalance_all(markets).await;
        for report in &reports {
            for call in report.calls() {
                if let Some(url) = call
                    .tx_hash
                    .and_then(|hash| config.chain.tx_url(&hash.to_string()))
                {
                    info!(market = %report.market, call = %call.kind, url = %url, "Transaction");
                }
            }
        }
        let failed = reports.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            anyhow::bail!("{} of {} markets failed to rebalance", failed, reports.len());
        }
        Ok(())
    })
    .await
}

async fn expire(config: &KeeperConfig, watch: bool) -> Result<()> {
    let reader = connect(config).await?;
    let keeper = ExpiryKeeper::new(reader, call_runner(config).await?, config.gas.clone())
        .with_max_concurrent_reads(config.expiry.max_concurrent_reads);

    let exchanges = &config.contracts.exchanges;
    if exchanges.is_empty() {
        warn!("No exchanges configured, nothing to expire");
        return Ok(());
    }

    let keeper = &keeper;
    run_periodically(watch, config.expiry.poll_interval(), move || async move {
        let report = keeper.run_once(exchanges).await;
        if report.failed() > 0 {
            anyhow::bail!("{} of {} exchanges failed", report.failed(), exchanges.len());
        }
        Ok(())
    })
    .await
}

async fn trade(config: &KeeperConfig, watch: bool) -> Result<()> {
    if !config.trade.is_configured() {
        warn!("Option trading needs trade.registry, trade.exchange and trade.underlyings");
        return Ok(());
    }

    let reader = connect(config).await?;
    let trader = OptionTrader::new(
        reader,
        call_runner(config).await?,
        config.gas.clone(),
        &config.trade,
    )?;

    let trader = &trader;
    run_periodically(watch, config.trade.poll_interval(), move || async move {
        let report = trader.run_once().await;
        for call in report.calls() {
            if let Some(url) = call
                .tx_hash
                .and_then(|hash| config.chain.tx_url(&hash.to_string()))
            {
                info!(call = %call.kind, url = %url, "Transaction");
            }
        }
        if let Some(e) = &report.error {
            anyhow::bail!("Option trading stopped: {:#}", e);
        }
        if report.failed() > 0 {
            anyhow::bail!(
                "{} of {} underlyings failed to trade",
                report.failed(),
                report.underlyings.len()
            );
        }
        Ok(())
    })
    .await
}

async fn capital(config: &KeeperConfig, json: bool) -> Result<()> {
    let reporter = CapitalReporter::new(connect(config).await?);
    let reports = reporter.report_all(&config.contracts.markets).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        println!("market        {}", report.market);
        println!("gross capital {} ({:.4})", report.gross_capital, report.gross_capital_f64());
        println!("net equity    {} ({:.4})", report.net_equity, report.net_equity_f64());
        println!("underlying    {} {}", report.underlying.balance, report.underlying.symbol);
        println!("funding       {} {}", report.funding.balance, report.funding.symbol);
        println!();
    }
    if reports.len() < config.contracts.markets.len() {
        anyhow::bail!(
            "{} of {} capital reports failed",
            config.contracts.markets.len() - reports.len(),
            config.contracts.markets.len()
        );
    }
    Ok(())
}

/// Run `job` once, or on `interval` until Ctrl+C when watching.
///
/// In watch mode a failing run is logged and the next one still happens.
async fn run_periodically<F, Fut>(watch: bool, interval: Duration, mut job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    if !watch {
        return job().await;
    }

    info!(interval_secs = interval.as_secs(), "Watching");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = job().await {
                    error!(error = %e, "Run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

/// Print startup banner.
fn print_banner() {
    eprintln!(
        r#"
    ╔╦╗┌─┐┬─┐┌─┐┌┬┐  ╦╔═┌─┐┌─┐┌─┐┌─┐┬─┐
    ║║║│ │├┬┘├┤  │   ╠╩╗├┤ ├┤ ├─┘├┤ ├┬┘
    ╩ ╩└─┘┴└─└─┘ ┴   ╩ ╩└─┘└─┘┴  └─┘┴└─
    Options Protocol Keeper
    "#
    );
}
