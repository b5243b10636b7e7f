use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use traderbot::api::coinmarketcap::{BNB_ID, BTC_ID, COINMARKETCAP_TICKER_API};
use traderbot::api::{BinanceClient, CoinMarketCapClient, Exchange};
use traderbot::bot::{Bot, SummaryReporter};
use traderbot::config::TraderConfig;
use traderbot::metrics::{fetch_portfolio, InitialBalanceStore};
use traderbot::notify::{LogSink, SummarySink, WebhookSink};
use traderbot::trader::Trader;

#[derive(Parser)]
#[command(name = "traderbot")]
#[command(about = "Threshold trading bot for a single exchange pair", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (TOML); TRADERBOT__* environment variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading and summary loops until Ctrl+C (default)
    Run,

    /// Print the account portfolio valued in the quote currency
    Balances,

    /// Print exchange and CoinMarketCap prices for the tracked pairs
    Quote,

    /// Build a lifetime performance summary and log it
    Summary,
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = TraderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let binance = BinanceClient::from_config(&config).context("Failed to build exchange client")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let limits = binance
                .get_exchange_limits()
                .await
                .context("Failed to fetch exchange limits")?;
            run(config, Arc::new(binance.with_limits(&limits))).await
        }
        Commands::Balances => balances(&config, &binance).await,
        Commands::Quote => quote(&config, &binance).await,
        Commands::Summary => {
            let trader = Arc::new(Trader::new(config.trading_params()));
            let reporter = summary_reporter(&config, trader, Arc::new(binance))?;
            let summary = reporter.send().await.context("Failed to build summary")?;
            println!("{}\n{}", summary.subject(), summary.render());
            Ok(())
        }
    }
}

fn setup_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("traderbot={}", level).into()),
        )
        .init();
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: TraderConfig, exchange: Arc<dyn Exchange>) -> anyhow::Result<()> {
    tracing::info!("🚀 traderbot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Pair: {} (fee pair {})", config.trading_pair, config.fee_pair);
    tracing::info!("  Diff limit: {}%", config.diff_limit * 100.0);
    tracing::info!("  Spend per buy: {} {}", config.spend_amount, config.quote_asset);
    tracing::info!("  Submit orders: {}", config.submit_orders);

    let trader = Arc::new(Trader::new(config.trading_params()));
    let reporter = summary_reporter(&config, trader.clone(), exchange.clone())?;
    let summary_every = Duration::from_secs(config.summary_interval_hours.max(1) * 3600);
    let bot = Bot::new(trader, exchange, config);

    bot.initialize()
        .await
        .context("Couldn't load account balances")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let trading_task = {
        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        tokio::spawn(async move { bot.run(shutdown).await })
    };

    let summary_task = {
        let shutdown = wait_for_shutdown(shutdown_rx);
        tokio::spawn(async move { reporter.run(summary_every, shutdown).await })
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
    let _ = shutdown_tx.send(true);

    trading_task
        .await
        .context("Trading loop panicked")?
        .context("Failed to persist min balance")?;
    summary_task.await.context("Summary loop panicked")?;

    tracing::info!("👋 traderbot stopped");
    Ok(())
}

async fn balances(config: &TraderConfig, binance: &BinanceClient) -> anyhow::Result<()> {
    let portfolio = fetch_portfolio(binance, &config.quote_asset)
        .await
        .context("Failed to fetch portfolio")?;

    for asset in &portfolio.assets {
        println!(
            "{:<8} {:>18.8} {:>14.2} {}",
            asset.symbol, asset.quantity, asset.value, config.quote_asset
        );
    }
    println!("{:<8} {:>18} {:>14.2} {}", "TOTAL", "", portfolio.value, config.quote_asset);

    let open_orders = binance
        .get_open_orders(Some(&config.trading_pair))
        .await
        .context("Failed to fetch open orders")?;
    println!("\nOpen {} orders: {}", config.trading_pair, open_orders.len());
    for order in &open_orders {
        println!(
            "  #{} {} {} @ {} ({}/{} filled, {})",
            order.order_id, order.side, order.order_type, order.price, order.executed_qty, order.orig_qty, order.status
        );
    }
    Ok(())
}

async fn quote(config: &TraderConfig, binance: &BinanceClient) -> anyhow::Result<()> {
    for symbol in [&config.trading_pair, &config.fee_pair] {
        let stats = binance
            .get_24hr_stats(symbol)
            .await
            .with_context(|| format!("Failed to fetch {} ticker", symbol))?;
        println!(
            "{:<10} {:>18.8} ({:+.2}% 24h, avg {:.8})",
            stats.symbol, stats.last_price, stats.price_change_percent, stats.weighted_avg_price
        );
    }

    let cmc = CoinMarketCapClient::new(
        COINMARKETCAP_TICKER_API,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    for id in [BTC_ID, BNB_ID] {
        match cmc.get_ticker(id).await {
            Ok(ticker) => println!(
                "{:<10} {:>18.2} USD ({:+.2}% 24h)",
                ticker.symbol, ticker.price_usd, ticker.percent_change_24h
            ),
            Err(e) => tracing::warn!("CoinMarketCap ticker {} unavailable: {}", id, e),
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn summary_reporter(
    config: &TraderConfig,
    trader: Arc<Trader>,
    exchange: Arc<dyn Exchange>,
) -> anyhow::Result<SummaryReporter> {
    let mut reporter = SummaryReporter::new(
        trader,
        exchange,
        InitialBalanceStore::new(&config.metrics_dir),
        config.quote_asset.clone(),
    )
    .with_sink(Arc::new(LogSink));

    if let Some(url) = &config.webhook_url {
        let sink: Arc<dyn SummarySink> = Arc::new(
            WebhookSink::new(url.clone(), Duration::from_secs(10))
                .context("Failed to build webhook client")?,
        );
        reporter = reporter.with_sink(sink);
    }
    Ok(reporter)
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        let stopping = *rx.borrow_and_update();
        if stopping || rx.changed().await.is_err() {
            break;
        }
    }
}
