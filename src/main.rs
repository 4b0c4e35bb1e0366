use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swingbot::api::{BitmexClient, BitmexPriceFeed, Credentials, PriceHistory};
use swingbot::db::open_ledger;
use swingbot::execution::{CycleDeps, TradingCycle};
use swingbot::notify::{LogNotifier, Notifier, TelegramNotifier};
use swingbot::settings::Settings;
use swingbot::strategy::StabilityGate;

#[derive(Parser)]
#[command(name = "swingbot")]
#[command(about = "Single-symbol swing trading bot for BitMEX", long_about = None)]
struct Cli {
    /// Settings file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run trading cycles until stopped (default)
    Run,
    /// Print one stability reading for the configured symbol and exit
    Stability,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    let client = BitmexClient::new(
        &settings.exchange.rest_url,
        Credentials::new(&settings.exchange.api_key, &settings.exchange.api_secret),
        settings.exchange.requests_per_minute,
    )?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(settings, client).await,
        Commands::Stability => print_stability(&settings, &client).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(settings: Settings, client: BitmexClient) -> anyhow::Result<()> {
    let params = settings.trading_params();

    tracing::info!("🚀 swingbot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {}", params.symbol);
    tracing::info!("  Stability: {}", params.stability);
    tracing::info!("  Profit margin: {}%", params.profit_margin * 100.0);
    tracing::info!("  Extra buy margin: {}%", params.buy_extra_margin * 100.0);
    tracing::info!("  Order size: {} contracts", params.order_size);
    tracing::info!("  Initial buy timeout: {:?}", params.initial_buy_timeout);

    let client = Arc::new(client);
    let deps = CycleDeps {
        gateway: client.clone(),
        history: client,
        feed: Arc::new(BitmexPriceFeed::new(&settings.exchange.ws_url)),
        ledger: open_ledger(settings.database.as_ref(), &params.symbol)
            .await
            .context("failed to connect to ledger database")?,
        notifier: create_notifier(&settings),
    };
    let cycle = TradingCycle::new(params, settings.cycle_timings(), deps);

    tracing::info!("Press Ctrl+C to stop...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = cycle.run_guarded() => {
            result.context("trading cycle failed")?;
        }
    }

    tracing::info!("👋 swingbot stopped");
    Ok(())
}

async fn print_stability(settings: &Settings, client: &BitmexClient) -> anyhow::Result<()> {
    let trading = &settings.trading;
    let samples = client
        .recent_prices(&trading.symbol, trading.history_depth)
        .await?;
    let reading = StabilityGate::new(trading.stability).evaluate(&samples)?;

    println!("symbol:          {}", trading.symbol);
    println!("stable:          {}", reading.is_stable);
    println!("deviation score: {:.4}", reading.deviation_score);
    println!("reference price: {}", reading.reference_price);
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("swingbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    match &settings.telegram {
        Some(telegram) => {
            tracing::info!("Telegram notifications enabled for chat {}", telegram.chat_id);
            Arc::new(TelegramNotifier::new(&telegram.api_url, &telegram.bot_token))
        }
        None => {
            tracing::info!("No Telegram chat configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}
