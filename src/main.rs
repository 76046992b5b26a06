use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use fx_scalper::advisor::{PaperAdvisor, PaperAnalyzer};
use fx_scalper::broker::PaperBroker;
use fx_scalper::client::{TradingClient, DEFAULT_DRAIN_MS};
use fx_scalper::session::{ConnectionSettings, ConnectionState, SessionConfig};
use fx_scalper::BusMessage;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Symbol to trade
    #[arg(short, long, default_value = "EURUSD", env = "FX_SYMBOL")]
    symbol: String,

    /// Strategy profile (Safe, Moderate, Aggressive, Momentum, Mean Reversion)
    #[arg(long, default_value = "Moderate", env = "FX_STRATEGY")]
    strategy: String,

    /// Default take-profit distance in pips
    #[arg(long, default_value = "10.0")]
    tp_pips: f64,

    /// Default stop-loss distance in pips
    #[arg(long, default_value = "5.0")]
    sl_pips: f64,

    /// Order volume in lots
    #[arg(long, default_value = "0.01")]
    volume: f64,

    /// Trades per batch before the profit target is checked
    #[arg(long, default_value = "5")]
    batch_size: u32,

    /// Equity gain that closes out a batch
    #[arg(long, default_value = "50.0")]
    batch_target: f64,

    /// Session loop interval in milliseconds
    #[arg(long, default_value = "1000")]
    poll_ms: u64,

    /// Fire one advisory request once the session is running
    #[arg(long)]
    advisory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fx_scalper=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting FX scalper session client");
    info!("Symbol: {}", args.symbol);
    info!("Strategy: {}", args.strategy);
    info!(
        "Batch: {} trades against a {:.2} target",
        args.batch_size, args.batch_target
    );

    let config = SessionConfig {
        symbol: args.symbol.clone(),
        tp_pips: args.tp_pips,
        sl_pips: args.sl_pips,
        volume: args.volume,
        strategy: args.strategy.clone(),
        batch_profit_target: args.batch_target,
        batch_size: args.batch_size,
        poll_ms: args.poll_ms,
    };

    let client = Arc::new(TradingClient::new(
        Arc::new(PaperBroker::new(10_000.0)),
        Arc::new(PaperAdvisor),
        Arc::new(PaperAnalyzer),
        config.clone(),
        ConnectionSettings::default(),
    ));

    // Drain the bus on a fixed tick; this is the single consumer.
    let consumer = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(DEFAULT_DRAIN_MS));
            loop {
                ticker.tick().await;
                for message in client.drain_events().await {
                    render(&message);
                }
            }
        })
    };

    client.connect().await?;
    match client.connection_state().await {
        ConnectionState::Connected => {}
        state => bail!("Broker connection did not come up: {}", state),
    }

    client.begin_session(config).await?;
    if args.advisory {
        let _ = client.request_advisory().await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, stopping session");

    client.disconnect().await;
    consumer.abort();
    for message in client.drain_events().await {
        render(&message);
    }

    let stats = client.session_stats().await;
    info!(
        "Session summary: {} trades, {} winning batches, {:.2} realized",
        stats.total_trades, stats.wins, stats.total_pnl
    );

    Ok(())
}

fn render(message: &BusMessage) {
    match message {
        BusMessage::LogLine { message } => info!("{}", message),
        BusMessage::ConnectionChanged { state } => info!("Connection: {}", state),
        BusMessage::AccountUpdate(snapshot) => {
            if let (Some(balance), Some(equity)) = (snapshot.balance, snapshot.equity) {
                info!("Account update: balance {:.2}, equity {:.2}", balance, equity);
            }
        }
        BusMessage::PositionsUpdate { positions } => {
            if let Ok(json) = serde_json::to_string(positions) {
                info!("Open positions: {}", json);
            }
        }
        BusMessage::SymbolCatalog { symbols } => {
            info!("Symbols available: {}", symbols.join(", "))
        }
        BusMessage::ReadinessUpdate(readiness) => debug!("Data readiness: {}", readiness.status),
        BusMessage::AdvisoryResult(advice) => info!(
            "Analysis result: {} (Conf: {:.2}%) - {}",
            advice.action.to_uppercase(),
            advice.confidence * 100.0,
            advice.reason
        ),
        BusMessage::AdvisoryError { message } => warn!("Advisory error: {}", message),
        BusMessage::AdvisoryIdle => debug!("Advisory requester idle"),
        BusMessage::TradeIntent(intent) => info!(
            "Trade intent: {} {} lots of {}",
            intent.side, intent.volume, intent.symbol
        ),
    }
}
