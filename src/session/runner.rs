//! The session worker: one polling loop from begin to stop

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::batch::BatchTracker;
use super::config::SessionConfig;
use super::pipeline::ExecutionPipeline;
use super::readiness::check_readiness;
use crate::broker::Broker;
use crate::bus::{BusMessage, EventBus};
use crate::strategy::{MarketContext, Strategy};
use crate::types::{AccountSnapshot, SessionStats, TradeIntent};

/// Control surface for a running session
///
/// Stop is cooperative: the worker finishes its current iteration, flattens
/// open positions once, and exits. Dropping the handle also stops the worker.
pub struct SessionHandle {
    stop: watch::Sender<bool>,
    stats: Arc<RwLock<SessionStats>>,
    worker: JoinHandle<()>,
}

impl SessionHandle {
    pub fn request_stop(&self) {
        let _ = self.stop.send(true);
    }

    pub async fn stats(&self) -> SessionStats {
        *self.stats.read().await
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker to exit. Stop must have been requested first,
    /// or this waits for the session to end on its own.
    pub async fn join(self) {
        let _ = self.worker.await;
    }
}

/// Owns everything one session touches: the strategy, the batch tracker,
/// and the execution pipeline all live on this worker.
pub struct SessionRunner {
    broker: Arc<dyn Broker>,
    bus: EventBus,
    config: SessionConfig,
    strategy: Box<dyn Strategy>,
    pipeline: ExecutionPipeline,
    tracker: BatchTracker,
    account: Arc<RwLock<AccountSnapshot>>,
}

impl SessionRunner {
    pub fn new(
        broker: Arc<dyn Broker>,
        bus: EventBus,
        config: SessionConfig,
        strategy: Box<dyn Strategy>,
        account: Arc<RwLock<AccountSnapshot>>,
        baseline_equity: f64,
    ) -> Self {
        let pipeline =
            ExecutionPipeline::new(Arc::clone(&broker), bus.clone(), config.tp_pips, config.sl_pips);
        let tracker = BatchTracker::new(
            config.batch_size,
            config.batch_profit_target,
            baseline_equity,
        );
        Self {
            broker,
            bus,
            config,
            strategy,
            pipeline,
            tracker,
            account,
        }
    }

    /// Statistics handle, for callers that outlive the session.
    pub fn stats_handle(&self) -> Arc<RwLock<SessionStats>> {
        self.pipeline.stats_handle()
    }

    /// Start the polling worker and hand back its control handle.
    pub fn spawn(self) -> SessionHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = self.pipeline.stats_handle();
        let worker = tokio::spawn(self.run(stop_rx));
        SessionHandle {
            stop: stop_tx,
            stats,
            worker,
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            symbol = %self.config.symbol,
            strategy = self.strategy.name(),
            "Session loop started"
        );
        let interval = self.config.poll_interval();
        let required = self.strategy.required_bars();

        loop {
            if *stop.borrow() {
                break;
            }
            self.tick(&required).await;
            tokio::select! {
                changed = stop.changed() => {
                    // A dropped sender counts as a stop request.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.flatten_on_stop().await;
        info!(symbol = %self.config.symbol, "Session loop stopped");
    }

    async fn tick(&mut self, required: &BTreeMap<String, usize>) {
        if self.tracker.at_boundary() {
            self.check_batch_target().await;
        }

        let price = match self.broker.market_price(&self.config.symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => return,
            Err(e) => {
                warn!(symbol = %self.config.symbol, "Price fetch failed: {}", e);
                return;
            }
        };

        let counts = match self.broker.ohlc_bar_counts(&self.config.symbol).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(symbol = %self.config.symbol, "Bar count fetch failed: {}", e);
                return;
            }
        };
        let readiness = check_readiness(required, &counts);
        let all_ready = readiness.all_ready;
        self.bus.publish(BusMessage::ReadinessUpdate(readiness)).await;
        if !all_ready {
            debug!(symbol = %self.config.symbol, "Bar data not ready, holding trades");
            return;
        }

        let mut history = BTreeMap::new();
        for (timeframe, count) in required {
            match self
                .broker
                .ohlc_history(&self.config.symbol, timeframe, *count)
                .await
            {
                Ok(bars) => {
                    history.insert(timeframe.clone(), bars);
                }
                Err(e) => {
                    warn!(
                        symbol = %self.config.symbol,
                        timeframe, "History fetch failed: {}", e
                    );
                    return;
                }
            }
        }

        let equity = self.account.read().await.equity.unwrap_or(0.0);
        let context = MarketContext {
            history,
            equity,
            price,
        };
        let Some(signal) = self.strategy.decide(&self.config.symbol, &context) else {
            return;
        };

        info!("Strategy signal: {} for {}.", signal.side, self.config.symbol);
        self.bus
            .log(format!(
                "Strategy signal: {} for {}.",
                signal.side, self.config.symbol
            ))
            .await;

        let mut intent = TradeIntent::new(
            signal.side,
            &self.config.symbol,
            Some(price),
            self.config.volume,
        );
        intent.tp_pips = signal.tp_pips;
        intent.sl_pips = signal.sl_pips;
        if let Some(comment) = signal.comment {
            intent.strategy_comment = comment;
        }

        self.bus.publish(BusMessage::TradeIntent(intent.clone())).await;
        self.pipeline.execute(&intent, &mut self.tracker).await;
    }

    /// Boundary check: fresh equity against the batch baseline. On target,
    /// flatten, record the realized delta, and rebase on post-flatten equity.
    async fn check_batch_target(&mut self) {
        let equity = match self.broker.account_summary().await {
            Ok(summary) => summary.equity,
            Err(e) => {
                warn!("Equity check failed: {}", e);
                return;
            }
        };
        let Some(equity) = equity else {
            return;
        };
        if !self.tracker.target_met(equity) {
            return;
        }

        info!("Batch profit target reached. Closing positions.");
        self.bus
            .log("Batch profit target reached. Closing positions.")
            .await;

        if let Err(e) = self.broker.close_all_positions().await {
            warn!("Error closing positions: {}", e);
            self.bus
                .log(format!("Error closing positions: {}", e))
                .await;
        }

        // The next baseline is whatever equity the flatten left behind.
        let post_equity = match self.broker.account_summary().await {
            Ok(summary) => summary.equity.unwrap_or(equity),
            Err(_) => equity,
        };
        self.pipeline
            .record_batch_close(self.tracker.delta(post_equity))
            .await;
        self.tracker.reset(post_equity);
    }

    /// Best-effort flatten on the way out, exactly once per session.
    async fn flatten_on_stop(&mut self) {
        if let Err(e) = self.broker.close_all_positions().await {
            warn!("Error closing positions: {}", e);
            self.bus
                .log(format!("Error closing positions: {}", e))
                .await;
        }
    }
}
