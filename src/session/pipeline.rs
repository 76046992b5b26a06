//! Execution pipeline: offset resolution, order submission, statistics

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::batch::BatchTracker;
use crate::broker::Broker;
use crate::bus::EventBus;
use crate::types::{SessionStats, TradeIntent};

/// What happened to one intent
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Broker accepted the order
    Submitted { message: String },
    /// Intent discarded before submission
    Skipped { reason: String },
    /// Broker refused the order
    Rejected { reason: String },
}

/// Consumes trade intents inside the session worker
///
/// Runs synchronously within the session loop so the batch counter and the
/// session statistics each keep a single writer. Awaits only the broker's
/// submission acknowledgement, never fills.
pub struct ExecutionPipeline {
    broker: Arc<dyn Broker>,
    bus: EventBus,
    stats: Arc<RwLock<SessionStats>>,
    default_tp_pips: f64,
    default_sl_pips: f64,
}

/// Strategy override beats the session default, exactly and always.
pub fn resolve_offset(strategy_offset: Option<f64>, default: f64) -> f64 {
    strategy_offset.unwrap_or(default)
}

impl ExecutionPipeline {
    pub fn new(
        broker: Arc<dyn Broker>,
        bus: EventBus,
        default_tp_pips: f64,
        default_sl_pips: f64,
    ) -> Self {
        Self {
            broker,
            bus,
            stats: Arc::new(RwLock::new(SessionStats::default())),
            default_tp_pips,
            default_sl_pips,
        }
    }

    /// Shared handle for consumers that display the statistics.
    pub fn stats_handle(&self) -> Arc<RwLock<SessionStats>> {
        Arc::clone(&self.stats)
    }

    pub async fn stats(&self) -> SessionStats {
        *self.stats.read().await
    }

    /// Submit one intent. Counters move only on broker acceptance; a
    /// rejection is logged and surfaced, never retried.
    pub async fn execute(
        &self,
        intent: &TradeIntent,
        tracker: &mut BatchTracker,
    ) -> ExecutionOutcome {
        if intent.reference_price.is_none() {
            let reason = "Trade execution skipped: Market price is unavailable.";
            warn!(intent = %intent.id, "{}", reason);
            self.bus.log(reason).await;
            return ExecutionOutcome::Skipped {
                reason: reason.to_string(),
            };
        }

        let tp_pips = resolve_offset(intent.tp_pips, self.default_tp_pips);
        let sl_pips = resolve_offset(intent.sl_pips, self.default_sl_pips);

        info!(
            intent = %intent.id,
            "Attempting to place market order: {} {} lots of {}",
            intent.side, intent.volume, intent.symbol
        );
        self.bus
            .log(format!(
                "Attempting to place market order: {} {} lots of {}",
                intent.side, intent.volume, intent.symbol
            ))
            .await;

        match self
            .broker
            .place_market_order(&intent.symbol, intent.volume, intent.side, tp_pips, sl_pips)
            .await
        {
            Ok(message) => {
                info!(intent = %intent.id, "Order request successful: {}", message);
                self.bus
                    .log(format!("Order request successful: {}", message))
                    .await;

                self.stats.write().await.total_trades += 1;
                tracker.record_trade();

                ExecutionOutcome::Submitted { message }
            }
            Err(e) => {
                warn!(intent = %intent.id, "Order request failed: {}", e);
                self.bus.log(format!("Order request failed: {}", e)).await;

                ExecutionOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fold a closed batch into the statistics. Called from the session
    /// worker after a flatten, so the pipeline stays the sole stats writer.
    pub async fn record_batch_close(&self, delta: f64) {
        let mut stats = self.stats.write().await;
        stats.total_pnl += delta;
        if delta > 0.0 {
            stats.wins += 1;
        }
    }
}
