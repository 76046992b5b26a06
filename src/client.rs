//! Facade tying the broker, session workers, and bus together

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::advisor::{Advisor, Analyzer, TradeProposal};
use crate::broker::Broker;
use crate::bus::{BusMessage, EventBus};
use crate::session::{
    AdvisoryRequester, ConnectionCoordinator, ConnectionSettings, ConnectionState, SessionConfig,
    SessionHandle, SessionRunner,
};
use crate::strategy;
use crate::types::{AccountSnapshot, SessionStats};

/// Suggested bus drain cadence for consumers, in milliseconds
pub const DEFAULT_DRAIN_MS: u64 = 100;

/// The command surface of the trading client
///
/// Commands that cannot be honored are rejected synchronously; everything
/// that happens after a command is accepted flows back through the bus.
pub struct TradingClient {
    broker: Arc<dyn Broker>,
    bus: EventBus,
    coordinator: Arc<ConnectionCoordinator>,
    requester: AdvisoryRequester,
    config: RwLock<SessionConfig>,
    session: Mutex<Option<SessionHandle>>,
    stats: RwLock<Option<Arc<RwLock<SessionStats>>>>,
}

impl TradingClient {
    pub fn new(
        broker: Arc<dyn Broker>,
        advisor: Arc<dyn Advisor>,
        analyzer: Arc<dyn Analyzer>,
        config: SessionConfig,
        settings: ConnectionSettings,
    ) -> Self {
        let bus = EventBus::default();
        let coordinator = Arc::new(ConnectionCoordinator::new(
            Arc::clone(&broker),
            bus.clone(),
            settings,
        ));
        let requester =
            AdvisoryRequester::new(Arc::clone(&broker), advisor, analyzer, bus.clone());
        Self {
            broker,
            bus,
            coordinator,
            requester,
            config: RwLock::new(config),
            session: Mutex::new(None),
            stats: RwLock::new(None),
        }
    }

    /// Kick off a connect attempt. Progress and the outcome arrive on the
    /// bus; the returned handle only signals worker completion.
    pub fn connect(&self) -> JoinHandle<()> {
        self.coordinator.spawn_connect()
    }

    /// Start the session worker with the given settings.
    ///
    /// Rejected while disconnected, while another session is running, for
    /// an unknown strategy name, or when the baseline equity cannot be
    /// established.
    pub async fn begin_session(&self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        let strategy = strategy::create(&config.strategy)?;

        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|h| !h.is_finished()) {
            bail!("A session is already running.");
        }
        if !self.coordinator.state().await.is_connected() {
            bail!("Cannot begin a session without a broker connection.");
        }

        let summary = self
            .broker
            .account_summary()
            .await
            .context("Could not establish the batch baseline equity")?;
        let Some(equity) = summary.equity else {
            bail!("Could not establish the batch baseline equity: summary incomplete");
        };

        info!(strategy = strategy.name(), symbol = %config.symbol, "Session accepted");
        self.bus
            .log(format!("Strategy created: {}", strategy.name()))
            .await;

        *self.config.write().await = config.clone();

        let runner = SessionRunner::new(
            Arc::clone(&self.broker),
            self.bus.clone(),
            config,
            strategy,
            self.coordinator.account_handle(),
            equity,
        );
        *self.stats.write().await = Some(runner.stats_handle());
        *session = Some(runner.spawn());
        Ok(())
    }

    /// Stop the running session and wait for its final flatten.
    pub async fn stop_session(&self) -> Result<()> {
        let handle = self.session.lock().await.take();
        let Some(handle) = handle else {
            bail!("No session is running.");
        };
        handle.request_stop();
        handle.join().await;
        Ok(())
    }

    /// Fire one advisory request using the current session settings.
    pub async fn request_advisory(&self) -> JoinHandle<()> {
        let config = self.config.read().await.clone();
        let proposal = TradeProposal::neutral(config.sl_pips, config.tp_pips);
        self.requester.spawn_request(&config.symbol, proposal)
    }

    /// Close one position by id, outside any batch accounting.
    pub async fn close_position(&self, id: u64) -> Result<()> {
        match self.broker.close_position(id).await {
            Ok(()) => {
                self.bus
                    .log(format!("Close request sent for position #{}.", id))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.bus
                    .log(format!("Error closing position #{}: {}", id, e))
                    .await;
                Err(e)
            }
        }
    }

    /// Stop any running session, then drop the broker link.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            handle.request_stop();
            handle.join().await;
        }
        self.coordinator.disconnect().await;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.coordinator.state().await
    }

    pub async fn account(&self) -> AccountSnapshot {
        self.coordinator.account().await
    }

    /// Statistics of the current session, or of the last one once stopped.
    pub async fn session_stats(&self) -> SessionStats {
        match self.stats.read().await.as_ref() {
            Some(stats) => *stats.read().await,
            None => SessionStats::default(),
        }
    }

    pub async fn session_running(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Pull everything published since the last drain, in order.
    pub async fn drain_events(&self) -> Vec<BusMessage> {
        self.bus.drain().await
    }
}
