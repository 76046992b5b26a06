//! Connection state machine and the worker that drives it

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::ConnectionSettings;
use crate::broker::Broker;
use crate::bus::{BusMessage, EventBus};
use crate::types::AccountSnapshot;

/// Where the broker link currently stands
///
/// Written only by the coordinator; everyone else reads snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    /// Terminal until the caller re-invokes connect
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Authenticating => write!(f, "Authenticating..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Drives connect, authentication polling, and the post-connect refresh loop
///
/// The whole attempt runs on its own worker so the caller never blocks. A
/// failed attempt parks in `Failed` and stays there; there is no auto-retry.
pub struct ConnectionCoordinator {
    broker: Arc<dyn Broker>,
    bus: EventBus,
    settings: ConnectionSettings,
    state: Arc<RwLock<ConnectionState>>,
    account: Arc<RwLock<AccountSnapshot>>,
    refresh_stop: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectionCoordinator {
    pub fn new(broker: Arc<dyn Broker>, bus: EventBus, settings: ConnectionSettings) -> Self {
        Self {
            broker,
            bus,
            settings,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            account: Arc::new(RwLock::new(AccountSnapshot::default())),
            refresh_stop: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub async fn account(&self) -> AccountSnapshot {
        self.account.read().await.clone()
    }

    /// Read-only view of the live snapshot, for workers that need equity
    /// without a broker round trip.
    pub(crate) fn account_handle(&self) -> Arc<RwLock<AccountSnapshot>> {
        Arc::clone(&self.account)
    }

    /// Launch a connect attempt on a dedicated worker.
    pub fn spawn_connect(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_connect().await })
    }

    /// The connect state machine. One pass per invocation; a prior refresh
    /// worker is torn down before the attempt starts. A second invocation
    /// while an attempt is in flight is a no-op.
    pub(crate) async fn run_connect(&self) {
        {
            let mut state = self.state.write().await;
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Authenticating
            ) {
                debug!("Connect attempt already in flight, ignoring");
                return;
            }
            *state = ConnectionState::Connecting;
        }
        self.stop_refresh().await;

        self.bus
            .publish(BusMessage::ConnectionChanged {
                state: ConnectionState::Connecting,
            })
            .await;
        self.bus.log("Processing connection...").await;

        match self.broker.connect().await {
            Ok(true) => {}
            Ok(false) => {
                let (_, reason) = self.broker.connection_status().await;
                match reason {
                    Some(reason) => self.fail(reason).await,
                    None => {
                        self.bus.log("Connection failed.").await;
                        self.set_state(ConnectionState::Failed("Connection failed.".to_string()))
                            .await;
                    }
                }
                return;
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        }

        self.set_state(ConnectionState::Authenticating).await;
        self.bus
            .log("Connection successful. Authenticating account...")
            .await;

        // One poll budget spans both the status and the account phase.
        let mut polls: u32 = 0;

        loop {
            let (connected, reason) = self.broker.connection_status().await;
            if connected {
                break;
            }
            if let Some(reason) = reason {
                self.fail(reason).await;
                return;
            }
            if self.poll_budget_spent(&mut polls) {
                self.fail("Authentication timed out.".to_string()).await;
                return;
            }
            tokio::time::sleep(self.settings.auth_poll_interval()).await;
        }

        self.bus.log("Fetching account details...").await;
        let snapshot = loop {
            match self.broker.account_summary().await {
                Ok(summary) if summary.is_resolved() => break summary,
                Ok(_) => {}
                Err(e) => warn!("Account summary fetch failed: {}", e),
            }
            if self.poll_budget_spent(&mut polls) {
                self.fail("Authentication timed out.".to_string()).await;
                return;
            }
            tokio::time::sleep(self.settings.account_poll_interval()).await;
        };

        *self.account.write().await = snapshot.clone();
        self.set_state(ConnectionState::Connected).await;
        self.bus
            .publish(BusMessage::AccountUpdate(snapshot.clone()))
            .await;
        if let Some(id) = snapshot.account_id.as_deref() {
            info!("Successfully connected to account {}", id);
            self.bus
                .log(format!("Successfully connected to account {}", id))
                .await;
        }

        self.publish_symbol_catalog().await;
        self.start_refresh().await;
    }

    /// Tear down the refresh worker and return to `Disconnected`.
    pub async fn disconnect(&self) {
        self.stop_refresh().await;
        *self.account.write().await = AccountSnapshot::default();
        self.set_state(ConnectionState::Disconnected).await;
    }

    fn poll_budget_spent(&self, polls: &mut u32) -> bool {
        *polls += 1;
        match self.settings.max_auth_polls {
            Some(max) => *polls >= max,
            None => false,
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state.clone();
        self.bus.publish(BusMessage::ConnectionChanged { state }).await;
    }

    async fn fail(&self, reason: String) {
        warn!("Connection failed: {}", reason);
        self.bus.log(format!("Failed: {}", reason)).await;
        self.set_state(ConnectionState::Failed(reason)).await;
    }

    async fn publish_symbol_catalog(&self) {
        let symbols = match self.broker.available_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("Symbol catalog fetch failed: {}", e);
                Vec::new()
            }
        };
        if symbols.is_empty() {
            warn!("No symbols received from the broker");
            self.bus
                .log("Warning: No symbols received from the broker.")
                .await;
        }
        self.bus.publish(BusMessage::SymbolCatalog { symbols }).await;
    }

    async fn stop_refresh(&self) {
        if let Some(stop) = self.refresh_stop.lock().await.take() {
            let _ = stop.send(true);
        }
    }

    /// Spawn the periodic account/position refresh. Fetch failures are
    /// logged and skipped; the loop only exits on disconnect.
    async fn start_refresh(&self) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        *self.refresh_stop.lock().await = Some(stop_tx);

        let broker = Arc::clone(&self.broker);
        let bus = self.bus.clone();
        let account = Arc::clone(&self.account);
        let interval = self.settings.refresh_interval();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        match broker.account_summary().await {
                            Ok(summary) => {
                                *account.write().await = summary.clone();
                                bus.publish(BusMessage::AccountUpdate(summary)).await;
                            }
                            Err(e) => warn!("Account refresh failed: {}", e),
                        }
                        match broker.open_positions().await {
                            Ok(positions) => {
                                bus.publish(BusMessage::PositionsUpdate { positions }).await;
                            }
                            Err(e) => warn!("Position refresh failed: {}", e),
                        }
                    }
                }
            }
        });
    }
}
