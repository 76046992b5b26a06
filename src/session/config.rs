//! Session and connection settings

use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Timing knobs for the connection coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Status poll interval while authenticating, in milliseconds
    pub auth_poll_ms: u64,

    /// Account summary poll interval after the link is up, in milliseconds
    pub account_poll_ms: u64,

    /// Cap on authentication polls; `None` polls until the broker answers
    pub max_auth_polls: Option<u32>,

    /// Account/position refresh interval once connected, in milliseconds
    pub refresh_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            auth_poll_ms: 200,
            account_poll_ms: 300,
            max_auth_polls: None,
            refresh_ms: 2000,
        }
    }
}

impl ConnectionSettings {
    pub fn auth_poll_interval(&self) -> Duration {
        Duration::from_millis(self.auth_poll_ms)
    }

    pub fn account_poll_interval(&self) -> Duration {
        Duration::from_millis(self.account_poll_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// Configuration for one trading session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Symbol to trade (e.g., "EURUSD")
    pub symbol: String,

    /// Default take-profit distance in pips, used when the strategy gives
    /// no override
    pub tp_pips: f64,

    /// Default stop-loss distance in pips, used when the strategy gives no
    /// override
    pub sl_pips: f64,

    /// Order volume in lots
    pub volume: f64,

    /// Strategy profile name (see `strategy::STRATEGY_NAMES`)
    pub strategy: String,

    /// Equity gain that closes out a batch, in account currency
    pub batch_profit_target: f64,

    /// Trades per batch before the profit target is checked
    pub batch_size: u32,

    /// Session loop iteration interval, in milliseconds
    pub poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            tp_pips: 10.0,
            sl_pips: 5.0,
            volume: 0.01,
            strategy: "Moderate".to_string(),
            batch_profit_target: 50.0,
            batch_size: 5,
            poll_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// Reject malformed numeric settings before a session starts. The
    /// strategy name is checked separately by the registry lookup.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("Symbol must not be empty");
        }
        if self.volume <= 0.0 {
            bail!("Volume must be positive, got {}", self.volume);
        }
        if self.tp_pips <= 0.0 || self.sl_pips <= 0.0 {
            bail!(
                "Bracket distances must be positive, got tp {} / sl {}",
                self.tp_pips,
                self.sl_pips
            );
        }
        if self.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        if self.batch_profit_target <= 0.0 {
            bail!(
                "Batch profit target must be positive, got {}",
                self.batch_profit_target
            );
        }
        if self.poll_ms == 0 {
            bail!("Poll interval must be positive");
        }
        Ok(())
    }
}
