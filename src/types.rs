//! Shared data model for the session core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Single OHLC bar
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Account state as last reported by the broker
///
/// All fields start empty and stay empty until the first successful fetch.
/// Instances are immutable; refreshes replace the whole snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Broker-assigned account identifier
    pub account_id: Option<String>,
    /// Account balance (closed P&L only)
    pub balance: Option<f64>,
    /// Account equity (balance plus floating P&L)
    pub equity: Option<f64>,
    /// Margin currently in use
    pub margin: Option<f64>,
}

impl AccountSnapshot {
    /// True once the broker has reported both an account id and a balance.
    pub fn is_resolved(&self) -> bool {
        self.account_id.is_some() && self.balance.is_some()
    }
}

/// One open position as reported by the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    /// Broker ticket / position id
    pub id: u64,
    pub symbol: String,
    pub side: Side,
    /// Volume in lots
    pub volume: f64,
    pub open_price: f64,
    /// Floating P&L in account currency
    pub pnl: f64,
}

/// A single trade request produced by one strategy signal
///
/// Immutable once constructed; consumed exactly once by the execution
/// pipeline. `tp_pips`/`sl_pips` are strategy overrides and fall back to the
/// session defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Client-side id, used to correlate log lines
    pub id: Uuid,

    pub side: Side,

    pub symbol: String,

    /// Market price observed when the signal fired; an intent without one
    /// is discarded by the pipeline
    pub reference_price: Option<f64>,

    /// Volume in lots
    pub volume: f64,

    /// Strategy take-profit override in pips
    pub tp_pips: Option<f64>,

    /// Strategy stop-loss override in pips
    pub sl_pips: Option<f64>,

    /// Free-form note from the strategy, may be empty
    pub strategy_comment: String,
}

impl TradeIntent {
    pub fn new(side: Side, symbol: &str, reference_price: Option<f64>, volume: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            side,
            symbol: symbol.to_string(),
            reference_price,
            volume,
            tp_pips: None,
            sl_pips: None,
            strategy_comment: String::new(),
        }
    }
}

/// Running statistics for one session
///
/// Written only by the execution pipeline; cloned out for display.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Orders accepted by the broker this session
    pub total_trades: u32,
    /// Batches closed with a positive realized delta
    pub wins: u32,
    /// Sum of realized batch deltas in account currency
    pub total_pnl: f64,
}
