//! Broker collaborator contract
//!
//! The session core drives its broker through this narrow surface and treats
//! everything behind it as opaque. Implementations own the wire protocol,
//! price feasibility checks, and symbol metadata.

mod paper;

#[cfg(test)]
pub(crate) mod testkit;

pub use paper::PaperBroker;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{AccountSnapshot, Candle, PositionView, Side};

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open the broker link. `Ok(false)` means the broker refused the
    /// handshake; the reason, if it gave one, comes from
    /// `connection_status`.
    async fn connect(&self) -> Result<bool>;

    /// Current link status plus an optional failure reason.
    async fn connection_status(&self) -> (bool, Option<String>);

    /// Latest account summary. Fields stay `None` until the broker has
    /// resolved them.
    async fn account_summary(&self) -> Result<AccountSnapshot>;

    /// Latest tradable price, `None` while the market is closed or the feed
    /// has a gap.
    async fn market_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Number of bars currently held per timeframe label.
    async fn ohlc_bar_counts(&self, symbol: &str) -> Result<BTreeMap<String, usize>>;

    /// Up to `count` most recent bars for one timeframe, oldest first.
    async fn ohlc_history(&self, symbol: &str, timeframe: &str, count: usize)
        -> Result<Vec<Candle>>;

    /// Submit a market order with bracket distances in pips. `Ok` carries
    /// the broker's confirmation message, `Err` the reported rejection.
    async fn place_market_order(
        &self,
        symbol: &str,
        volume: f64,
        side: Side,
        tp_pips: f64,
        sl_pips: f64,
    ) -> Result<String>;

    /// Close every open position on the account.
    async fn close_all_positions(&self) -> Result<()>;

    /// Close a single position by ticket id.
    async fn close_position(&self, id: u64) -> Result<()>;

    /// Open positions keyed by ticket id.
    async fn open_positions(&self) -> Result<BTreeMap<u64, PositionView>>;

    /// Symbol names the account may trade.
    async fn available_symbols(&self) -> Result<Vec<String>>;
}
