//! Scripted broker double for unit tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::Broker;
use crate::types::{AccountSnapshot, Candle, PositionView, Side};

/// How `connect` behaves
#[derive(Debug, Clone)]
pub enum ConnectScript {
    Accept,
    Refuse,
    Fail(String),
}

/// One order as the double saw it
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub symbol: String,
    pub volume: f64,
    pub side: Side,
    pub tp_pips: f64,
    pub sl_pips: f64,
}

#[derive(Default)]
struct Inner {
    status_script: VecDeque<(bool, Option<String>)>,
    summary_script: VecDeque<AccountSnapshot>,
    price_script: VecDeque<Option<f64>>,
    orders: Vec<PlacedOrder>,
    close_all_calls: u32,
    closed_positions: Vec<u64>,
}

/// Broker whose answers are scripted per call
///
/// Scripted sequences pop one entry per call and repeat their last entry
/// once exhausted, so a test only scripts the transitions it cares about.
pub struct ScriptedBroker {
    connect: ConnectScript,
    reject_orders: Option<String>,
    fail_close_all: bool,
    bar_counts: BTreeMap<String, usize>,
    history: BTreeMap<String, Vec<Candle>>,
    positions: BTreeMap<u64, PositionView>,
    symbols: Vec<String>,
    inner: Mutex<Inner>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self {
            connect: ConnectScript::Accept,
            reject_orders: None,
            fail_close_all: false,
            bar_counts: BTreeMap::new(),
            history: BTreeMap::new(),
            positions: BTreeMap::new(),
            symbols: vec!["EURUSD".to_string()],
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_connect(mut self, script: ConnectScript) -> Self {
        self.connect = script;
        self
    }

    /// Status answers, one per `connection_status` call, last one repeating.
    pub fn with_status_sequence(self, seq: Vec<(bool, Option<String>)>) -> Self {
        self.inner.lock().unwrap().status_script = seq.into();
        self
    }

    /// Summary answers, one per `account_summary` call, last one repeating.
    pub fn with_summary_sequence(self, seq: Vec<AccountSnapshot>) -> Self {
        self.inner.lock().unwrap().summary_script = seq.into();
        self
    }

    /// Price answers, one per `market_price` call, last one repeating.
    pub fn with_price_sequence(self, seq: Vec<Option<f64>>) -> Self {
        self.inner.lock().unwrap().price_script = seq.into();
        self
    }

    pub fn with_bar_counts(mut self, counts: &[(&str, usize)]) -> Self {
        self.bar_counts = counts
            .iter()
            .map(|(tf, n)| (tf.to_string(), *n))
            .collect();
        self
    }

    pub fn with_history(mut self, timeframe: &str, bars: Vec<Candle>) -> Self {
        self.history.insert(timeframe.to_string(), bars);
        self
    }

    pub fn with_positions(mut self, positions: BTreeMap<u64, PositionView>) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn rejecting_orders(mut self, reason: &str) -> Self {
        self.reject_orders = Some(reason.to_string());
        self
    }

    pub fn failing_close_all(mut self) -> Self {
        self.fail_close_all = true;
        self
    }

    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.inner.lock().unwrap().orders.clone()
    }

    pub fn close_all_calls(&self) -> u32 {
        self.inner.lock().unwrap().close_all_calls
    }

    pub fn closed_positions(&self) -> Vec<u64> {
        self.inner.lock().unwrap().closed_positions.clone()
    }

    fn next_from<T: Clone>(script: &mut VecDeque<T>, fallback: T) -> T {
        if script.len() > 1 {
            script.pop_front().unwrap_or(fallback)
        } else {
            script.front().cloned().unwrap_or(fallback)
        }
    }
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn connect(&self) -> Result<bool> {
        match &self.connect {
            ConnectScript::Accept => Ok(true),
            ConnectScript::Refuse => Ok(false),
            ConnectScript::Fail(reason) => bail!("{}", reason),
        }
    }

    async fn connection_status(&self) -> (bool, Option<String>) {
        let mut inner = self.inner.lock().unwrap();
        Self::next_from(&mut inner.status_script, (true, None))
    }

    async fn account_summary(&self) -> Result<AccountSnapshot> {
        let mut inner = self.inner.lock().unwrap();
        let fallback = AccountSnapshot {
            account_id: Some("TEST-1".to_string()),
            balance: Some(1000.0),
            equity: Some(1000.0),
            margin: Some(0.0),
        };
        Ok(Self::next_from(&mut inner.summary_script, fallback))
    }

    async fn market_price(&self, _symbol: &str) -> Result<Option<f64>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::next_from(&mut inner.price_script, Some(1.1000)))
    }

    async fn ohlc_bar_counts(&self, _symbol: &str) -> Result<BTreeMap<String, usize>> {
        Ok(self.bar_counts.clone())
    }

    async fn ohlc_history(
        &self,
        _symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let bars = self.history.get(timeframe).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        volume: f64,
        side: Side,
        tp_pips: f64,
        sl_pips: f64,
    ) -> Result<String> {
        if let Some(reason) = &self.reject_orders {
            bail!("{}", reason);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.orders.push(PlacedOrder {
            symbol: symbol.to_string(),
            volume,
            side,
            tp_pips,
            sl_pips,
        });
        Ok(format!("order #{} accepted", inner.orders.len()))
    }

    async fn close_all_positions(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.close_all_calls += 1;
        if self.fail_close_all {
            bail!("close rejected: market closed");
        }
        Ok(())
    }

    async fn close_position(&self, id: u64) -> Result<()> {
        if !self.positions.contains_key(&id) {
            bail!("Position #{} not found", id);
        }
        self.inner.lock().unwrap().closed_positions.push(id);
        Ok(())
    }

    async fn open_positions(&self) -> Result<BTreeMap<u64, PositionView>> {
        Ok(self.positions.clone())
    }

    async fn available_symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}
