//! Paper broker simulation
//!
//! Random-walk prices, instant fills, and in-memory positions so the binary
//! runs end-to-end without a live broker account. Bracket distances are
//! accepted on submission but exits only happen through the close calls.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use super::Broker;
use crate::types::{AccountSnapshot, Candle, PositionView, Side};

const CONTRACT_SIZE: f64 = 100_000.0;
const SEEDED_BARS: usize = 200;

fn pip_size(symbol: &str) -> f64 {
    if symbol.ends_with("JPY") {
        0.01
    } else {
        0.0001
    }
}

fn timeframe_duration(timeframe: &str) -> ChronoDuration {
    match timeframe {
        "15s" => ChronoDuration::seconds(15),
        "1m" => ChronoDuration::seconds(60),
        "5m" => ChronoDuration::seconds(300),
        "15m" => ChronoDuration::seconds(900),
        "1h" => ChronoDuration::seconds(3600),
        _ => ChronoDuration::seconds(60),
    }
}

struct PaperPosition {
    symbol: String,
    side: Side,
    volume: f64,
    open_price: f64,
}

struct PaperState {
    connected: bool,
    prices: HashMap<String, f64>,
    history: HashMap<String, BTreeMap<String, Vec<Candle>>>,
    positions: BTreeMap<u64, PaperPosition>,
    next_ticket: u64,
    balance: f64,
}

/// In-memory broker standing in for a live account
pub struct PaperBroker {
    state: Mutex<PaperState>,
    symbols: Vec<String>,
    account_id: String,
    /// Probability that an order is rejected, for exercising failure paths
    reject_chance: f64,
}

impl PaperBroker {
    pub fn new(starting_balance: f64) -> Self {
        let symbols = vec![
            "EURUSD".to_string(),
            "GBPUSD".to_string(),
            "USDJPY".to_string(),
            "XAUUSD".to_string(),
        ];
        Self {
            state: Mutex::new(PaperState {
                connected: false,
                prices: HashMap::new(),
                history: HashMap::new(),
                positions: BTreeMap::new(),
                next_ticket: 1,
                balance: starting_balance,
            }),
            symbols,
            account_id: "PAPER-001".to_string(),
            reject_chance: 0.05,
        }
    }

    pub fn with_reject_chance(mut self, chance: f64) -> Self {
        self.reject_chance = chance;
        self
    }

    fn starting_price(symbol: &str) -> f64 {
        match symbol {
            "EURUSD" => 1.0850,
            "GBPUSD" => 1.2700,
            "USDJPY" => 155.20,
            "XAUUSD" => 2400.0,
            _ => 1.0000,
        }
    }

    fn seed_history(state: &mut PaperState, symbol: &str) {
        let mut rng = rand::thread_rng();
        let mut price = Self::starting_price(symbol);
        let now = Utc::now();

        let mut per_timeframe = BTreeMap::new();
        for timeframe in ["15s", "1m"] {
            let step = timeframe_duration(timeframe);
            let mut bars = Vec::with_capacity(SEEDED_BARS);
            for i in 0..SEEDED_BARS {
                let open = price;
                let drift = price * rng.gen_range(-0.0004..0.0004);
                let close = open + drift;
                let high = open.max(close) + price * rng.gen_range(0.0..0.0002);
                let low = open.min(close) - price * rng.gen_range(0.0..0.0002);
                bars.push(Candle {
                    time: now - step * (SEEDED_BARS - i) as i32,
                    open,
                    high,
                    low,
                    close,
                    volume: rng.gen_range(50.0..500.0),
                });
                price = close;
            }
            per_timeframe.insert(timeframe.to_string(), bars);
        }

        state.prices.insert(symbol.to_string(), price);
        state.history.insert(symbol.to_string(), per_timeframe);
    }

    fn floating_pnl(position: &PaperPosition, current: f64) -> f64 {
        let delta = match position.side {
            Side::Buy => current - position.open_price,
            Side::Sell => position.open_price - current,
        };
        delta * position.volume * CONTRACT_SIZE
    }

    fn view(id: u64, position: &PaperPosition, current: f64) -> PositionView {
        PositionView {
            id,
            symbol: position.symbol.clone(),
            side: position.side,
            volume: position.volume,
            open_price: position.open_price,
            pnl: Self::floating_pnl(position, current),
        }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn connect(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.connected {
            for symbol in self.symbols.clone() {
                Self::seed_history(&mut state, &symbol);
            }
            state.connected = true;
            debug!("Paper broker connected, seeded {} symbols", self.symbols.len());
        }
        Ok(true)
    }

    async fn connection_status(&self) -> (bool, Option<String>) {
        let state = self.state.lock().await;
        (state.connected, None)
    }

    async fn account_summary(&self) -> Result<AccountSnapshot> {
        let state = self.state.lock().await;
        if !state.connected {
            return Ok(AccountSnapshot::default());
        }

        let floating: f64 = state
            .positions
            .iter()
            .map(|(_, p)| {
                let current = state.prices.get(&p.symbol).copied().unwrap_or(p.open_price);
                Self::floating_pnl(p, current)
            })
            .sum();

        Ok(AccountSnapshot {
            account_id: Some(self.account_id.clone()),
            balance: Some(state.balance),
            equity: Some(state.balance + floating),
            margin: Some(state.positions.len() as f64 * 10.0),
        })
    }

    async fn market_price(&self, symbol: &str) -> Result<Option<f64>> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Ok(None);
        }
        let Some(price) = state.prices.get(symbol).copied() else {
            return Ok(None);
        };

        let step = {
            let mut rng = rand::thread_rng();
            price * rng.gen_range(-0.0002..0.0002)
        };
        let next = price + step;
        state.prices.insert(symbol.to_string(), next);
        Ok(Some(next))
    }

    async fn ohlc_bar_counts(&self, symbol: &str) -> Result<BTreeMap<String, usize>> {
        let state = self.state.lock().await;
        let counts = state
            .history
            .get(symbol)
            .map(|per_tf| {
                per_tf
                    .iter()
                    .map(|(tf, bars)| (tf.clone(), bars.len()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(counts)
    }

    async fn ohlc_history(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let state = self.state.lock().await;
        let bars = state
            .history
            .get(symbol)
            .and_then(|per_tf| per_tf.get(timeframe))
            .map(|bars| {
                let skip = bars.len().saturating_sub(count);
                bars[skip..].to_vec()
            })
            .unwrap_or_default();
        Ok(bars)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        volume: f64,
        side: Side,
        tp_pips: f64,
        sl_pips: f64,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.connected {
            bail!("Not connected");
        }
        if volume <= 0.0 {
            bail!("Invalid volume: {}", volume);
        }
        let Some(price) = state.prices.get(symbol).copied() else {
            bail!("No quote for symbol {}", symbol);
        };

        let rejected = {
            let mut rng = rand::thread_rng();
            rng.gen_bool(self.reject_chance)
        };
        if rejected {
            bail!("Rejected by dealer: off quotes");
        }

        // Fills cross the spread by half a pip.
        let half_spread = pip_size(symbol) * 0.5;
        let fill = match side {
            Side::Buy => price + half_spread,
            Side::Sell => price - half_spread,
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.insert(
            ticket,
            PaperPosition {
                symbol: symbol.to_string(),
                side,
                volume,
                open_price: fill,
            },
        );

        Ok(format!(
            "Order #{} filled: {} {} lots of {} at {:.5} (tp {} / sl {} pips)",
            ticket, side, volume, symbol, fill, tp_pips, sl_pips
        ))
    }

    async fn close_all_positions(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            bail!("Not connected");
        }
        let tickets: Vec<u64> = state.positions.keys().copied().collect();
        for ticket in tickets {
            if let Some(position) = state.positions.remove(&ticket) {
                let current = state
                    .prices
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.open_price);
                state.balance += Self::floating_pnl(&position, current);
            }
        }
        Ok(())
    }

    async fn close_position(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.connected {
            bail!("Not connected");
        }
        let Some(position) = state.positions.remove(&id) else {
            bail!("Position #{} not found", id);
        };
        let current = state
            .prices
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.open_price);
        state.balance += Self::floating_pnl(&position, current);
        Ok(())
    }

    async fn open_positions(&self) -> Result<BTreeMap<u64, PositionView>> {
        let state = self.state.lock().await;
        let views = state
            .positions
            .iter()
            .map(|(id, p)| {
                let current = state.prices.get(&p.symbol).copied().unwrap_or(p.open_price);
                (*id, Self::view(*id, p, current))
            })
            .collect();
        Ok(views)
    }

    async fn available_symbols(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        if !state.connected {
            return Ok(Vec::new());
        }
        Ok(self.symbols.clone())
    }
}
