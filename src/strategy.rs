//! Strategy collaborator contract and the built-in risk profiles
//!
//! The session loop only ever sees this trait: a bar requirement map for the
//! readiness gate and a decision function per tick. The built-in profiles are
//! deliberately small reference implementations with distinct bar
//! requirements and risk offsets; serious signal logic lives outside this
//! crate behind the same trait.

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::types::{Candle, Side};

/// Everything a strategy may look at for one decision
#[derive(Debug, Clone)]
pub struct MarketContext {
    /// Bar history per timeframe label, oldest first
    pub history: BTreeMap<String, Vec<Candle>>,
    /// Account equity at evaluation time
    pub equity: f64,
    /// Reference price at evaluation time
    pub price: f64,
}

impl MarketContext {
    pub fn bars(&self, timeframe: &str) -> &[Candle] {
        self.history
            .get(timeframe)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One trade recommendation
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub side: Side,
    /// Take-profit override in pips; session default applies when `None`
    pub tp_pips: Option<f64>,
    /// Stop-loss override in pips; session default applies when `None`
    pub sl_pips: Option<f64>,
    pub comment: Option<String>,
}

pub trait Strategy: Send + Sync {
    /// Display name, also the registry key.
    fn name(&self) -> &str;

    /// Bars needed per timeframe before this strategy may evaluate.
    fn required_bars(&self) -> BTreeMap<String, usize>;

    /// Evaluate one tick. `None` means no trade.
    fn decide(&self, symbol: &str, ctx: &MarketContext) -> Option<Signal>;
}

/// Registry keys, in display order.
pub const STRATEGY_NAMES: [&str; 5] =
    ["Safe", "Moderate", "Aggressive", "Momentum", "Mean Reversion"];

/// Look up a profile by its exact display name.
pub fn create(name: &str) -> Result<Box<dyn Strategy>> {
    match name {
        "Safe" => Ok(Box::new(SafeStrategy)),
        "Moderate" => Ok(Box::new(ModerateStrategy)),
        "Aggressive" => Ok(Box::new(AggressiveStrategy)),
        "Momentum" => Ok(Box::new(MomentumStrategy)),
        "Mean Reversion" => Ok(Box::new(MeanReversionStrategy)),
        other => bail!("Unknown strategy: {}", other),
    }
}

fn recent_closes(bars: &[Candle], n: usize) -> Option<Vec<f64>> {
    if bars.len() < n {
        return None;
    }
    Some(bars[bars.len() - n..].iter().map(|b| b.close).collect())
}

fn strictly_rising(closes: &[f64]) -> bool {
    closes.windows(2).all(|w| w[1] > w[0])
}

fn strictly_falling(closes: &[f64]) -> bool {
    closes.windows(2).all(|w| w[1] < w[0])
}

/// Trades only on a three-bar run confirmed by the live price, with tight
/// bracket distances.
pub struct SafeStrategy;

impl Strategy for SafeStrategy {
    fn name(&self) -> &str {
        "Safe"
    }

    fn required_bars(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([("1m".to_string(), 30), ("15s".to_string(), 20)])
    }

    fn decide(&self, _symbol: &str, ctx: &MarketContext) -> Option<Signal> {
        let closes = recent_closes(ctx.bars("1m"), 4)?;
        let last = closes[closes.len() - 1];

        if strictly_rising(&closes) && ctx.price > last {
            return Some(Signal {
                side: Side::Buy,
                tp_pips: Some(6.0),
                sl_pips: Some(3.0),
                comment: Some("three rising closes".to_string()),
            });
        }
        if strictly_falling(&closes) && ctx.price < last {
            return Some(Signal {
                side: Side::Sell,
                tp_pips: Some(6.0),
                sl_pips: Some(3.0),
                comment: Some("three falling closes".to_string()),
            });
        }
        None
    }
}

/// Two-bar run entry, rides the session's default bracket distances.
pub struct ModerateStrategy;

impl Strategy for ModerateStrategy {
    fn name(&self) -> &str {
        "Moderate"
    }

    fn required_bars(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([("1m".to_string(), 20), ("15s".to_string(), 10)])
    }

    fn decide(&self, _symbol: &str, ctx: &MarketContext) -> Option<Signal> {
        let closes = recent_closes(ctx.bars("1m"), 3)?;
        let last = closes[closes.len() - 1];

        if strictly_rising(&closes) && ctx.price > last {
            return Some(Signal {
                side: Side::Buy,
                tp_pips: None,
                sl_pips: None,
                comment: None,
            });
        }
        if strictly_falling(&closes) && ctx.price < last {
            return Some(Signal {
                side: Side::Sell,
                tp_pips: None,
                sl_pips: None,
                comment: None,
            });
        }
        None
    }
}

/// Follows every 15s close-to-close move with wide brackets.
pub struct AggressiveStrategy;

impl Strategy for AggressiveStrategy {
    fn name(&self) -> &str {
        "Aggressive"
    }

    fn required_bars(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([("15s".to_string(), 10)])
    }

    fn decide(&self, _symbol: &str, ctx: &MarketContext) -> Option<Signal> {
        let closes = recent_closes(ctx.bars("15s"), 2)?;

        let side = if closes[1] > closes[0] {
            Side::Buy
        } else if closes[1] < closes[0] {
            Side::Sell
        } else {
            return None;
        };

        Some(Signal {
            side,
            tp_pips: Some(12.0),
            sl_pips: Some(8.0),
            comment: Some("15s tick momentum".to_string()),
        })
    }
}

/// Ten-bar displacement on the minute chart; overrides the stop only.
pub struct MomentumStrategy;

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        "Momentum"
    }

    fn required_bars(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([("1m".to_string(), 30)])
    }

    fn decide(&self, _symbol: &str, ctx: &MarketContext) -> Option<Signal> {
        let bars = ctx.bars("1m");
        if bars.len() < 11 {
            return None;
        }
        let anchor = bars[bars.len() - 11].close;

        let side = if ctx.price > anchor {
            Side::Buy
        } else if ctx.price < anchor {
            Side::Sell
        } else {
            return None;
        };

        Some(Signal {
            side,
            tp_pips: None,
            sl_pips: Some(4.0),
            comment: Some("10-bar momentum".to_string()),
        })
    }
}

/// Fades price stretched away from the 14-bar mean close.
pub struct MeanReversionStrategy;

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "Mean Reversion"
    }

    fn required_bars(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([("1m".to_string(), 20)])
    }

    fn decide(&self, _symbol: &str, ctx: &MarketContext) -> Option<Signal> {
        let closes = recent_closes(ctx.bars("1m"), 14)?;
        let mean = closes.iter().sum::<f64>() / closes.len() as f64;
        let band = mean * 0.0003;

        let side = if ctx.price < mean - band {
            Side::Buy
        } else if ctx.price > mean + band {
            Side::Sell
        } else {
            return None;
        };

        Some(Signal {
            side,
            tp_pips: Some(5.0),
            sl_pips: Some(5.0),
            comment: Some("stretched from 14-bar mean".to_string()),
        })
    }
}
