//! Advisory collaborator contracts
//!
//! The advisory requester gathers a feature snapshot through an `Analyzer`
//! and asks the `Advisor` for one non-binding opinion. Both live outside the
//! core: indicator math and the advisory transport are collaborator
//! territory, so the paper implementations here are stand-ins for the demo
//! binary.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Indicator snapshot handed to the advisor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiFeatures {
    pub price_bid: f64,
    /// 9-period EMA of 1m closes
    pub ema_fast: f64,
    /// 21-period EMA of 1m closes
    pub ema_slow: f64,
    /// 14-period RSI
    pub rsi: f64,
    /// 14-period ATR
    pub atr: f64,
    pub spread_pips: f64,
}

/// What the session would do on its own, for the advisor to critique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    /// "buy", "sell" or "n/a" when no signal is pending
    pub side: String,
    pub sl_pips: f64,
    pub tp_pips: f64,
}

impl TradeProposal {
    /// Proposal with no pending signal, echoing the session bracket.
    pub fn neutral(sl_pips: f64, tp_pips: f64) -> Self {
        Self {
            side: "n/a".to_string(),
            sl_pips,
            tp_pips,
        }
    }
}

/// One advisory opinion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAdvice {
    /// Suggested action, e.g. "buy", "sell", "hold"
    pub action: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reason: String,
}

/// External advisory service
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Single advisory call. Any failure surfaces as `Err`; the caller never
    /// retries automatically.
    async fn advise(
        &self,
        symbol: &str,
        bias: &str,
        features: &AiFeatures,
        proposal: &TradeProposal,
    ) -> Result<AiAdvice>;
}

/// Indicator computation over fetched market data
pub trait Analyzer: Send + Sync {
    fn features(&self, price: f64, bars_1m: &[Candle]) -> Result<AiFeatures>;
}

fn trailing_mean(values: &[f64], n: usize) -> f64 {
    let take = values.len().min(n);
    if take == 0 {
        return 0.0;
    }
    let slice = &values[values.len() - take..];
    slice.iter().sum::<f64>() / take as f64
}

/// Flat-footed analyzer: plain means where real implementations run EMAs,
/// a neutral RSI, bar ranges for ATR.
pub struct PaperAnalyzer;

impl Analyzer for PaperAnalyzer {
    fn features(&self, price: f64, bars_1m: &[Candle]) -> Result<AiFeatures> {
        let closes: Vec<f64> = bars_1m.iter().map(|b| b.close).collect();
        let ranges: Vec<f64> = bars_1m.iter().map(|b| b.high - b.low).collect();
        let ema_fast = trailing_mean(&closes, 9);
        let ema_slow = trailing_mean(&closes, 21);
        let atr = trailing_mean(&ranges, 14);

        Ok(AiFeatures {
            price_bid: price,
            ema_fast,
            ema_slow,
            rsi: 50.0,
            atr,
            spread_pips: 0.0,
        })
    }
}

/// Canned advisor for the demo binary: sides with the faster mean, with a
/// made-up confidence.
pub struct PaperAdvisor;

#[async_trait]
impl Advisor for PaperAdvisor {
    async fn advise(
        &self,
        symbol: &str,
        bias: &str,
        features: &AiFeatures,
        proposal: &TradeProposal,
    ) -> Result<AiAdvice> {
        let action = if features.ema_fast >= features.ema_slow {
            "buy"
        } else {
            "sell"
        };
        let confidence = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0.55..0.90)
        };

        Ok(AiAdvice {
            action: action.to_string(),
            confidence,
            reason: format!(
                "{} {} bias: fast {:.5} vs slow {:.5}, proposal {} ({}sl/{}tp)",
                symbol,
                bias,
                features.ema_fast,
                features.ema_slow,
                proposal.side,
                proposal.sl_pips,
                proposal.tp_pips
            ),
        })
    }
}
