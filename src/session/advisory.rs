//! One-shot advisory requester

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::advisor::{Advisor, Analyzer, TradeProposal};
use crate::broker::Broker;
use crate::bus::{BusMessage, EventBus};

/// Timeframe the feature snapshot is computed from
const FEATURE_TIMEFRAME: &str = "1m";
/// Bars fetched for the snapshot; the analyzer tolerates fewer
const FEATURE_BARS: usize = 50;
/// Directional bias passed to the advisor
const DEFAULT_BIAS: &str = "long";

const MISSING_DATA: &str = "Could not perform analysis: Market data is missing.";
const ADVICE_FAILED: &str = "Failed to get advice from the advisory service.";

/// Fires one advisory request per trigger
///
/// Each request publishes exactly one terminal message (AdvisoryResult or
/// AdvisoryError) and then AdvisoryIdle, so the triggering control can
/// re-arm. Callers must hold off re-triggering until they observe the idle
/// message; the requester itself does not deduplicate.
#[derive(Clone)]
pub struct AdvisoryRequester {
    broker: Arc<dyn Broker>,
    advisor: Arc<dyn Advisor>,
    analyzer: Arc<dyn Analyzer>,
    bus: EventBus,
}

impl AdvisoryRequester {
    pub fn new(
        broker: Arc<dyn Broker>,
        advisor: Arc<dyn Advisor>,
        analyzer: Arc<dyn Analyzer>,
        bus: EventBus,
    ) -> Self {
        Self {
            broker,
            advisor,
            analyzer,
            bus,
        }
    }

    /// Run one request on its own worker. No cancellation path once
    /// dispatched; the worker runs to its terminal message.
    pub fn spawn_request(&self, symbol: &str, proposal: TradeProposal) -> JoinHandle<()> {
        let requester = self.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move { requester.run_request(&symbol, proposal).await })
    }

    pub(crate) async fn run_request(&self, symbol: &str, proposal: TradeProposal) {
        info!(symbol, "Requesting advisory analysis");
        self.bus.log("Requesting advisory analysis...").await;

        let terminal = self.gather_and_advise(symbol, &proposal).await;
        self.bus.publish(terminal).await;
        self.bus.publish(BusMessage::AdvisoryIdle).await;
    }

    async fn gather_and_advise(&self, symbol: &str, proposal: &TradeProposal) -> BusMessage {
        let price = match self.broker.market_price(symbol).await {
            Ok(Some(price)) => price,
            Ok(None) => return Self::advisory_error(MISSING_DATA),
            Err(e) => {
                warn!(symbol, "Price fetch failed: {}", e);
                return Self::advisory_error(MISSING_DATA);
            }
        };

        let bars = match self
            .broker
            .ohlc_history(symbol, FEATURE_TIMEFRAME, FEATURE_BARS)
            .await
        {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => return Self::advisory_error(MISSING_DATA),
            Err(e) => {
                warn!(symbol, "History fetch failed: {}", e);
                return Self::advisory_error(MISSING_DATA);
            }
        };

        let features = match self.analyzer.features(price, &bars) {
            Ok(features) => features,
            Err(e) => {
                warn!(symbol, "Feature extraction failed: {}", e);
                return Self::advisory_error(ADVICE_FAILED);
            }
        };

        match self
            .advisor
            .advise(symbol, DEFAULT_BIAS, &features, proposal)
            .await
        {
            Ok(advice) => BusMessage::AdvisoryResult(advice),
            Err(e) => {
                warn!(symbol, "Advisory call failed: {}", e);
                Self::advisory_error(ADVICE_FAILED)
            }
        }
    }

    fn advisory_error(message: &str) -> BusMessage {
        BusMessage::AdvisoryError {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::advisor::{AiAdvice, AiFeatures, PaperAnalyzer};
    use crate::broker::testkit::ScriptedBroker;
    use crate::types::Candle;

    struct CannedAdvisor {
        fail: bool,
        calls: Mutex<Vec<(String, String, TradeProposal)>>,
    }

    impl CannedAdvisor {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String, TradeProposal)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Advisor for CannedAdvisor {
        async fn advise(
            &self,
            symbol: &str,
            bias: &str,
            _features: &AiFeatures,
            proposal: &TradeProposal,
        ) -> Result<AiAdvice> {
            self.calls
                .lock()
                .unwrap()
                .push((symbol.to_string(), bias.to_string(), proposal.clone()));
            if self.fail {
                bail!("service unavailable");
            }
            Ok(AiAdvice {
                action: "buy".to_string(),
                confidence: 0.7,
                reason: "trend continuation".to_string(),
            })
        }
    }

    fn bars(n: usize) -> Vec<Candle> {
        let start = Utc::now();
        (0..n)
            .map(|i| Candle {
                time: start + ChronoDuration::seconds(60 * i as i64),
                open: 1.1,
                high: 1.2,
                low: 1.0,
                close: 1.1,
                volume: 1.0,
            })
            .collect()
    }

    fn requester(
        broker: ScriptedBroker,
        advisor: Arc<CannedAdvisor>,
    ) -> (AdvisoryRequester, EventBus) {
        let bus = EventBus::default();
        let requester = AdvisoryRequester::new(
            Arc::new(broker),
            advisor,
            Arc::new(PaperAnalyzer),
            bus.clone(),
        );
        (requester, bus)
    }

    fn terminal_count(messages: &[BusMessage]) -> usize {
        messages
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    BusMessage::AdvisoryResult(_) | BusMessage::AdvisoryError { .. }
                )
            })
            .count()
    }

    #[tokio::test]
    async fn success_publishes_result_then_idle() {
        let advisor = Arc::new(CannedAdvisor::new(false));
        let broker = ScriptedBroker::new().with_history("1m", bars(30));
        let (requester, bus) = requester(broker, Arc::clone(&advisor));

        requester
            .run_request("EURUSD", TradeProposal::neutral(5.0, 10.0))
            .await;

        let drained = bus.drain().await;
        assert_eq!(terminal_count(&drained), 1);

        let result_pos = drained
            .iter()
            .position(|m| matches!(m, BusMessage::AdvisoryResult(a) if a.action == "buy"));
        let idle_pos = drained
            .iter()
            .position(|m| matches!(m, BusMessage::AdvisoryIdle));
        assert!(result_pos.is_some());
        assert!(idle_pos.is_some());
        assert!(result_pos < idle_pos);

        // The advisor saw the default bias and the echoed session bracket.
        let calls = advisor.calls();
        assert_eq!(calls.len(), 1);
        let (symbol, bias, proposal) = &calls[0];
        assert_eq!(symbol, "EURUSD");
        assert_eq!(bias, "long");
        assert_eq!(proposal.side, "n/a");
        assert_eq!(proposal.sl_pips, 5.0);
        assert_eq!(proposal.tp_pips, 10.0);
    }

    #[tokio::test]
    async fn missing_price_skips_the_advisor_entirely() {
        let advisor = Arc::new(CannedAdvisor::new(false));
        let broker = ScriptedBroker::new()
            .with_history("1m", bars(30))
            .with_price_sequence(vec![None]);
        let (requester, bus) = requester(broker, Arc::clone(&advisor));

        requester
            .run_request("EURUSD", TradeProposal::neutral(5.0, 10.0))
            .await;

        assert!(advisor.calls().is_empty());
        let drained = bus.drain().await;
        assert_eq!(terminal_count(&drained), 1);
        assert!(drained.iter().any(|m| matches!(
            m,
            BusMessage::AdvisoryError { message }
                if message == "Could not perform analysis: Market data is missing."
        )));
        assert!(drained
            .iter()
            .any(|m| matches!(m, BusMessage::AdvisoryIdle)));
    }

    #[tokio::test]
    async fn empty_history_counts_as_missing_data() {
        let advisor = Arc::new(CannedAdvisor::new(false));
        let (requester, bus) = requester(ScriptedBroker::new(), Arc::clone(&advisor));

        requester
            .run_request("EURUSD", TradeProposal::neutral(5.0, 10.0))
            .await;

        assert!(advisor.calls().is_empty());
        let drained = bus.drain().await;
        assert!(drained.iter().any(|m| matches!(
            m,
            BusMessage::AdvisoryError { message }
                if message == "Could not perform analysis: Market data is missing."
        )));
    }

    #[tokio::test]
    async fn advisor_failure_still_reaches_idle() {
        let advisor = Arc::new(CannedAdvisor::new(true));
        let broker = ScriptedBroker::new().with_history("1m", bars(30));
        let (requester, bus) = requester(broker, Arc::clone(&advisor));

        requester
            .run_request("EURUSD", TradeProposal::neutral(5.0, 10.0))
            .await;

        let drained = bus.drain().await;
        assert_eq!(terminal_count(&drained), 1);

        let error_pos = drained.iter().position(|m| {
            matches!(
                m,
                BusMessage::AdvisoryError { message }
                    if message == "Failed to get advice from the advisory service."
            )
        });
        let idle_pos = drained
            .iter()
            .position(|m| matches!(m, BusMessage::AdvisoryIdle));
        assert!(error_pos.is_some());
        assert!(error_pos < idle_pos);
    }
}
