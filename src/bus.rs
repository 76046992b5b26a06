//! Event bus carrying worker results to the single consumer
//!
//! Background workers (connection coordinator, session loop, advisory
//! requester) publish typed messages here; one owning consumer drains the
//! queue on a fixed tick. Workers never call the consumer directly.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::advisor::AiAdvice;
use crate::session::{ConnectionState, SymbolReadiness};
use crate::types::{AccountSnapshot, PositionView, TradeIntent};

/// Default queue capacity, generous enough that overflow means the consumer
/// has stalled rather than fallen slightly behind.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Messages delivered from background workers to the consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusMessage {
    /// Fresh account snapshot from the coordinator
    AccountUpdate(AccountSnapshot),
    /// Open positions keyed by broker ticket id
    PositionsUpdate { positions: BTreeMap<u64, PositionView> },
    /// Connection state machine moved
    ConnectionChanged { state: ConnectionState },
    /// Symbol names available for trading, published once on connect
    SymbolCatalog { symbols: Vec<String> },
    /// Bar-data readiness for the active strategy/symbol pair
    ReadinessUpdate(SymbolReadiness),
    /// Advisory call succeeded
    AdvisoryResult(AiAdvice),
    /// Advisory call failed or could not be attempted
    AdvisoryError { message: String },
    /// Advisory worker finished; the trigger may be re-armed
    AdvisoryIdle,
    /// Timestamped free-form status line
    LogLine { message: String },
    /// Strategy signal handed to execution, mirrored for the consumer
    TradeIntent(TradeIntent),
}

impl BusMessage {
    /// Critical messages survive overflow; everything else may be dropped.
    pub fn is_critical(&self) -> bool {
        matches!(self, BusMessage::TradeIntent(_))
    }
}

/// Bounded multi-producer/single-consumer message queue
///
/// `publish` never blocks a producer on the consumer and never fails. The
/// queue is globally FIFO, so each producer's messages keep their relative
/// order. On overflow the oldest non-critical message is dropped; a critical
/// message is always enqueued, letting the queue exceed its bound briefly
/// rather than lose it.
#[derive(Clone)]
pub struct EventBus {
    queue: Arc<Mutex<VecDeque<BusMessage>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Enqueue a message from any producer.
    pub async fn publish(&self, msg: BusMessage) {
        let mut queue = self.queue.lock().await;

        if queue.len() >= self.capacity {
            if let Some(idx) = queue.iter().position(|m| !m.is_critical()) {
                queue.remove(idx);
                warn!("Event bus full, dropped oldest non-critical message");
            } else if !msg.is_critical() {
                warn!("Event bus full of critical messages, dropped incoming message");
                return;
            } else {
                warn!("Event bus exceeding capacity to hold critical message");
            }
        }

        queue.push_back(msg);
    }

    /// Shorthand for publishing a log line.
    pub async fn log(&self, message: impl Into<String>) {
        self.publish(BusMessage::LogLine {
            message: message.into(),
        })
        .await;
    }

    /// Take every queued message, in arrival order. Consumer-only.
    pub async fn drain(&self) -> Vec<BusMessage> {
        let mut queue = self.queue.lock().await;
        queue.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn log_msg(text: &str) -> BusMessage {
        BusMessage::LogLine {
            message: text.to_string(),
        }
    }

    fn intent_msg(comment: &str) -> BusMessage {
        let mut intent = TradeIntent::new(Side::Buy, "EURUSD", Some(1.1000), 0.01);
        intent.strategy_comment = comment.to_string();
        BusMessage::TradeIntent(intent)
    }

    #[tokio::test]
    async fn drain_preserves_arrival_order() {
        let bus = EventBus::new(16);
        bus.publish(log_msg("first")).await;
        bus.publish(log_msg("second")).await;
        bus.publish(log_msg("third")).await;

        let drained = bus.drain().await;
        let texts: Vec<_> = drained
            .iter()
            .map(|m| match m {
                BusMessage::LogLine { message } => message.clone(),
                other => panic!("unexpected message: {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(bus.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn per_producer_order_survives_concurrency() {
        let bus = EventBus::new(4096);

        let mut handles = Vec::new();
        for producer in ["a", "b", "c"] {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    bus.publish(log_msg(&format!("{}-{}", producer, i))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let drained = bus.drain().await;
        assert_eq!(drained.len(), 600);

        for producer in ["a", "b", "c"] {
            let prefix = format!("{}-", producer);
            let seen: Vec<usize> = drained
                .iter()
                .filter_map(|m| match m {
                    BusMessage::LogLine { message } if message.starts_with(&prefix) => {
                        message[prefix.len()..].parse().ok()
                    }
                    _ => None,
                })
                .collect();
            let expected: Vec<usize> = (0..200).collect();
            assert_eq!(seen, expected, "producer {} reordered", producer);
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_non_critical() {
        let bus = EventBus::new(3);
        bus.publish(log_msg("old")).await;
        bus.publish(log_msg("mid")).await;
        bus.publish(log_msg("new")).await;
        bus.publish(log_msg("overflow")).await;

        let drained = bus.drain().await;
        assert_eq!(drained.len(), 3);
        match &drained[0] {
            BusMessage::LogLine { message } => assert_eq!(message, "mid"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn trade_intents_survive_overflow() {
        let bus = EventBus::new(2);
        bus.publish(intent_msg("one")).await;
        bus.publish(intent_msg("two")).await;

        // Non-critical arrival against a full all-critical queue is dropped.
        bus.publish(log_msg("noise")).await;
        assert_eq!(bus.len().await, 2);

        // A critical arrival is held even past the bound.
        bus.publish(intent_msg("three")).await;
        let drained = bus.drain().await;
        assert_eq!(drained.len(), 3);
        assert!(drained.iter().all(|m| m.is_critical()));
    }

    #[tokio::test]
    async fn overflow_prefers_dropping_non_critical_over_critical() {
        let bus = EventBus::new(3);
        bus.publish(intent_msg("keep")).await;
        bus.publish(log_msg("droppable")).await;
        bus.publish(intent_msg("keep-too")).await;
        bus.publish(log_msg("incoming")).await;

        let drained = bus.drain().await;
        assert_eq!(drained.len(), 3);
        let criticals = drained.iter().filter(|m| m.is_critical()).count();
        assert_eq!(criticals, 2);
        match &drained[2] {
            BusMessage::LogLine { message } => assert_eq!(message, "incoming"),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
