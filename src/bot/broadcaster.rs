use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::OpportunityEvent;

/// Messages delivered to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StreamEvent {
    #[serde(rename = "spot-arb")]
    Opportunity(OpportunityEvent),
    /// The whole ranked list of one cycle, possibly empty.
    #[serde(rename = "top_20_data")]
    Batch(Vec<OpportunityEvent>),
}

/// At-most-once fan-out. Publishing never waits: with no subscribers the
/// event is dropped, and a slow subscriber loses the oldest events instead of
/// holding up the sender.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<StreamEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: StreamEvent) -> usize {
        // An error only means nobody is listening right now.
        self.sender.send(event).unwrap_or(0)
    }

    /// One event per opportunity followed by the batch. Returns how many
    /// subscribers were attached.
    pub fn publish_cycle(&self, events: Vec<OpportunityEvent>) -> usize {
        for event in &events {
            self.publish(StreamEvent::Opportunity(event.clone()));
        }
        let delivered = self.publish(StreamEvent::Batch(events));
        debug!("Cycle published to {} subscribers", delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExchangePrice, MaxSideFees, MinSideFees, Opportunity, Symbol};
    use bigdecimal::BigDecimal;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn create_test_event(base: &str) -> OpportunityEvent {
        let opportunity = Opportunity::new(
            &Symbol::new(base, "USDT"),
            ExchangePrice { id: "a".into(), name: "A".into(), price: BigDecimal::from(100) },
            ExchangePrice { id: "b".into(), name: "B".into(), price: BigDecimal::from(102) },
            BigDecimal::from(2),
            MinSideFees::default(),
            MaxSideFees::default(),
        );
        OpportunityEvent::from(&opportunity)
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let broadcaster = Broadcaster::new(4);
        assert_eq!(broadcaster.publish_cycle(vec![create_test_event("X")]), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events_then_batch() {
        let broadcaster = Broadcaster::new(16);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish_cycle(vec![create_test_event("X"), create_test_event("Y")]);

        for receiver in [&mut first, &mut second] {
            assert!(matches!(receiver.recv().await.unwrap(), StreamEvent::Opportunity(e) if e.symbol == "X/USDT"));
            assert!(matches!(receiver.recv().await.unwrap(), StreamEvent::Opportunity(e) if e.symbol == "Y/USDT"));
            assert!(matches!(receiver.recv().await.unwrap(), StreamEvent::Batch(batch) if batch.len() == 2));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_cycles() {
        let broadcaster = Broadcaster::new(16);
        let _early = broadcaster.subscribe();
        broadcaster.publish_cycle(vec![create_test_event("X")]);

        let mut late = broadcaster.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.subscribe();

        for base in ["A", "B", "C", "D", "E"] {
            broadcaster.publish(StreamEvent::Opportunity(create_test_event(base)));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(_))));
        assert!(matches!(slow.recv().await.unwrap(), StreamEvent::Opportunity(e) if e.symbol == "D/USDT"));
    }

    #[test]
    fn test_wire_tags() {
        let json = serde_json::to_value(StreamEvent::Batch(Vec::new())).unwrap();
        assert_eq!(json["event"], "top_20_data");
        assert!(json["data"].as_array().unwrap().is_empty());

        let json = serde_json::to_value(StreamEvent::Opportunity(create_test_event("X"))).unwrap();
        assert_eq!(json["event"], "spot-arb");
        assert_eq!(json["data"]["percentage_difference"], "2.00%");
    }
}
