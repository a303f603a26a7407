//! Node event system.
//!
//! The session, the command handler and the sampling pipeline publish
//! [`NodeEvent`]s so that logs, the simulator and tests can observe the node
//! without touching its state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::link::PeerHandle;
use crate::session::SleepCause;

/// Events that can be emitted by a node.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum NodeEvent {
    /// Advertising was (re)started.
    Advertising,
    /// A peer connected or subscribed.
    Connected { peer: PeerHandle },
    /// A connection attempt failed.
    ConnectFailed { peer: PeerHandle },
    /// The peer went away; streaming is disarmed.
    Disconnected,
    /// Timestamp re-zeroed and streaming armed.
    Resynced,
    /// Sampling interval changed.
    IntervalChanged { interval_ms: u16 },
    /// An inbound write was dropped.
    CommandIgnored { reason: String },
    /// A frame notification was handed to the transport.
    FrameSent { timestamp_ms: u32 },
    /// The transport refused a frame; sampling continues.
    SendFailed { timestamp_ms: u32, error: String },
    /// The node entered deep sleep. Nothing follows this event.
    DeepSleep { cause: SleepCause },
}

/// Sender for node events.
pub type EventSender = broadcast::Sender<NodeEvent>;

/// Receiver for node events.
pub type EventReceiver = broadcast::Receiver<NodeEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: NodeEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&NodeEvent::IntervalChanged { interval_ms: 100 }).unwrap();
        assert_eq!(json, r#"{"type":"interval_changed","interval_ms":100}"#);

        let json = serde_json::to_string(&NodeEvent::DeepSleep {
            cause: SleepCause::Inactivity,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"deep_sleep\""));
        assert!(json.contains("inactivity"));
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();

        dispatcher.send(NodeEvent::Resynced);
        assert_eq!(a.recv().await.unwrap(), NodeEvent::Resynced);
        assert_eq!(b.recv().await.unwrap(), NodeEvent::Resynced);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(NodeEvent::Disconnected);

        let mut late = dispatcher.subscribe();
        dispatcher.send(NodeEvent::Advertising);
        assert_eq!(late.recv().await.unwrap(), NodeEvent::Advertising);
    }
}
