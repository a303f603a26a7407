//! Link-event context.
//!
//! The host stack reports connects, disconnects, subscriptions and command
//! writes from its own execution context. The adapter pushes them into a
//! [`LinkSender`]; the node drains the matching [`LinkEvents`] stream in a
//! dedicated task through [`LinkHandler`], which applies each event to the
//! [`Session`] to completion before taking the next one.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::NodeEvent;
use crate::protocol::{Applied, CommandHandler};
use crate::session::{Session, Transition};
use crate::traits::{Indicator, Transport};

/// Transport-assigned connection handle used to address notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(pub u16);

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Events delivered by the host stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection attempt finished.
    Connect { peer: PeerHandle, ok: bool },
    /// The peer disconnected.
    Disconnect,
    /// The peer subscribed to notifications.
    Subscribe { peer: PeerHandle },
    /// The peer wrote to the command endpoint.
    Write(Bytes),
    /// An advertising window ended without a connection.
    AdvertisingComplete,
}

/// Create a link event channel.
///
/// The channel is unbounded because host-stack callbacks cannot wait.
pub fn link_channel() -> (LinkSender, LinkEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LinkSender { tx }, LinkEvents { rx })
}

/// Handle the transport adapter uses to report link activity.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkSender {
    /// Deliver an event. Returns `false` once the node has stopped.
    pub fn send(&self, event: LinkEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Report a successful connection.
    pub fn connected(&self, peer: PeerHandle) -> bool {
        self.send(LinkEvent::Connect { peer, ok: true })
    }

    /// Report a failed connection attempt.
    pub fn connect_failed(&self, peer: PeerHandle) -> bool {
        self.send(LinkEvent::Connect { peer, ok: false })
    }

    /// Report a disconnect.
    pub fn disconnected(&self) -> bool {
        self.send(LinkEvent::Disconnect)
    }

    /// Report a notification subscription.
    pub fn subscribed(&self, peer: PeerHandle) -> bool {
        self.send(LinkEvent::Subscribe { peer })
    }

    /// Report a write to the command endpoint.
    pub fn write(&self, payload: impl Into<Bytes>) -> bool {
        self.send(LinkEvent::Write(payload.into()))
    }

    /// Whether the node side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Stream of link events consumed by the node.
pub struct LinkEvents {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Stream for LinkEvents {
    type Item = LinkEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Whether the handler keeps accepting events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep draining events.
    Continue,
    /// The node is asleep; drop everything that follows.
    Stop,
}

/// Applies link events to the session and performs their side effects.
pub struct LinkHandler<T, I> {
    session: Arc<Session>,
    commands: CommandHandler,
    transport: Arc<T>,
    indicator: Arc<I>,
}

impl<T, I> LinkHandler<T, I>
where
    T: Transport + 'static,
    I: Indicator + 'static,
{
    /// Create a handler bound to `session`.
    pub fn new(session: Arc<Session>, transport: Arc<T>, indicator: Arc<I>) -> Self {
        Self {
            commands: CommandHandler::new(Arc::clone(&session)),
            session,
            transport,
            indicator,
        }
    }

    /// Drain `events` until the stream ends, the node sleeps, or `cancel`
    /// fires.
    pub async fn run<E>(self, mut events: E, cancel: CancellationToken)
    where
        E: Stream<Item = LinkEvent> + Unpin,
    {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Link handler cancelled");
                    break;
                }
                event = events.next() => {
                    let Some(event) = event else {
                        debug!("Link event stream closed");
                        break;
                    };
                    if self.dispatch(event).await == Flow::Stop {
                        break;
                    }
                }
            }
        }
    }

    /// Apply a single event.
    pub async fn dispatch(&self, event: LinkEvent) -> Flow {
        if self.session.is_asleep() {
            return Flow::Stop;
        }

        match event {
            LinkEvent::Connect { peer, ok: true } => {
                info!("Link connect from {}", peer);
                self.on_transition(self.session.on_connect(peer));
            }
            LinkEvent::Connect { peer, ok: false } => {
                warn!("Link connect from {} failed, re-advertising", peer);
                self.session.events().send(NodeEvent::ConnectFailed { peer });
                self.advertise().await;
            }
            LinkEvent::Subscribe { peer } => {
                info!("Peer {} subscribed to notifications", peer);
                self.on_transition(self.session.on_connect(peer));
            }
            LinkEvent::Disconnect => {
                info!("Link disconnected, re-advertising");
                self.on_transition(self.session.on_disconnect());
                self.advertise().await;
            }
            LinkEvent::AdvertisingComplete => {
                debug!("Advertising window complete, restarting");
                self.advertise().await;
            }
            LinkEvent::Write(payload) => {
                if self.commands.apply(&payload) == Applied::DeepSleep {
                    return Flow::Stop;
                }
            }
        }

        Flow::Continue
    }

    fn on_transition(&self, transition: Transition) {
        match transition {
            Transition::Connected => self.indicator.set_connectivity_led(false),
            Transition::Disconnected => self.indicator.set_connectivity_led(true),
            Transition::Unchanged => {}
        }
    }

    async fn advertise(&self) {
        match self.transport.start_advertising().await {
            Ok(()) => self.session.events().send(NodeEvent::Advertising),
            Err(e) => warn!("Failed to restart advertising: {}", e),
        }
    }
}
