//! In-process link between simulated nodes and the virtual gateway.
//!
//! [`loopback`] returns the two ends of one radio link: a
//! [`LoopbackTransport`] the node sends notifications through, and a
//! [`GatewayLink`] the gateway uses to connect, subscribe and write
//! commands. Notifications from every node are funnelled into one
//! [`Uplink`] channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use imunode_core::{
    Command, Error, Indicator, LinkEvents, LinkSender, PeerHandle, Result, Transport, link_channel,
};

/// A notification as received by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Node the notification came from.
    pub device_id: u8,
    /// Raw notify payload.
    pub payload: Bytes,
}

/// Gateway side of all notify endpoints.
pub type Uplink = mpsc::UnboundedReceiver<Notification>;

/// Create the shared notification channel.
pub fn uplink() -> (mpsc::UnboundedSender<Notification>, Uplink) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Default)]
struct Subscription {
    subscriber: Option<PeerHandle>,
}

/// Node side of a loopback link.
#[derive(Debug)]
pub struct LoopbackTransport {
    device_id: u8,
    state: Arc<Mutex<Subscription>>,
    uplink: mpsc::UnboundedSender<Notification>,
    advertise_count: AtomicU32,
}

impl LoopbackTransport {
    /// Number of advertising (re)starts.
    pub fn advertise_count(&self) -> u32 {
        self.advertise_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn start_advertising(&self) -> Result<()> {
        let n = self.advertise_count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("[{}] advertising (#{})", char::from(self.device_id), n);
        Ok(())
    }

    async fn notify(&self, peer: PeerHandle, payload: Bytes) -> Result<()> {
        let subscriber = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscriber;
        match subscriber {
            None => return Err(Error::NotConnected),
            Some(subscribed) if subscribed != peer => {
                return Err(Error::transport("notify", format!("{} is not subscribed", peer)));
            }
            Some(_) => {}
        }
        self.uplink
            .send(Notification {
                device_id: self.device_id,
                payload,
            })
            .map_err(|_| Error::transport("notify", "gateway closed"))
    }
}

/// Gateway side of a loopback link.
#[derive(Debug, Clone)]
pub struct GatewayLink {
    device_id: u8,
    peer: PeerHandle,
    state: Arc<Mutex<Subscription>>,
    link: LinkSender,
}

impl GatewayLink {
    /// Id of the node at the other end.
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Open the connection.
    pub fn connect(&self) -> bool {
        self.link.connected(self.peer)
    }

    /// Subscribe to notifications.
    pub fn subscribe(&self) -> bool {
        self.lock().subscriber = Some(self.peer);
        self.link.subscribed(self.peer)
    }

    /// Write a command. Returns `false` if the node is gone.
    pub fn write(&self, command: Command) -> bool {
        trace!("-> [{}] {}", char::from(self.device_id), command.classify());
        self.link.write(command.to_bytes().to_vec())
    }

    /// Drop the connection.
    pub fn disconnect(&self) -> bool {
        self.lock().subscriber = None;
        self.link.disconnected()
    }

    /// Whether the node has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscription> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a loopback link for node `device_id`.
///
/// Returns the node's transport, the link events to hand to
/// [`Node::run`](imunode_core::Node::run), and the gateway's end.
pub fn loopback(
    device_id: u8,
    peer: PeerHandle,
    uplink: mpsc::UnboundedSender<Notification>,
) -> (Arc<LoopbackTransport>, LinkEvents, GatewayLink) {
    let state = Arc::new(Mutex::new(Subscription::default()));
    let (link, events) = link_channel();
    let transport = Arc::new(LoopbackTransport {
        device_id,
        state: Arc::clone(&state),
        uplink,
        advertise_count: AtomicU32::new(0),
    });
    let gateway = GatewayLink {
        device_id,
        peer,
        state,
        link,
    };
    (transport, events, gateway)
}

/// Connectivity LED that only logs.
#[derive(Debug)]
pub struct LogIndicator {
    device_id: u8,
}

impl LogIndicator {
    pub fn new(device_id: u8) -> Self {
        Self { device_id }
    }
}

impl Indicator for LogIndicator {
    fn set_connectivity_led(&self, on: bool) {
        trace!(
            "[{}] LED {}",
            char::from(self.device_id),
            if on { "on" } else { "off" }
        );
    }
}
