//! Sampling and notification pipeline.
//!
//! While a peer is connected the pipeline reads the sensor, stamps a frame,
//! sends it if streaming is armed, advances the timestamp and sleeps for the
//! sampling interval. The connection is re-checked at the top of every
//! cycle, and the sleep is cut short by any link-state change.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use imunode_types::SampleFrame;

use crate::error::{Error, Result};
use crate::events::NodeEvent;
use crate::session::{Session, Stamp};
use crate::traits::{SensorDriver, Transport};

/// What happened to a cycle's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport.
    Sent,
    /// Streaming not armed yet; nothing was sent.
    NotArmed,
    /// The transport refused the notification.
    Failed,
    /// A resync, disconnect or deep sleep overtook the frame; it was
    /// dropped.
    Superseded,
}

/// Result of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cycle {
    /// No peer connected. The sensor was not read.
    Offline,
    /// A frame was built and the timestamp advanced.
    Completed {
        frame: SampleFrame,
        delivery: Delivery,
        interval_ms: u16,
    },
}

impl Cycle {
    /// Delay before the next cycle, `None` when offline.
    pub fn next_in(&self) -> Option<Duration> {
        match self {
            Cycle::Offline => None,
            Cycle::Completed { interval_ms, .. } => {
                Some(Duration::from_millis(u64::from(*interval_ms)))
            }
        }
    }
}

/// Steady-state sampling loop of a connected node.
pub struct SamplingPipeline<S, T> {
    session: Arc<Session>,
    sensor: Arc<S>,
    transport: Arc<T>,
}

impl<S, T> SamplingPipeline<S, T>
where
    S: SensorDriver,
    T: Transport,
{
    /// Create a pipeline over the shared session.
    pub fn new(session: Arc<Session>, sensor: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            session,
            sensor,
            transport,
        }
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// A sensor read failure is returned as-is and is fatal for the run.
    /// Transport failures are logged and reported as [`Delivery::Failed`].
    pub async fn run_cycle(&self) -> Result<Cycle> {
        if !self.session.is_connected() {
            return Ok(Cycle::Offline);
        }

        let axes = self.sensor.read_sample().await?;

        // The peer may have left while the sensor was being read.
        let Some(stamp) = self.session.stamp(axes) else {
            return Ok(Cycle::Offline);
        };

        let delivery = self.dispatch(&stamp).await;
        self.session.advance(&stamp);

        Ok(Cycle::Completed {
            frame: stamp.frame,
            delivery,
            interval_ms: stamp.interval_ms,
        })
    }

    /// Cycle until the peer disconnects or the node sleeps.
    ///
    /// # Errors
    ///
    /// Returns the sensor error that ended the run, or [`Error::Cancelled`]
    /// if `cancel` fired.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let mut link = self.session.watch_link();

        loop {
            link.borrow_and_update();
            let Some(delay) = self.run_cycle().await?.next_in() else {
                debug!("Sampling loop leaving: not connected");
                return Ok(());
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
                changed = link.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn dispatch(&self, stamp: &Stamp) -> Delivery {
        let Some(peer) = stamp.deliver_to else {
            return Delivery::NotArmed;
        };
        if !self.session.is_current(stamp) {
            debug!("Dropping frame t={}ms: session moved on", stamp.frame.timestamp_ms);
            return Delivery::Superseded;
        }
        let frame = &stamp.frame;

        let payload = Bytes::copy_from_slice(&frame.to_bytes());
        match self.transport.notify(peer, payload).await {
            Ok(()) => {
                debug!("Sent frame t={}ms to {}", frame.timestamp_ms, peer);
                self.session.events().send(NodeEvent::FrameSent {
                    timestamp_ms: frame.timestamp_ms,
                });
                Delivery::Sent
            }
            Err(e) => {
                warn!("Notify failed for frame t={}ms: {}", frame.timestamp_ms, e);
                self.session.events().send(NodeEvent::SendFailed {
                    timestamp_ms: frame.timestamp_ms,
                    error: e.to_string(),
                });
                Delivery::Failed
            }
        }
    }
}
