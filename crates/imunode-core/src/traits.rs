//! Trait abstractions for the node's external collaborators.
//!
//! The sensor register driver, the wireless host stack and the status LED
//! live outside this crate. The node only talks to them through these
//! traits, so the same core runs against real hardware, the simulator, and
//! the mocks in [`crate::mock`].

use async_trait::async_trait;
use bytes::Bytes;

use imunode_types::AXIS_COUNT;

use crate::error::Result;
use crate::link::PeerHandle;

/// Source of scaled inertial samples.
///
/// # Example
///
/// ```ignore
/// use imunode_core::{SensorDriver, Result};
///
/// async fn print_sample<S: SensorDriver>(sensor: &S) -> Result<()> {
///     let [ax, ay, az, ..] = sensor.read_sample().await?;
///     println!("acc = ({ax}, {ay}, {az}) g");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SensorDriver: Send + Sync {
    /// Bring the sensor up. A failure here aborts node startup.
    ///
    /// The default implementation returns `Ok(())` for sensors with no
    /// setup step.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Read one sample: accel X/Y/Z in g, then gyro X/Y/Z in deg/s.
    async fn read_sample(&self) -> Result<[f32; AXIS_COUNT]>;

    /// Release the sensor bus.
    async fn deinit(&self) {}
}

/// Wireless transport as seen by the node.
///
/// Inbound traffic (connect, disconnect, subscribe, command writes) does not
/// go through this trait; the adapter pushes it into a
/// [`LinkSender`](crate::link::LinkSender) from its own execution context.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start (or restart) advertising. The link layer does not resume
    /// advertising on its own after a failed connect or a disconnect.
    async fn start_advertising(&self) -> Result<()>;

    /// Push a notification to `peer` on the notify endpoint.
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) when no
    /// peer is subscribed. Any error here is logged and the frame dropped.
    async fn notify(&self, peer: PeerHandle, payload: Bytes) -> Result<()>;
}

/// Connectivity LED.
pub trait Indicator: Send + Sync {
    /// Drive the LED. Off while connected, blinking while advertising.
    fn set_connectivity_led(&self, on: bool);
}
