//! Core runtime for an IMU BLE sensor node.
//!
//! This crate implements everything between the sensor driver and the
//! wireless host stack of a battery-powered inertial sensor node: the
//! connectivity/session state machine, the 4-byte command protocol, the
//! sample-and-notify pipeline and the inactivity power-down policy.
//!
//! # Features
//!
//! - **Session state machine**: advertising, connected and a terminal deep
//!   sleep state, shared safely between the link-event context and the
//!   sampling loop
//! - **Command protocol**: resync, set sampling interval, deep sleep;
//!   malformed or unknown writes are ignored
//! - **Sampling pipeline**: frames are only sent after a resync, inside a
//!   live connection, with timestamps advancing by the sampling interval
//! - **Power policy**: blink while advertising, sleep after 600 idle ticks
//! - **Gateway helpers**: align frames from several nodes by timestamp
//! - **Mocks**: in-memory sensor, transport and LED for tests
//!
//! # Architecture
//!
//! ```text
//!  host stack ──LinkSender──► LinkHandler ──► Session ◄── SamplingPipeline ──► Transport::notify
//!                                 │              ▲
//!                          CommandHandler   PowerPolicy ──► Indicator
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use imunode_core::{link_channel, MockIndicator, MockTransport, Node, NodeConfig, SimulatedImu};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::new(
//!         NodeConfig::default(),
//!         Arc::new(SimulatedImu::default()),
//!         Arc::new(MockTransport::new()),
//!         Arc::new(MockIndicator::new()),
//!     )?;
//!
//!     // Hand `link` to the transport adapter; it reports connects,
//!     // disconnects, subscriptions and command writes through it.
//!     let (link, events) = link_channel();
//!     # drop(link);
//!
//!     let cause = node.run(events).await?;
//!     println!("Deep sleep: {cause}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod link;
pub mod mock;
pub mod node;
pub mod pipeline;
pub mod power;
pub mod protocol;
pub mod sensor;
pub mod session;
pub mod traits;

// Core exports
pub use config::NodeConfig;
pub use error::{Error, Result};
pub use node::Node;
pub use session::{LinkState, Session, SessionState, SleepCause, Stamp, Transition};
pub use traits::{Indicator, SensorDriver, Transport};

/// Type alias for a shared session reference.
///
/// The link handler, the pipeline and the power policy each hold one.
pub type SharedSession = std::sync::Arc<Session>;

pub use events::{EventDispatcher, EventReceiver, EventSender, NodeEvent};
pub use gateway::{AlignedRow, FrameAligner};
pub use link::{Flow, LinkEvent, LinkEvents, LinkHandler, LinkSender, PeerHandle, link_channel};
pub use mock::{MockIndicator, MockSensor, MockTransport};
pub use pipeline::{Cycle, Delivery, SamplingPipeline};
pub use power::{AdvertiseOutcome, PowerPolicy};
pub use protocol::{Applied, CommandHandler};
pub use sensor::{RawSample, SelfTestSensor, SimulatedImu};

// Re-export from imunode-types
pub use imunode_types::uuid as uuids;
pub use imunode_types::{Command, CommandKind, ParseError, SampleFrame};
