//! Node runtime.
//!
//! [`Node`] wires the session, the link handler, the power policy and the
//! sampling pipeline together and drives them until the node sleeps.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use imunode_core::{
//!     link_channel, MockIndicator, MockSensor, MockTransport, Node, NodeConfig, SleepCause,
//! };
//! use imunode_types::Command;
//!
//! #[tokio::main]
//! async fn main() -> imunode_core::Result<()> {
//!     let node = Node::new(
//!         NodeConfig::default(),
//!         Arc::new(MockSensor::new()),
//!         Arc::new(MockTransport::new()),
//!         Arc::new(MockIndicator::new()),
//!     )?;
//!     let (link, events) = link_channel();
//!
//!     link.write(Command::deep_sleep().to_bytes().to_vec());
//!     assert_eq!(node.run(events).await?, SleepCause::Command);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::{EventReceiver, NodeEvent};
use crate::link::{LinkEvent, LinkHandler};
use crate::pipeline::SamplingPipeline;
use crate::power::{AdvertiseOutcome, PowerPolicy};
use crate::session::{Session, SleepCause};
use crate::traits::{Indicator, SensorDriver, Transport};

/// A sensor node bound to its collaborators.
pub struct Node<S, T, I> {
    config: NodeConfig,
    session: Arc<Session>,
    sensor: Arc<S>,
    transport: Arc<T>,
    indicator: Arc<I>,
    cancel: CancellationToken,
}

impl<S, T, I> Node<S, T, I>
where
    S: SensorDriver + 'static,
    T: Transport + 'static,
    I: Indicator + 'static,
{
    /// Create a node in the initial advertising state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(config: NodeConfig, sensor: Arc<S>, transport: Arc<T>, indicator: Arc<I>) -> Result<Self> {
        config.validate()?;
        let session = Arc::new(Session::new(config.device_id, config.sampling_interval_ms));
        Ok(Self {
            config,
            session,
            sensor,
            transport,
            indicator,
            cancel: CancellationToken::new(),
        })
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Shared session state.
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Subscribe to node events. Subscribe before calling [`run`](Self::run)
    /// to see startup events.
    pub fn subscribe(&self) -> EventReceiver {
        self.session.subscribe()
    }

    /// Token that tears the node down when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start the node and run it until it enters deep sleep.
    ///
    /// `events` carries link activity from the transport adapter; it is
    /// drained on its own task. The sensor is released before returning,
    /// whatever the outcome. The caller performs the actual platform sleep.
    ///
    /// # Errors
    ///
    /// - [`Error::SensorInit`] / [`Error::TransportInit`] if startup fails
    /// - the sensor error that ended a sampling run
    /// - [`Error::Cancelled`] if the cancellation token fired
    pub async fn run<E>(self, events: E) -> Result<SleepCause>
    where
        E: Stream<Item = LinkEvent> + Send + Unpin + 'static,
    {
        info!(
            "Starting {} (id '{}'), sampling every {}ms",
            self.config.device_name,
            char::from(self.config.device_id),
            self.config.sampling_interval_ms
        );

        self.sensor.init().await.map_err(|e| match e {
            Error::SensorInit(_) => e,
            other => Error::SensorInit(other.to_string()),
        })?;

        if let Err(e) = self.transport.start_advertising().await {
            self.sensor.deinit().await;
            return Err(match e {
                Error::TransportInit(_) => e,
                other => Error::TransportInit(other.to_string()),
            });
        }
        self.indicator.set_connectivity_led(true);
        self.session.events().send(NodeEvent::Advertising);

        let link_cancel = self.cancel.child_token();
        let handler = LinkHandler::new(
            Arc::clone(&self.session),
            Arc::clone(&self.transport),
            Arc::clone(&self.indicator),
        );
        let link_task = tokio::spawn(handler.run(events, link_cancel.clone()));

        let result = self.drive().await;

        link_cancel.cancel();
        if let Err(e) = link_task.await {
            warn!("Link handler task failed: {}", e);
        }
        self.sensor.deinit().await;

        match &result {
            Ok(cause) => info!("Node stopped: deep sleep ({})", cause),
            Err(e) => warn!("Node stopped: {}", e),
        }
        result
    }

    async fn drive(&self) -> Result<SleepCause> {
        let power = PowerPolicy::new(
            Arc::clone(&self.session),
            Arc::clone(&self.indicator),
            &self.config,
        );
        let pipeline = SamplingPipeline::new(
            Arc::clone(&self.session),
            Arc::clone(&self.sensor),
            Arc::clone(&self.transport),
        );

        loop {
            match power.await_connection(&self.cancel).await? {
                AdvertiseOutcome::Asleep(cause) => return Ok(cause),
                AdvertiseOutcome::Connected => pipeline.run(&self.cancel).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{PeerHandle, link_channel};
    use crate::mock::{MockIndicator, MockSensor, MockTransport};
    use std::time::Duration;

    fn node(
        config: NodeConfig,
    ) -> (
        Arc<MockSensor>,
        Arc<MockTransport>,
        Node<MockSensor, MockTransport, MockIndicator>,
    ) {
        let sensor = Arc::new(MockSensor::new());
        let transport = Arc::new(MockTransport::new());
        let node = Node::new(
            config,
            Arc::clone(&sensor),
            Arc::clone(&transport),
            Arc::new(MockIndicator::new()),
        )
        .unwrap();
        (sensor, transport, node)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Node::new(
            NodeConfig::default().sampling_interval_ms(0),
            Arc::new(MockSensor::new()),
            Arc::new(MockTransport::new()),
            Arc::new(MockIndicator::new()),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_sensor_init_failure_aborts() {
        let (sensor, transport, node) = node(NodeConfig::default());
        sensor.set_init_fails(true);
        let (_tx, rx) = link_channel();

        assert!(matches!(node.run(rx).await, Err(Error::SensorInit(_))));
        assert_eq!(transport.advertise_count(), 0);
    }

    #[tokio::test]
    async fn test_advertise_failure_at_startup_aborts() {
        let (sensor, transport, node) = node(NodeConfig::default());
        transport.set_advertise_fails(true);
        let (_tx, rx) = link_channel();

        assert!(matches!(node.run(rx).await, Err(Error::TransportInit(_))));
        assert!(sensor.deinit_called());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_node() {
        let (sensor, _, node) = node(NodeConfig::default());
        let cancel = node.cancellation_token();
        let (tx, rx) = link_channel();
        tx.connected(PeerHandle(1));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel.cancel();
        });

        assert!(matches!(node.run(rx).await, Err(Error::Cancelled)));
        assert!(sensor.deinit_called());
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_failure_ends_run() {
        let (sensor, _, node) = node(NodeConfig::default());
        sensor.set_transient_failures(1);
        let (tx, rx) = link_channel();
        tx.connected(PeerHandle(1));

        assert!(matches!(node.run(rx).await, Err(Error::Sensor(_))));
        assert!(sensor.deinit_called());
    }
}
