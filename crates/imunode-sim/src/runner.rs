//! Wires simulated nodes to the virtual gateway and runs one capture.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use imunode_core::config::DEFAULT_SAMPLING_INTERVAL_MS;
use imunode_core::{
    AlignedRow, FrameAligner, Node, PeerHandle, Result as NodeResult, SelfTestSensor, SensorDriver,
    SimulatedImu, SleepCause,
};

use imunode_types::AXIS_COUNT;

use crate::config::{Config, ConfigError, NodeSpec};
use crate::gateway::{GatewayReport, VirtualGateway};
use crate::loopback::{LogIndicator, loopback, uplink};

/// Self-test button: held for the first half of every two seconds.
type ButtonFn = Box<dyn Fn() -> bool + Send + Sync>;

/// Sensor chosen per node from its [`NodeSpec`].
#[derive(Debug)]
pub enum SimSensor {
    Imu(SimulatedImu),
    SelfTest(SelfTestSensor<ButtonFn>),
}

impl SimSensor {
    pub fn for_node(node_spec: &NodeSpec) -> Self {
        if node_spec.self_test {
            let start = Instant::now();
            Self::SelfTest(SelfTestSensor::new(Box::new(move || {
                start.elapsed().as_millis() % 2000 < 1000
            })))
        } else {
            Self::Imu(SimulatedImu::new(node_spec.accel_noise, node_spec.gyro_noise))
        }
    }
}

#[async_trait]
impl SensorDriver for SimSensor {
    async fn init(&self) -> NodeResult<()> {
        match self {
            Self::Imu(s) => s.init().await,
            Self::SelfTest(s) => s.init().await,
        }
    }

    async fn read_sample(&self) -> NodeResult<[f32; AXIS_COUNT]> {
        match self {
            Self::Imu(s) => s.read_sample().await,
            Self::SelfTest(s) => s.read_sample().await,
        }
    }

    async fn deinit(&self) {
        match self {
            Self::Imu(s) => s.deinit().await,
            Self::SelfTest(s) => s.deinit().await,
        }
    }
}

/// How one node finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOutcome {
    pub device_id: char,
    /// Sleep cause, or the error that stopped the node.
    pub result: std::result::Result<SleepCause, String>,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub gateway: GatewayReport,
    pub nodes: Vec<NodeOutcome>,
}

/// Errors that prevent a simulation from starting.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create node '{id}': {source}")]
    Node {
        id: char,
        #[source]
        source: imunode_core::Error,
    },
}

/// Run all configured nodes against the virtual gateway.
///
/// `on_header` receives the CSV header (built from the gateway's aligner)
/// before capture starts; `on_row` receives every complete row. Nodes
/// still running after the capture are cancelled.
pub async fn run_simulation(
    config: &Config,
    on_header: impl FnOnce(&FrameAligner),
    on_row: impl FnMut(&AlignedRow),
) -> std::result::Result<SimReport, SimError> {
    config.validate()?;

    let (tx, rx) = uplink();
    let mut links = Vec::with_capacity(config.nodes.len());
    let mut tasks: Vec<(char, CancellationToken, JoinHandle<NodeResult<SleepCause>>)> =
        Vec::with_capacity(config.nodes.len());

    for (index, node_spec) in config.nodes.iter().enumerate() {
        let device_id = node_spec.id as u8;
        let peer = PeerHandle(index as u16 + 1);
        let (transport, events, link) = loopback(device_id, peer, tx.clone());
        let node = Node::new(
            node_spec.node_config(DEFAULT_SAMPLING_INTERVAL_MS),
            Arc::new(SimSensor::for_node(node_spec)),
            transport,
            Arc::new(LogIndicator::new(device_id)),
        )
        .map_err(|source| SimError::Node {
            id: node_spec.id,
            source,
        })?;
        let cancel = node.cancellation_token();
        tasks.push((node_spec.id, cancel, tokio::spawn(node.run(events))));
        links.push(link);
    }
    drop(tx);
    info!("Started {} node(s)", tasks.len());

    let gateway = VirtualGateway::new(links, rx, config.gateway.clone());
    on_header(gateway.aligner());
    let report = gateway.run(on_row).await;

    let mut nodes = Vec::with_capacity(tasks.len());
    for (id, cancel, task) in tasks {
        if !task.is_finished() && !config.gateway.deep_sleep {
            cancel.cancel();
        }
        let result = match task.await {
            Ok(Ok(cause)) => Ok(cause),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => {
                warn!("Node '{}' task failed: {}", id, e);
                Err(e.to_string())
            }
        };
        nodes.push(NodeOutcome { device_id: id, result });
    }

    Ok(SimReport {
        gateway: report,
        nodes,
    })
}
