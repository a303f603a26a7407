//! Scripted virtual gateway.
//!
//! Mirrors what a field gateway does with a set of nodes: connect and
//! subscribe to each one, push the sampling interval, arm the frame
//! aligner, resync every node at once, capture for a fixed time and then
//! either put the nodes to sleep or disconnect.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use imunode_core::{AlignedRow, Command, FrameAligner, SampleFrame};

use crate::config::GatewayConfig;
use crate::loopback::{GatewayLink, Notification, Uplink};

/// Counters collected during a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayReport {
    /// Notifications received from all nodes.
    pub notifications: u64,
    /// Complete rows emitted.
    pub rows: u64,
    /// Payloads that did not decode as frames.
    pub decode_errors: u64,
    /// Frames the aligner discarded.
    pub dropped: u64,
    /// Nodes that were already gone when a command was written.
    pub unreachable: u64,
}

/// Drives a set of nodes through one capture session.
pub struct VirtualGateway {
    links: Vec<GatewayLink>,
    uplink: Uplink,
    config: GatewayConfig,
    aligner: FrameAligner,
    report: GatewayReport,
}

impl VirtualGateway {
    /// Create a gateway for the nodes behind `links`.
    pub fn new(links: Vec<GatewayLink>, uplink: Uplink, config: GatewayConfig) -> Self {
        let aligner = FrameAligner::new(links.iter().map(GatewayLink::device_id));
        Self {
            links,
            uplink,
            config,
            aligner,
            report: GatewayReport::default(),
        }
    }

    /// The aligner, for header formatting.
    pub fn aligner(&self) -> &FrameAligner {
        &self.aligner
    }

    /// Run the script. `on_row` is called for every complete row.
    pub async fn run(mut self, mut on_row: impl FnMut(&AlignedRow)) -> GatewayReport {
        info!("Connecting to {} node(s)", self.links.len());
        for link in &self.links {
            if !(link.connect() && link.subscribe()) {
                self.report.unreachable += 1;
            }
            tokio::time::sleep(Duration::from_millis(self.config.connect_delay_ms)).await;
        }

        info!("Setting sampling interval to {}ms", self.config.sampling_interval_ms);
        self.broadcast(Command::set_interval(self.config.sampling_interval_ms));

        // Frames may only be counted once every node restarted its clock.
        self.aligner.arm();
        info!("Resyncing all nodes");
        self.broadcast(Command::resync());

        info!("Capturing for {}s", self.config.capture_secs);
        let deadline = Instant::now() + self.config.capture();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                received = self.uplink.recv() => {
                    let Some(notification) = received else {
                        warn!("All nodes went away before the capture ended");
                        break;
                    };
                    if let Some(row) = self.receive(notification) {
                        self.report.rows += 1;
                        on_row(&row);
                    }
                }
            }
        }
        self.aligner.disarm();

        if self.config.deep_sleep {
            info!("Sending deep sleep to all nodes");
            self.broadcast(Command::deep_sleep());
        } else {
            info!("Disconnecting from all nodes");
            for link in &self.links {
                link.disconnect();
            }
        }

        self.report.dropped = self.aligner.dropped();
        self.report
    }

    fn broadcast(&mut self, command: Command) {
        for link in &self.links {
            if !link.write(command) {
                debug!("Node '{}' unreachable", char::from(link.device_id()));
                self.report.unreachable += 1;
            }
        }
    }

    fn receive(&mut self, notification: Notification) -> Option<AlignedRow> {
        self.report.notifications += 1;
        match SampleFrame::from_bytes(&notification.payload) {
            Ok(frame) => {
                if frame.device_id != notification.device_id {
                    warn!(
                        "Frame from '{}' claims id '{}'",
                        char::from(notification.device_id),
                        frame.device_char()
                    );
                }
                self.aligner.push(frame)
            }
            Err(e) => {
                warn!(
                    "Undecodable notification from '{}': {}",
                    char::from(notification.device_id),
                    e
                );
                self.report.decode_errors += 1;
                None
            }
        }
    }
}
