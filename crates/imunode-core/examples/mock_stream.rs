//! Example: Streaming From a Mock Node
//!
//! Runs a node against the mock sensor and transport, plays the gateway's
//! part over the link channel, and prints the frames the node sent and the
//! events it emitted.
//!
//! Run with: `cargo run --example mock_stream -- [INTERVAL_MS]`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use imunode_core::{
    MockIndicator, MockSensor, MockTransport, Node, NodeConfig, PeerHandle, link_channel,
};
use imunode_types::Command;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let interval: u16 = match env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 100,
    };

    // Lying on its side: gravity along Y.
    let sensor = Arc::new(MockSensor::new());
    sensor.set_resting([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

    let transport = Arc::new(MockTransport::new());
    let node = Node::new(
        NodeConfig::default(),
        sensor,
        Arc::clone(&transport),
        Arc::new(MockIndicator::new()),
    )?;
    let mut events = node.subscribe();
    let (link, link_events) = link_channel();
    let task = tokio::spawn(node.run(link_events));

    let peer = PeerHandle(1);
    link.connected(peer);
    link.subscribed(peer);
    link.write(Command::set_interval(interval).to_bytes().to_vec());
    link.write(Command::resync().to_bytes().to_vec());

    tokio::time::sleep(Duration::from_millis(u64::from(interval) * 11 / 2)).await;
    link.write(Command::deep_sleep().to_bytes().to_vec());
    let cause = task.await??;

    println!("Frames sent:");
    for frame in transport.sent_frames() {
        println!("  {}", frame);
    }
    println!();
    println!("Events:");
    while let Ok(event) = events.try_recv() {
        println!("  {:?}", event);
    }
    println!();
    println!("Node asleep ({})", cause);

    Ok(())
}
