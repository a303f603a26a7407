//! Mock collaborators for testing.
//!
//! This module provides in-memory implementations of [`SensorDriver`],
//! [`Transport`] and [`Indicator`] so the node can be exercised without a
//! sensor bus or a radio.
//!
//! # Features
//!
//! - **Failure injection**: make init, reads, advertising or notifications fail
//! - **Latency simulation**: add artificial delays to sensor reads
//! - **Recording**: every notification and LED change is kept for assertions

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use imunode_types::{AXIS_COUNT, SampleFrame};

use crate::error::{Error, Result};
use crate::link::PeerHandle;
use crate::traits::{Indicator, SensorDriver, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock inertial sensor.
///
/// Returns queued samples first, then repeats the resting sample.
///
/// # Example
///
/// ```
/// use imunode_core::{MockSensor, SensorDriver};
///
/// #[tokio::main]
/// async fn main() {
///     let sensor = MockSensor::new();
///     sensor.push_sample([0.1, 0.0, 1.0, 0.0, 0.0, 0.0]);
///
///     assert_eq!(sensor.read_sample().await.unwrap()[0], 0.1);
///     assert_eq!(sensor.read_sample().await.unwrap(), MockSensor::RESTING);
///     assert_eq!(sensor.read_count(), 2);
/// }
/// ```
#[derive(Debug)]
pub struct MockSensor {
    resting: Mutex<[f32; AXIS_COUNT]>,
    queued: Mutex<VecDeque<[f32; AXIS_COUNT]>>,
    read_count: AtomicU32,
    init_fails: AtomicBool,
    should_fail: AtomicBool,
    /// Number of reads to fail before succeeding.
    remaining_failures: AtomicU32,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    deinit_called: AtomicBool,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSensor {
    /// A level, motionless sensor: 1 g on Z, no rotation.
    pub const RESTING: [f32; AXIS_COUNT] = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

    /// Create a sensor that always reports [`Self::RESTING`].
    pub fn new() -> Self {
        Self {
            resting: Mutex::new(Self::RESTING),
            queued: Mutex::new(VecDeque::new()),
            read_count: AtomicU32::new(0),
            init_fails: AtomicBool::new(false),
            should_fail: AtomicBool::new(false),
            remaining_failures: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(0),
            deinit_called: AtomicBool::new(false),
        }
    }

    /// Replace the sample returned once the queue is empty.
    pub fn set_resting(&self, axes: [f32; AXIS_COUNT]) {
        *lock(&self.resting) = axes;
    }

    /// Queue a sample for the next read.
    pub fn push_sample(&self, axes: [f32; AXIS_COUNT]) {
        lock(&self.queued).push_back(axes);
    }

    /// Make `init` fail.
    pub fn set_init_fails(&self, fail: bool) {
        self.init_fails.store(fail, Ordering::Relaxed);
    }

    /// Make every read fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` reads, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Set simulated read latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of successful reads.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Whether `deinit` ran.
    pub fn deinit_called(&self) -> bool {
        self.deinit_called.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SensorDriver for MockSensor {
    async fn init(&self) -> Result<()> {
        if self.init_fails.load(Ordering::Relaxed) {
            return Err(Error::sensor_init("mock sensor did not respond"));
        }
        Ok(())
    }

    async fn read_sample(&self) -> Result<[f32; AXIS_COUNT]> {
        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::sensor("transient mock read failure"));
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::sensor("mock read failure"));
        }

        self.read_count.fetch_add(1, Ordering::Relaxed);
        let queued = lock(&self.queued).pop_front();
        Ok(queued.unwrap_or_else(|| *lock(&self.resting)))
    }

    async fn deinit(&self) {
        self.deinit_called.store(true, Ordering::Relaxed);
    }
}

/// A mock transport that records notifications.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(PeerHandle, Bytes)>>,
    advertise_count: AtomicU32,
    advertise_fails: AtomicBool,
    notify_fails: AtomicBool,
}

impl MockTransport {
    /// Create a transport that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start_advertising` fail.
    pub fn set_advertise_fails(&self, fail: bool) {
        self.advertise_fails.store(fail, Ordering::Relaxed);
    }

    /// Make `notify` fail.
    pub fn set_notify_fails(&self, fail: bool) {
        self.notify_fails.store(fail, Ordering::Relaxed);
    }

    /// Number of advertising (re)starts, successful or not.
    pub fn advertise_count(&self) -> u32 {
        self.advertise_count.load(Ordering::Relaxed)
    }

    /// Number of accepted notifications.
    pub fn notify_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Raw notifications in send order.
    pub fn sent(&self) -> Vec<(PeerHandle, Bytes)> {
        lock(&self.sent).clone()
    }

    /// Accepted notifications decoded as frames. Payloads that do not
    /// decode are skipped.
    pub fn sent_frames(&self) -> Vec<SampleFrame> {
        lock(&self.sent)
            .iter()
            .filter_map(|(_, payload)| SampleFrame::from_bytes(payload).ok())
            .collect()
    }

    /// Timestamps of accepted frames in send order.
    pub fn sent_timestamps(&self) -> Vec<u32> {
        self.sent_frames().iter().map(|f| f.timestamp_ms).collect()
    }

    /// Forget recorded notifications.
    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_advertising(&self) -> Result<()> {
        self.advertise_count.fetch_add(1, Ordering::Relaxed);
        if self.advertise_fails.load(Ordering::Relaxed) {
            return Err(Error::transport("advertise", "mock advertising failure"));
        }
        Ok(())
    }

    async fn notify(&self, peer: PeerHandle, payload: Bytes) -> Result<()> {
        if self.notify_fails.load(Ordering::Relaxed) {
            return Err(Error::transport("notify", "mock notify failure"));
        }
        lock(&self.sent).push((peer, payload));
        Ok(())
    }
}

/// A mock LED that records every level it is driven to.
#[derive(Debug, Default)]
pub struct MockIndicator {
    history: Mutex<Vec<bool>>,
}

impl MockIndicator {
    /// Create an indicator with an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level driven, if any.
    pub fn last(&self) -> Option<bool> {
        lock(&self.history).last().copied()
    }

    /// Every level driven, oldest first.
    pub fn history(&self) -> Vec<bool> {
        lock(&self.history).clone()
    }

    /// Number of times the level actually changed.
    pub fn toggle_count(&self) -> usize {
        lock(&self.history)
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .count()
    }
}

impl Indicator for MockIndicator {
    fn set_connectivity_led(&self, on: bool) {
        lock(&self.history).push(on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sensor_queue_then_resting() {
        let sensor = MockSensor::new();
        sensor.push_sample([1.0; AXIS_COUNT]);
        assert_eq!(sensor.read_sample().await.unwrap(), [1.0; AXIS_COUNT]);
        assert_eq!(sensor.read_sample().await.unwrap(), MockSensor::RESTING);
        assert_eq!(sensor.read_count(), 2);
    }

    #[tokio::test]
    async fn test_sensor_transient_failures() {
        let sensor = MockSensor::new();
        sensor.set_transient_failures(2);
        assert!(sensor.read_sample().await.is_err());
        assert!(sensor.read_sample().await.is_err());
        assert!(sensor.read_sample().await.is_ok());
        assert_eq!(sensor.read_count(), 1);
    }

    #[tokio::test]
    async fn test_sensor_init_failure() {
        let sensor = MockSensor::new();
        sensor.set_init_fails(true);
        assert!(matches!(sensor.init().await, Err(Error::SensorInit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_latency() {
        let sensor = MockSensor::new();
        sensor.set_read_latency(Duration::from_millis(30));
        let start = tokio::time::Instant::now();
        sensor.read_sample().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_transport_records_frames() {
        let transport = MockTransport::new();
        let frame = SampleFrame::new(b'J', 50, MockSensor::RESTING);
        transport
            .notify(PeerHandle(1), Bytes::copy_from_slice(&frame.to_bytes()))
            .await
            .unwrap();

        assert_eq!(transport.notify_count(), 1);
        assert_eq!(transport.sent_frames(), vec![frame]);
        assert_eq!(transport.sent_timestamps(), vec![50]);
        assert_eq!(transport.sent()[0].0, PeerHandle(1));
    }

    #[tokio::test]
    async fn test_transport_notify_failure_not_recorded() {
        let transport = MockTransport::new();
        transport.set_notify_fails(true);
        let err = transport
            .notify(PeerHandle(1), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(transport.notify_count(), 0);
    }

    #[test]
    fn test_indicator_toggle_count() {
        let led = MockIndicator::new();
        assert_eq!(led.last(), None);
        for on in [true, false, false, true] {
            led.set_connectivity_led(on);
        }
        assert_eq!(led.last(), Some(true));
        assert_eq!(led.toggle_count(), 2);
    }
}
