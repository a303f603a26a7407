//! Gateway-side frame alignment.
//!
//! A gateway streaming from several nodes resyncs them together, so frames
//! carrying the same timestamp describe the same instant. [`FrameAligner`]
//! collects frames per timestamp and releases a row once every expected
//! node has reported it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use imunode_types::{AXIS_COUNT, SampleFrame};

/// Default bound on incomplete timestamps kept in memory.
pub const DEFAULT_MAX_PENDING: usize = 256;

const AXIS_NAMES: [&str; AXIS_COUNT] = ["ax", "ay", "az", "gx", "gy", "gz"];

/// One instant across all nodes, ordered by device id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRow {
    pub timestamp_ms: u32,
    pub frames: Vec<SampleFrame>,
}

impl AlignedRow {
    /// Axis values of every frame in order, without device ids.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.frames.iter().flat_map(|f| f.axes)
    }

    /// Format as a CSV record: timestamp then six axes per device.
    pub fn to_csv(&self) -> String {
        let mut fields = vec![self.timestamp_ms.to_string()];
        fields.extend(self.values().map(|v| v.to_string()));
        fields.join(",")
    }
}

/// Groups frames from several nodes by timestamp.
#[derive(Debug, Clone)]
pub struct FrameAligner {
    expected: BTreeSet<u8>,
    pending: BTreeMap<u32, BTreeMap<u8, SampleFrame>>,
    max_pending: usize,
    armed: bool,
    dropped: u64,
}

impl FrameAligner {
    /// Create an aligner expecting frames from `devices`.
    ///
    /// The aligner starts disarmed; call [`arm`](Self::arm) once the
    /// resync commands have gone out.
    pub fn new(devices: impl IntoIterator<Item = u8>) -> Self {
        Self {
            expected: devices.into_iter().collect(),
            pending: BTreeMap::new(),
            max_pending: DEFAULT_MAX_PENDING,
            armed: false,
            dropped: 0,
        }
    }

    /// Bound the number of incomplete timestamps. The oldest is evicted
    /// when the bound is exceeded.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Start accepting frames. Anything pending is discarded.
    pub fn arm(&mut self) {
        self.pending.clear();
        self.armed = true;
    }

    /// Stop accepting frames.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Frames discarded so far (before arming, unknown device, evicted).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of incomplete timestamps.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// CSV header matching [`AlignedRow::to_csv`], e.g. `ms,Jax,Jay,...`.
    pub fn csv_header(&self) -> String {
        let mut fields = vec!["ms".to_string()];
        for id in &self.expected {
            let name = char::from(*id);
            fields.extend(AXIS_NAMES.iter().map(|axis| format!("{name}{axis}")));
        }
        fields.join(",")
    }

    /// Add a frame. Returns the completed row if this frame was the last
    /// one missing for its timestamp.
    pub fn push(&mut self, frame: SampleFrame) -> Option<AlignedRow> {
        if !self.armed {
            trace!("Dropping pre-arm frame t={}ms", frame.timestamp_ms);
            self.dropped += 1;
            return None;
        }
        if !self.expected.contains(&frame.device_id) {
            debug!("Dropping frame from unexpected device '{}'", frame.device_char());
            self.dropped += 1;
            return None;
        }

        let slot = self.pending.entry(frame.timestamp_ms).or_default();
        slot.insert(frame.device_id, frame);

        if slot.len() == self.expected.len() {
            let frames = self
                .pending
                .remove(&frame.timestamp_ms)
                .map(|slot| slot.into_values().collect())
                .unwrap_or_default();
            return Some(AlignedRow {
                timestamp_ms: frame.timestamp_ms,
                frames,
            });
        }

        while self.pending.len() > self.max_pending {
            if let Some((ts, slot)) = self.pending.pop_first() {
                debug!("Evicting incomplete timestamp {}ms", ts);
                self.dropped += slot.len() as u64;
            }
        }
        None
    }
}
