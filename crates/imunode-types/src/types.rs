//! Core wire types for the imunode link.

use core::fmt;

use bytes::{Buf, BufMut};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Number of inertial axes carried by every frame (3 accel + 3 gyro).
pub const AXIS_COUNT: usize = 6;

/// Encoded size of a [`SampleFrame`] in the aligned layout the node emits.
pub const FRAME_LEN: usize = 32;

/// Encoded size of a [`SampleFrame`] without the alignment padding.
pub const PACKED_FRAME_LEN: usize = 29;

/// Encoded size of a [`Command`].
pub const COMMAND_LEN: usize = 4;

/// Command kind: re-zero the timestamp and arm streaming.
/// Format: `[0x01, 0x00, value_lo, value_hi]` (value ignored)
pub const CMD_RESYNC: u16 = 1;

/// Command kind: change the sampling interval.
/// Format: `[0x02, 0x00, ms_lo, ms_hi]`
pub const CMD_SET_INTERVAL: u16 = 2;

/// Command kind: enter deep sleep immediately.
/// Format: `[0x03, 0x00, value_lo, value_hi]` (value ignored)
pub const CMD_DEEP_SLEEP: u16 = 3;

const FRAME_LAYOUTS: &[usize] = &[PACKED_FRAME_LEN, FRAME_LEN];
const COMMAND_LAYOUTS: &[usize] = &[COMMAND_LEN];

/// One timestamped inertial sample as delivered to the gateway.
///
/// Frames are built once per sampling cycle and never mutated afterwards.
/// `timestamp_ms` is relative to the last resync, not wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleFrame {
    /// Node identity, an ASCII letter by convention (e.g. `b'J'`).
    pub device_id: u8,
    /// Milliseconds since the last resync.
    pub timestamp_ms: u32,
    /// Accelerometer X/Y/Z in g followed by gyroscope X/Y/Z in deg/s.
    pub axes: [f32; AXIS_COUNT],
}

impl SampleFrame {
    /// Create a new frame.
    #[must_use]
    pub fn new(device_id: u8, timestamp_ms: u32, axes: [f32; AXIS_COUNT]) -> Self {
        Self {
            device_id,
            timestamp_ms,
            axes,
        }
    }

    /// Accelerometer X/Y/Z in g.
    #[must_use]
    pub fn accel(&self) -> [f32; 3] {
        [self.axes[0], self.axes[1], self.axes[2]]
    }

    /// Gyroscope X/Y/Z in deg/s.
    #[must_use]
    pub fn gyro(&self) -> [f32; 3] {
        [self.axes[3], self.axes[4], self.axes[5]]
    }

    /// The device id rendered as a character.
    #[must_use]
    pub fn device_char(&self) -> char {
        char::from(self.device_id)
    }

    /// Encode the frame in the aligned 32-byte layout.
    ///
    /// The layout is:
    /// - byte 0: device id (u8)
    /// - bytes 1-3: padding (zero)
    /// - bytes 4-7: timestamp in ms (u32 LE)
    /// - bytes 8-31: six axes (f32 LE each)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        let mut buf = &mut out[..];
        buf.put_u8(self.device_id);
        buf.put_bytes(0, FRAME_LEN - PACKED_FRAME_LEN);
        buf.put_u32_le(self.timestamp_ms);
        for axis in self.axes {
            buf.put_f32_le(axis);
        }
        out
    }

    /// Decode a frame from either the aligned (32-byte) or the packed
    /// (29-byte) layout.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for payloads shorter than
    /// [`PACKED_FRAME_LEN`] and [`ParseError::InvalidLength`] for any other
    /// length that is not an accepted layout.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        let padding = match data.len() {
            FRAME_LEN => FRAME_LEN - PACKED_FRAME_LEN,
            PACKED_FRAME_LEN => 0,
            actual if actual < PACKED_FRAME_LEN => {
                return Err(ParseError::InsufficientBytes {
                    expected: PACKED_FRAME_LEN,
                    actual,
                });
            }
            actual => {
                return Err(ParseError::InvalidLength {
                    accepted: FRAME_LAYOUTS,
                    actual,
                });
            }
        };

        let mut buf = data;
        let device_id = buf.get_u8();
        buf.advance(padding);
        let timestamp_ms = buf.get_u32_le();
        let mut axes = [0.0f32; AXIS_COUNT];
        for axis in &mut axes {
            *axis = buf.get_f32_le();
        }

        Ok(Self {
            device_id,
            timestamp_ms,
            axes,
        })
    }
}

impl fmt::Display for SampleFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [ax, ay, az, gx, gy, gz] = self.axes;
        write!(
            f,
            "[{}] t={}ms acc=({:.3}, {:.3}, {:.3})g gyro=({:.2}, {:.2}, {:.2})dps",
            self.device_char(),
            self.timestamp_ms,
            ax,
            ay,
            az,
            gx,
            gy,
            gz
        )
    }
}

/// A control command written by the gateway.
///
/// The command channel is fire-and-forget: the node never acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Command {
    /// Command discriminator, see [`CommandKind`].
    pub kind: u16,
    /// Command argument (only meaningful for [`CMD_SET_INTERVAL`]).
    pub value: u16,
}

impl Command {
    /// Create a command from raw fields.
    #[must_use]
    pub const fn new(kind: u16, value: u16) -> Self {
        Self { kind, value }
    }

    /// Resync command: re-zero the timestamp and arm streaming.
    #[must_use]
    pub const fn resync() -> Self {
        Self::new(CMD_RESYNC, 0)
    }

    /// Change the sampling interval to `interval_ms`.
    #[must_use]
    pub const fn set_interval(interval_ms: u16) -> Self {
        Self::new(CMD_SET_INTERVAL, interval_ms)
    }

    /// Put the node into deep sleep.
    #[must_use]
    pub const fn deep_sleep() -> Self {
        Self::new(CMD_DEEP_SLEEP, 0)
    }

    /// Encode as `[kind LE, value LE]`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; COMMAND_LEN] {
        let mut out = [0u8; COMMAND_LEN];
        let mut buf = &mut out[..];
        buf.put_u16_le(self.kind);
        buf.put_u16_le(self.value);
        out
    }

    /// Decode a command from exactly [`COMMAND_LEN`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] for short payloads and
    /// [`ParseError::InvalidLength`] for oversized ones.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < COMMAND_LEN {
            return Err(ParseError::InsufficientBytes {
                expected: COMMAND_LEN,
                actual: data.len(),
            });
        }
        if data.len() != COMMAND_LEN {
            return Err(ParseError::InvalidLength {
                accepted: COMMAND_LAYOUTS,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let kind = buf.get_u16_le();
        let value = buf.get_u16_le();
        Ok(Self { kind, value })
    }

    /// Classify the command.
    #[must_use]
    pub fn classify(&self) -> CommandKind {
        CommandKind::from(*self)
    }
}

/// A decoded command, classified by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CommandKind {
    /// Re-zero the timestamp and arm streaming.
    Resync,
    /// Change the sampling interval (ms). Zero is carried through unchanged;
    /// the receiver decides how to treat it.
    SetInterval(u16),
    /// Enter deep sleep.
    DeepSleep,
    /// Unrecognised kind.
    Unknown(u16),
}

impl From<Command> for CommandKind {
    fn from(cmd: Command) -> Self {
        match cmd.kind {
            CMD_RESYNC => CommandKind::Resync,
            CMD_SET_INTERVAL => CommandKind::SetInterval(cmd.value),
            CMD_DEEP_SLEEP => CommandKind::DeepSleep,
            other => CommandKind::Unknown(other),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Resync => write!(f, "resync"),
            CommandKind::SetInterval(ms) => write!(f, "set interval {}ms", ms),
            CommandKind::DeepSleep => write!(f, "deep sleep"),
            CommandKind::Unknown(kind) => write!(f, "unknown command {}", kind),
        }
    }
}
