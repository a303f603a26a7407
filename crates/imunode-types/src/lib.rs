//! Wire types for the imunode inertial sensor link.
//!
//! This crate provides the types shared by the node firmware core
//! (imunode-core) and any gateway that talks to it.
//!
//! # Features
//!
//! - [`SampleFrame`]: the timestamped 6-axis sample carried by notifications
//! - [`Command`] and [`CommandKind`]: the 4-byte control protocol
//! - GATT UUIDs for the control/notify service
//! - Error types for decoding
//!
//! # Example
//!
//! ```
//! use imunode_types::{Command, CommandKind, SampleFrame};
//!
//! let cmd = Command::from_bytes(&[0x02, 0x00, 0x64, 0x00]).unwrap();
//! assert_eq!(cmd.classify(), CommandKind::SetInterval(100));
//!
//! let frame = SampleFrame::new(b'J', 50, [0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
//! let decoded = SampleFrame::from_bytes(&frame.to_bytes()).unwrap();
//! assert_eq!(decoded, frame);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    AXIS_COUNT, CMD_DEEP_SLEEP, CMD_RESYNC, CMD_SET_INTERVAL, COMMAND_LEN, Command, CommandKind,
    FRAME_LEN, PACKED_FRAME_LEN, SampleFrame,
};
pub use uuid as uuids;


/// Property-based tests for wire decoding.
///
/// # Running Tests
///
/// ```bash
/// cargo test -p imunode-types proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes as a frame never panics.
        #[test]
        fn frame_decode_never_panics(data: Vec<u8>) {
            let _ = SampleFrame::from_bytes(&data);
        }

        /// Decoding arbitrary bytes as a command never panics.
        #[test]
        fn command_decode_never_panics(data: Vec<u8>) {
            let _ = Command::from_bytes(&data);
        }

        /// Every 4-byte payload is a command, and re-encodes to itself.
        #[test]
        fn any_four_bytes_is_a_command(data in proptest::collection::vec(any::<u8>(), 4)) {
            let cmd = Command::from_bytes(&data).unwrap();
            prop_assert_eq!(&cmd.to_bytes()[..], &data[..]);
        }

        /// The aligned and packed layouts decode to the same frame.
        #[test]
        fn packed_and_aligned_agree(id: u8, ts: u32, axes in proptest::array::uniform6(-2000.0f32..2000.0)) {
            let aligned = SampleFrame::new(id, ts, axes).to_bytes();
            let mut packed = Vec::with_capacity(PACKED_FRAME_LEN);
            packed.push(aligned[0]);
            packed.extend_from_slice(&aligned[4..]);

            let a = SampleFrame::from_bytes(&aligned).unwrap();
            let p = SampleFrame::from_bytes(&packed).unwrap();
            prop_assert_eq!(a, p);
        }
    }
}
