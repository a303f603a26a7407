//! Bluetooth UUIDs for the imunode control/notify service.
//!
//! All four UUIDs share the `cafeXXXX-87a1-aade-bab0-c0ffeef3ae45` base and
//! differ only in the 16-bit slot after `cafe`.

use uuid::{Uuid, uuid};

/// Primary service exposing the three endpoints below.
pub const SERVICE: Uuid = uuid!("cafe0000-87a1-aade-bab0-c0ffeef3ae45");

/// Read-only characteristic. Reserved; the node returns nothing.
pub const READ: Uuid = uuid!("cafe0001-87a1-aade-bab0-c0ffeef3ae45");

/// Write characteristic accepting a 4-byte command.
pub const WRITE: Uuid = uuid!("cafe0002-87a1-aade-bab0-c0ffeef3ae45");

/// Notify characteristic delivering sample frames.
pub const NOTIFY: Uuid = uuid!("cafe0003-87a1-aade-bab0-c0ffeef3ae45");

/// Little-endian byte form of a UUID, as host stacks declare 128-bit UUIDs.
#[must_use]
pub fn to_le_bytes(id: Uuid) -> [u8; 16] {
    let mut bytes = *id.as_bytes();
    bytes.reverse();
    bytes
}
