//! Inbound command handling.
//!
//! Writes to the command endpoint are exactly four bytes: a little-endian
//! `u16` command kind followed by a little-endian `u16` value. Anything that
//! does not decode, or decodes to an unknown kind, is ignored without
//! changing state and without a reply.

use std::sync::Arc;

use tracing::{debug, info, warn};

use imunode_types::{Command, CommandKind};

use crate::error::Result;
use crate::events::NodeEvent;
use crate::session::{Session, SleepCause};

/// Outcome of applying a command write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Timestamp re-zeroed; `armed` tells whether streaming is now on.
    Resynced { armed: bool },
    /// Sampling interval changed from `previous` to `current`.
    IntervalChanged { previous: u16, current: u16 },
    /// The node entered deep sleep.
    DeepSleep,
    /// The write was dropped.
    Ignored,
}

/// Decodes command writes and applies them to the session.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    session: Arc<Session>,
}

impl CommandHandler {
    /// Create a handler bound to `session`.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Decode and apply a raw write.
    pub fn apply(&self, payload: &[u8]) -> Applied {
        match decode(payload) {
            Ok(command) => self.execute(command),
            Err(e) => {
                debug!("Dropping command write: {}", e);
                self.ignored(e.to_string());
                Applied::Ignored
            }
        }
    }

    /// Apply a decoded command.
    pub fn execute(&self, command: Command) -> Applied {
        let kind = command.classify();
        if self.session.is_asleep() {
            debug!("Ignoring {} while asleep", kind);
            return Applied::Ignored;
        }

        match kind {
            CommandKind::Resync => {
                let armed = self.session.resync();
                Applied::Resynced { armed }
            }
            CommandKind::SetInterval(0) => {
                warn!("Ignoring zero sampling interval");
                self.ignored("sampling interval must be > 0");
                Applied::Ignored
            }
            CommandKind::SetInterval(ms) => match self.session.set_sampling_interval(ms) {
                Some(previous) => Applied::IntervalChanged {
                    previous,
                    current: ms,
                },
                None => Applied::Ignored,
            },
            CommandKind::DeepSleep => {
                info!("Deep sleep requested by gateway");
                if self.session.enter_deep_sleep(SleepCause::Command) {
                    Applied::DeepSleep
                } else {
                    Applied::Ignored
                }
            }
            CommandKind::Unknown(code) => {
                debug!("Ignoring unknown command {}", code);
                self.ignored(kind.to_string());
                Applied::Ignored
            }
        }
    }

    fn ignored(&self, reason: impl Into<String>) {
        self.session.events().send(NodeEvent::CommandIgnored {
            reason: reason.into(),
        });
    }
}

/// Decode a raw command write.
///
/// # Errors
///
/// Returns [`Error::Parse`](crate::Error::Parse) for any write that is not
/// exactly four bytes.
pub fn decode(payload: &[u8]) -> Result<Command> {
    Ok(Command::from_bytes(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::PeerHandle;
    use crate::session::LinkState;

    fn connected() -> (Arc<Session>, CommandHandler) {
        let session = Arc::new(Session::new(b'J', 50));
        session.on_connect(PeerHandle(1));
        let handler = CommandHandler::new(Arc::clone(&session));
        (session, handler)
    }

    #[test]
    fn test_resync_arms_streaming() {
        let (session, handler) = connected();
        assert_eq!(
            handler.apply(&[0x01, 0x00, 0x00, 0x00]),
            Applied::Resynced { armed: true }
        );
        assert!(session.snapshot().streaming_armed);
    }

    #[test]
    fn test_resync_ignores_value() {
        let (session, handler) = connected();
        assert_eq!(
            handler.apply(&[0x01, 0x00, 0xFF, 0xFF]),
            Applied::Resynced { armed: true }
        );
        assert_eq!(session.snapshot().next_timestamp_ms, 0);
    }

    #[test]
    fn test_set_interval() {
        let (session, handler) = connected();
        assert_eq!(
            handler.apply(&[0x02, 0x00, 0x64, 0x00]),
            Applied::IntervalChanged {
                previous: 50,
                current: 100
            }
        );
        assert_eq!(session.snapshot().sampling_interval_ms, 100);
    }

    #[test]
    fn test_set_interval_does_not_arm() {
        let (session, handler) = connected();
        handler.apply(&Command::set_interval(20).to_bytes());
        assert!(!session.snapshot().streaming_armed);
    }

    #[test]
    fn test_zero_interval_ignored() {
        let (session, handler) = connected();
        let mut events = session.subscribe();
        assert_eq!(handler.apply(&[0x02, 0x00, 0x00, 0x00]), Applied::Ignored);
        assert_eq!(session.snapshot().sampling_interval_ms, 50);
        assert!(matches!(
            events.try_recv(),
            Ok(NodeEvent::CommandIgnored { .. })
        ));
    }

    #[test]
    fn test_deep_sleep() {
        let (session, handler) = connected();
        assert_eq!(handler.apply(&[0x03, 0x00, 0x00, 0x00]), Applied::DeepSleep);
        assert_eq!(
            session.link_state(),
            LinkState::DeepSleep {
                cause: SleepCause::Command
            }
        );

        assert_eq!(handler.apply(&Command::deep_sleep().to_bytes()), Applied::Ignored);
        assert_eq!(handler.apply(&Command::resync().to_bytes()), Applied::Ignored);
    }

    #[test]
    fn test_unknown_command_changes_nothing() {
        let (session, handler) = connected();
        let before = session.snapshot();
        assert_eq!(handler.apply(&[0x09, 0x00, 0x10, 0x00]), Applied::Ignored);
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_wrong_length_changes_nothing() {
        let (session, handler) = connected();
        let before = session.snapshot();
        assert_eq!(handler.apply(&[]), Applied::Ignored);
        assert_eq!(handler.apply(&[0x01, 0x00, 0x00]), Applied::Ignored);
        assert_eq!(handler.apply(&[0x01, 0x00, 0x00, 0x00, 0x00]), Applied::Ignored);
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(&[0x02, 0x00, 0x64, 0x00]).unwrap(), Command::set_interval(100));
        for bad in [&[][..], &[0x01, 0x00][..], &[0x01, 0x00, 0x00, 0x00, 0x00][..]] {
            let err = decode(bad).unwrap_err();
            assert!(matches!(err, crate::Error::Parse(_)));
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn test_resync_while_advertising_does_not_arm() {
        let session = Arc::new(Session::new(b'J', 50));
        let handler = CommandHandler::new(Arc::clone(&session));
        assert_eq!(
            handler.apply(&Command::resync().to_bytes()),
            Applied::Resynced { armed: false }
        );
        assert!(!session.snapshot().streaming_armed);
    }
}
