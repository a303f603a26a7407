//! Session state machine.
//!
//! [`Session`] is the only state shared between the link-event context and
//! the sampling loop. Every field lives behind one mutex and every accessor
//! takes the lock for the duration of a single read-modify-write, so a
//! change made by one context is visible to the next operation of the other.
//! The lock is never held across an `.await`.
//!
//! ```text
//!              connect(ok) / subscribe
//!  Advertising ───────────────────────► Connected
//!       ▲  │                                │
//!       │  │ connect(fail): re-advertise    │
//!       │  └──────┘                         │
//!       └─────────── disconnect ────────────┘
//!
//!  any state ── deep sleep (command or inactivity) ──► DeepSleep (terminal)
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use imunode_types::{AXIS_COUNT, SampleFrame};

use crate::events::{EventDispatcher, EventReceiver, NodeEvent};
use crate::link::PeerHandle;

/// Why the node powered down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepCause {
    /// The gateway sent a deep-sleep command.
    Command,
    /// Nobody connected within the dwell threshold.
    Inactivity,
}

impl std::fmt::Display for SleepCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SleepCause::Command => write!(f, "commanded by gateway"),
            SleepCause::Inactivity => write!(f, "no connection before timeout"),
        }
    }
}

/// Connectivity state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    /// Discoverable, waiting for a peer.
    Advertising,
    /// A peer is connected or subscribed.
    Connected,
    /// Terminal. Only an external reset leaves this state.
    DeepSleep { cause: SleepCause },
}

/// Plain-data view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// Current connectivity state.
    pub link: LinkState,
    /// Whether frames may be sent. Implies `link == Connected`.
    pub streaming_armed: bool,
    /// Sampling cadence in milliseconds, never zero.
    pub sampling_interval_ms: u16,
    /// Timestamp the next frame will carry.
    pub next_timestamp_ms: u32,
    /// Notification target, present only while connected.
    pub peer: Option<PeerHandle>,
    /// Dwell ticks spent advertising since the last connection.
    pub dwell_ticks: u32,
    resync_epoch: u64,
}

impl SessionState {
    fn new(sampling_interval_ms: u16) -> Self {
        Self {
            link: LinkState::Advertising,
            streaming_armed: false,
            sampling_interval_ms,
            next_timestamp_ms: 0,
            peer: None,
            dwell_ticks: 0,
            resync_epoch: 0,
        }
    }

    /// Whether a peer is connected.
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Whether the node has powered down.
    pub fn is_asleep(&self) -> bool {
        matches!(self.link, LinkState::DeepSleep { .. })
    }
}

/// Connectivity change produced by a link event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advertising → Connected.
    Connected,
    /// Connected → Advertising.
    Disconnected,
    /// No state change.
    Unchanged,
}

/// A frame stamped by [`Session::stamp`], together with what the sampling
/// loop needs to finish the cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamp {
    /// The frame built from the sample.
    pub frame: SampleFrame,
    /// Where to send it, `None` when streaming is not armed.
    pub deliver_to: Option<PeerHandle>,
    /// Interval in effect for this cycle.
    pub interval_ms: u16,
    epoch: u64,
}

impl Stamp {
    /// Delay before the next cycle.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.interval_ms))
    }
}

/// Shared, synchronized session state.
#[derive(Debug)]
pub struct Session {
    device_id: u8,
    state: Mutex<SessionState>,
    link_tx: watch::Sender<LinkState>,
    events: EventDispatcher,
}

impl Session {
    /// Create a session in the initial `Advertising` state.
    ///
    /// A zero `sampling_interval_ms` falls back to the default cadence.
    pub fn new(device_id: u8, sampling_interval_ms: u16) -> Self {
        let interval = if sampling_interval_ms == 0 {
            crate::config::DEFAULT_SAMPLING_INTERVAL_MS
        } else {
            sampling_interval_ms
        };
        let (link_tx, _) = watch::channel(LinkState::Advertising);
        Self {
            device_id,
            state: Mutex::new(SessionState::new(interval)),
            link_tx,
            events: EventDispatcher::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, link: LinkState) {
        self.link_tx.send_replace(link);
    }

    /// Device id stamped into frames.
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        *self.lock()
    }

    /// Current connectivity state.
    pub fn link_state(&self) -> LinkState {
        self.lock().link
    }

    /// Whether a peer is connected.
    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    /// Whether the node has powered down.
    pub fn is_asleep(&self) -> bool {
        self.lock().is_asleep()
    }

    /// Watch connectivity changes. The returned receiver has already seen
    /// the current state.
    pub fn watch_link(&self) -> watch::Receiver<LinkState> {
        self.link_tx.subscribe()
    }

    /// Event dispatcher shared by all node components.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to node events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    // --- Link events ---

    /// A peer connected (or subscribed, which some stacks report without
    /// a separate connect).
    pub fn on_connect(&self, peer: PeerHandle) -> Transition {
        let transition = {
            let mut state = self.lock();
            if state.is_asleep() {
                return Transition::Unchanged;
            }
            state.peer = Some(peer);
            state.dwell_ticks = 0;
            if state.is_connected() {
                Transition::Unchanged
            } else {
                state.link = LinkState::Connected;
                Transition::Connected
            }
        };

        if transition == Transition::Connected {
            info!("Connected to {}", peer);
            self.publish(LinkState::Connected);
            self.events.send(NodeEvent::Connected { peer });
        } else {
            debug!("Peer handle refreshed to {}", peer);
        }
        transition
    }

    /// The peer went away. Streaming is disarmed and the peer handle
    /// dropped, whatever the previous state.
    pub fn on_disconnect(&self) -> Transition {
        let transition = {
            let mut state = self.lock();
            if state.is_asleep() {
                return Transition::Unchanged;
            }
            state.streaming_armed = false;
            state.peer = None;
            if state.is_connected() {
                state.link = LinkState::Advertising;
                Transition::Disconnected
            } else {
                Transition::Unchanged
            }
        };

        if transition == Transition::Disconnected {
            info!("Disconnected, streaming disarmed");
            self.publish(LinkState::Advertising);
            self.events.send(NodeEvent::Disconnected);
        }
        transition
    }

    // --- Commands ---

    /// Re-zero the timestamp and arm streaming.
    ///
    /// Arming only happens inside a live connection; outside one the
    /// timestamp is still re-zeroed. Returns whether streaming is armed.
    pub fn resync(&self) -> bool {
        let armed = {
            let mut state = self.lock();
            if state.is_asleep() {
                return false;
            }
            state.next_timestamp_ms = 0;
            state.resync_epoch += 1;
            state.streaming_armed = state.is_connected();
            state.streaming_armed
        };

        if armed {
            info!("Resync: timestamp zeroed, streaming armed");
        } else {
            debug!("Resync outside a connection: timestamp zeroed, not armed");
        }
        self.events.send(NodeEvent::Resynced);
        armed
    }

    /// Change the sampling interval. Zero is rejected and leaves the
    /// interval unchanged. Returns the previous interval on success.
    pub fn set_sampling_interval(&self, interval_ms: u16) -> Option<u16> {
        if interval_ms == 0 {
            return None;
        }
        let previous = {
            let mut state = self.lock();
            if state.is_asleep() {
                return None;
            }
            std::mem::replace(&mut state.sampling_interval_ms, interval_ms)
        };

        info!("Sampling interval {}ms -> {}ms", previous, interval_ms);
        self.events.send(NodeEvent::IntervalChanged { interval_ms });
        Some(previous)
    }

    /// Enter the terminal deep-sleep state. Returns `true` only for the
    /// call that performed the transition.
    pub fn enter_deep_sleep(&self, cause: SleepCause) -> bool {
        {
            let mut state = self.lock();
            if state.is_asleep() {
                return false;
            }
            state.link = LinkState::DeepSleep { cause };
            state.streaming_armed = false;
            state.peer = None;
        }

        info!("Entering deep sleep ({})", cause);
        self.publish(LinkState::DeepSleep { cause });
        self.events.send(NodeEvent::DeepSleep { cause });
        true
    }

    // --- Power policy ---

    /// Count one advertising tick. Returns the dwell count, or `None` if
    /// the node is not advertising.
    pub fn tick_dwell(&self) -> Option<u32> {
        let mut state = self.lock();
        if state.link != LinkState::Advertising {
            return None;
        }
        state.dwell_ticks = state.dwell_ticks.saturating_add(1);
        Some(state.dwell_ticks)
    }

    // --- Sampling pipeline ---

    /// Build a frame from `axes` at the current timestamp.
    ///
    /// Returns `None` when no peer is connected; the sample is dropped.
    pub fn stamp(&self, axes: [f32; AXIS_COUNT]) -> Option<Stamp> {
        let state = self.lock();
        if !state.is_connected() {
            return None;
        }
        let deliver_to = if state.streaming_armed { state.peer } else { None };
        Some(Stamp {
            frame: SampleFrame::new(self.device_id, state.next_timestamp_ms, axes),
            deliver_to,
            interval_ms: state.sampling_interval_ms,
            epoch: state.resync_epoch,
        })
    }

    /// Whether `stamp` may still go out: no resync, disconnect or deep
    /// sleep happened since it was taken.
    pub fn is_current(&self, stamp: &Stamp) -> bool {
        let state = self.lock();
        stamp.deliver_to.is_some()
            && state.streaming_armed
            && state.peer == stamp.deliver_to
            && state.resync_epoch == stamp.epoch
    }

    /// Advance the timestamp by the stamp's interval.
    ///
    /// Runs whether or not the frame was sent. A resync that landed after
    /// the stamp was taken wins: the zeroed timestamp is left alone.
    pub fn advance(&self, stamp: &Stamp) {
        let mut state = self.lock();
        if state.is_asleep() || state.resync_epoch != stamp.epoch {
            return;
        }
        state.next_timestamp_ms = state
            .next_timestamp_ms
            .wrapping_add(u32::from(stamp.interval_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AXES: [f32; AXIS_COUNT] = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

    fn connected() -> Session {
        let session = Session::new(b'J', 50);
        session.on_connect(PeerHandle(1));
        session
    }

    /// Stamp and advance, returning the frame's timestamp and whether it
    /// would have been sent.
    fn cycle(session: &Session) -> Option<(u32, bool)> {
        let stamp = session.stamp(AXES)?;
        session.advance(&stamp);
        Some((stamp.frame.timestamp_ms, stamp.deliver_to.is_some()))
    }

    #[test]
    fn test_initial_state() {
        let state = Session::new(b'J', 50).snapshot();
        assert_eq!(state.link, LinkState::Advertising);
        assert!(!state.streaming_armed);
        assert_eq!(state.sampling_interval_ms, 50);
        assert_eq!(state.next_timestamp_ms, 0);
        assert_eq!(state.peer, None);
    }

    #[test]
    fn test_zero_initial_interval_falls_back() {
        let session = Session::new(b'J', 0);
        assert_eq!(session.snapshot().sampling_interval_ms, 50);
    }

    #[test]
    fn test_connect_records_peer_and_clears_dwell() {
        let session = Session::new(b'J', 50);
        session.tick_dwell();
        session.tick_dwell();
        assert_eq!(session.snapshot().dwell_ticks, 2);

        assert_eq!(session.on_connect(PeerHandle(7)), Transition::Connected);
        let state = session.snapshot();
        assert_eq!(state.link, LinkState::Connected);
        assert_eq!(state.peer, Some(PeerHandle(7)));
        assert_eq!(state.dwell_ticks, 0);
    }

    #[test]
    fn test_subscribe_after_connect_is_unchanged() {
        let session = connected();
        assert_eq!(session.on_connect(PeerHandle(1)), Transition::Unchanged);
        assert!(session.is_connected());
    }

    #[test]
    fn test_disconnect_always_disarms() {
        let session = connected();
        assert!(session.resync());
        assert!(session.snapshot().streaming_armed);

        assert_eq!(session.on_disconnect(), Transition::Disconnected);
        let state = session.snapshot();
        assert!(!state.streaming_armed);
        assert_eq!(state.peer, None);
        assert_eq!(state.link, LinkState::Advertising);

        // A stray second disconnect is harmless.
        assert_eq!(session.on_disconnect(), Transition::Unchanged);
        assert!(!session.snapshot().streaming_armed);
    }

    #[test]
    fn test_resync_outside_connection_does_not_arm() {
        let session = Session::new(b'J', 50);
        assert!(!session.resync());
        assert!(!session.snapshot().streaming_armed);
    }

    #[test]
    fn test_frames_only_sent_when_armed() {
        let session = connected();
        assert_eq!(cycle(&session), Some((0, false)));
        assert_eq!(cycle(&session), Some((50, false)));

        session.resync();
        assert_eq!(cycle(&session), Some((0, true)));
        assert_eq!(cycle(&session), Some((50, true)));
    }

    #[test]
    fn test_pre_arm_drift_accumulates() {
        let session = connected();
        for _ in 0..4 {
            cycle(&session);
        }
        assert_eq!(session.snapshot().next_timestamp_ms, 200);
    }

    #[test]
    fn test_double_resync_equals_single() {
        let a = connected();
        let b = connected();
        for s in [&a, &b] {
            cycle(s);
            cycle(s);
        }
        a.resync();
        b.resync();
        b.resync();
        assert_eq!(cycle(&a), cycle(&b));
        assert_eq!(cycle(&a), Some((50, true)));
        assert_eq!(cycle(&b), Some((50, true)));
    }

    #[test]
    fn test_resync_between_stamp_and_advance_wins() {
        let session = connected();
        session.resync();
        cycle(&session);

        let stamp = session.stamp(AXES).unwrap();
        assert_eq!(stamp.frame.timestamp_ms, 50);
        session.resync();
        session.advance(&stamp);

        assert_eq!(cycle(&session), Some((0, true)));
    }

    #[test]
    fn test_interval_change_sets_delta() {
        let session = connected();
        session.resync();
        assert_eq!(cycle(&session), Some((0, true)));
        assert_eq!(cycle(&session), Some((50, true)));

        assert_eq!(session.set_sampling_interval(100), Some(50));
        let (t1, _) = cycle(&session).unwrap();
        let (t2, _) = cycle(&session).unwrap();
        let (t3, _) = cycle(&session).unwrap();
        assert_eq!(t1, 100);
        assert_eq!(t2 - t1, 100);
        assert_eq!(t3 - t2, 100);
    }

    #[test]
    fn test_zero_interval_is_ignored() {
        let session = connected();
        assert_eq!(session.set_sampling_interval(0), None);
        assert_eq!(session.snapshot().sampling_interval_ms, 50);
        assert_eq!(session.stamp(AXES).unwrap().delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_stamp_requires_connection() {
        let session = Session::new(b'J', 50);
        assert!(session.stamp(AXES).is_none());

        session.on_connect(PeerHandle(1));
        session.on_disconnect();
        assert!(session.stamp(AXES).is_none());
    }

    #[test]
    fn test_reconnect_requires_new_resync() {
        let session = connected();
        session.resync();
        session.on_disconnect();
        session.on_connect(PeerHandle(2));

        let (_, sent) = cycle(&session).unwrap();
        assert!(!sent);
    }

    #[test]
    fn test_dwell_only_counts_while_advertising() {
        let session = Session::new(b'J', 50);
        assert_eq!(session.tick_dwell(), Some(1));
        session.on_connect(PeerHandle(1));
        assert_eq!(session.tick_dwell(), None);
        session.on_disconnect();
        assert_eq!(session.tick_dwell(), Some(1));
    }

    #[test]
    fn test_deep_sleep_is_terminal() {
        let session = connected();
        session.resync();
        assert!(session.enter_deep_sleep(SleepCause::Command));
        assert!(!session.enter_deep_sleep(SleepCause::Inactivity));

        let frozen = session.snapshot();
        assert_eq!(
            frozen.link,
            LinkState::DeepSleep {
                cause: SleepCause::Command
            }
        );
        assert!(!frozen.streaming_armed);

        session.on_connect(PeerHandle(3));
        session.on_disconnect();
        session.resync();
        session.set_sampling_interval(10);
        assert_eq!(session.tick_dwell(), None);
        assert!(session.stamp(AXES).is_none());
        assert_eq!(session.snapshot(), frozen);
    }

    #[test]
    fn test_watch_sees_transitions() {
        let session = Session::new(b'J', 50);
        let mut link = session.watch_link();
        assert!(!link.has_changed().unwrap());

        session.on_connect(PeerHandle(1));
        assert!(link.has_changed().unwrap());
        assert_eq!(*link.borrow_and_update(), LinkState::Connected);

        session.on_disconnect();
        assert_eq!(*link.borrow_and_update(), LinkState::Advertising);
    }

    #[test]
    fn test_timestamp_wraps() {
        let session = connected();
        session.lock().next_timestamp_ms = u32::MAX - 10;
        cycle(&session);
        assert_eq!(session.snapshot().next_timestamp_ms, 39);
    }

    #[test]
    fn test_stamp_goes_stale() {
        let session = connected();
        assert!(!session.is_current(&session.stamp(AXES).unwrap()));

        session.resync();
        let stamp = session.stamp(AXES).unwrap();
        assert!(session.is_current(&stamp));
        session.resync();
        assert!(!session.is_current(&stamp));

        let stamp = session.stamp(AXES).unwrap();
        session.on_disconnect();
        session.on_connect(PeerHandle(1));
        assert!(!session.is_current(&stamp));

        session.resync();
        let stamp = session.stamp(AXES).unwrap();
        session.enter_deep_sleep(SleepCause::Command);
        assert!(!session.is_current(&stamp));
    }
}
