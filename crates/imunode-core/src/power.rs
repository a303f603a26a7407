//! Power management policy.
//!
//! While advertising the node blinks its connectivity LED once per dwell
//! tick and counts the ticks. Reaching the threshold without a connection
//! puts the node into deep sleep. The count is cleared on every connect.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::session::{LinkState, Session, SleepCause};
use crate::traits::Indicator;

/// How an advertising phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseOutcome {
    /// A peer connected.
    Connected,
    /// The node entered deep sleep.
    Asleep(SleepCause),
}

/// Inactivity-driven power-down policy.
pub struct PowerPolicy<I> {
    session: Arc<Session>,
    indicator: Arc<I>,
    tick: Duration,
    threshold: u32,
}

impl<I: Indicator> PowerPolicy<I> {
    /// Create a policy using the dwell tick and threshold from `config`.
    pub fn new(session: Arc<Session>, indicator: Arc<I>, config: &NodeConfig) -> Self {
        Self {
            session,
            indicator,
            tick: config.dwell_tick,
            threshold: config.sleep_after_ticks,
        }
    }

    /// Wait in the advertising state until a peer connects or the node
    /// sleeps.
    ///
    /// Returns immediately if the node is already connected or asleep.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first.
    pub async fn await_connection(&self, cancel: &CancellationToken) -> Result<AdvertiseOutcome> {
        let mut link = self.session.watch_link();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut led_on = true;

        loop {
            match *link.borrow_and_update() {
                LinkState::Connected => return Ok(AdvertiseOutcome::Connected),
                LinkState::DeepSleep { cause } => return Ok(AdvertiseOutcome::Asleep(cause)),
                LinkState::Advertising => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {
                    led_on = !led_on;
                    self.indicator.set_connectivity_led(led_on);
                    self.on_tick();
                }
                changed = link.changed() => {
                    if changed.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }

    fn on_tick(&self) {
        let Some(dwell) = self.session.tick_dwell() else {
            return;
        };
        if dwell >= self.threshold {
            info!("No connection after {} ticks, powering down", dwell);
            self.session.enter_deep_sleep(SleepCause::Inactivity);
        } else if dwell % 60 == 0 {
            debug!("Advertising for {} ticks", dwell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::PeerHandle;
    use crate::mock::MockIndicator;

    fn policy(threshold: u32) -> (Arc<Session>, Arc<MockIndicator>, PowerPolicy<MockIndicator>) {
        let session = Arc::new(Session::new(b'J', 50));
        let indicator = Arc::new(MockIndicator::new());
        let config = NodeConfig::default().sleep_after_ticks(threshold);
        let policy = PowerPolicy::new(Arc::clone(&session), Arc::clone(&indicator), &config);
        (session, indicator, policy)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_after_threshold() {
        let (session, indicator, policy) = policy(600);
        let start = tokio::time::Instant::now();

        let outcome = policy.await_connection(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, AdvertiseOutcome::Asleep(SleepCause::Inactivity));
        assert_eq!(start.elapsed(), Duration::from_secs(600));
        assert_eq!(indicator.history().len(), 600);
        assert_eq!(indicator.toggle_count(), 599);
        assert!(session.is_asleep());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_ends_wait_and_clears_dwell() {
        let (session, _, policy) = policy(600);

        let peer_session = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            peer_session.on_connect(PeerHandle(1));
        });

        let outcome = policy.await_connection(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, AdvertiseOutcome::Connected);
        assert_eq!(session.snapshot().dwell_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_immediately_when_asleep() {
        let (session, indicator, policy) = policy(600);
        session.enter_deep_sleep(SleepCause::Command);

        let outcome = policy.await_connection(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, AdvertiseOutcome::Asleep(SleepCause::Command));
        assert!(indicator.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (_, _, policy) = policy(600);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            policy.await_connection(&cancel).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dwell_resumes_after_disconnect() {
        let (session, _, policy) = policy(5);
        session.on_connect(PeerHandle(1));
        session.on_disconnect();
        let start = tokio::time::Instant::now();

        let outcome = policy.await_connection(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, AdvertiseOutcome::Asleep(SleepCause::Inactivity));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
