use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::state::SessionState;

/// Shortest polling period; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Message from the timeout guard to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSignal {
    /// The decoder has been silent for longer than the silence timeout
    SilenceTimeout { idle: Duration },
}

/// Watchdog over decoder activity for one session
///
/// Polls every `interval`. While the session is in a watched state and the
/// last decoder activity is older than `silence_timeout`, it signals the
/// session once; a new stall can only be reported after fresh activity.
/// Exits as soon as the session leaves the watched states.
pub struct TimeoutGuard {
    request_id: String,
    silence_timeout: Duration,
    interval: Duration,
    activity: watch::Receiver<Instant>,
    state: watch::Receiver<SessionState>,
    signals: mpsc::Sender<GuardSignal>,
}

impl TimeoutGuard {
    pub fn new(
        request_id: String,
        silence_timeout: Duration,
        interval: Duration,
        activity: watch::Receiver<Instant>,
        state: watch::Receiver<SessionState>,
        signals: mpsc::Sender<GuardSignal>,
    ) -> Self {
        Self {
            request_id,
            silence_timeout,
            interval: interval.max(MIN_INTERVAL),
            activity,
            state,
            signals,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fired_at: Option<Instant> = None;

        loop {
            ticker.tick().await;

            // Session dropped its sender: nothing left to guard
            if self.state.has_changed().is_err() {
                break;
            }

            let state = *self.state.borrow();
            if !state.is_watched() {
                break;
            }

            let last_activity = *self.activity.borrow();
            if fired_at.is_some_and(|fired| last_activity > fired) {
                fired_at = None;
            }

            let idle = last_activity.elapsed();
            if fired_at.is_none() && idle > self.silence_timeout {
                warn!(
                    "{}: More than {:.1} seconds from last decoder activity, cancelling",
                    self.request_id,
                    self.silence_timeout.as_secs_f64()
                );
                fired_at = Some(Instant::now());

                if self
                    .signals
                    .send(GuardSignal::SilenceTimeout { idle })
                    .await
                    .is_err()
                {
                    break;
                }
            }

            debug!("{}: Waiting for decoder end", self.request_id);
        }

        debug!("{}: Timeout guard stopped", self.request_id);
    }
}
