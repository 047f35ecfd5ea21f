use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::debug;

use crate::model::Remote;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

const BACKOFF_MULTIPLIER: u32 = 2;
const JITTER_RATIO: f64 = 0.2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// Doubles the delay after each failed attempt, up to `max_delay`.
    pub backoff: bool,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            backoff: false,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
        }
    }
}

struct BackoffState {
    current: Option<Duration>,
}

impl BackoffState {
    fn new() -> Self {
        Self { current: None }
    }

    fn next_delay(&mut self, policy: &ReconnectPolicy) -> Duration {
        let next = match self.current {
            Some(current) if policy.backoff => (current * BACKOFF_MULTIPLIER).min(policy.max_delay),
            _ => policy.delay,
        };
        self.current = Some(next);
        if policy.backoff {
            jitter(next)
        } else {
            next
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
    delay.mul_f64(factor)
}

struct Armed {
    deadline: Instant,
    backoff: BackoffState,
}

/// One retry timer per remote.
///
/// Once armed, a timer keeps firing at the policy's interval until the
/// remote reaches Ready and [`cancel`](Self::cancel) is called.
pub struct ReconnectScheduler {
    policy: ReconnectPolicy,
    armed: HashMap<Remote, Armed>,
}

impl ReconnectScheduler {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            armed: HashMap::new(),
        }
    }

    /// Arms the timer of `remote`. Returns `false` if it was already armed.
    pub fn arm(&mut self, remote: Remote) -> bool {
        if self.armed.contains_key(&remote) {
            return false;
        }
        let mut backoff = BackoffState::new();
        let delay = backoff.next_delay(&self.policy);
        debug!(%remote, ?delay, "Reconnect scheduled");
        self.armed.insert(
            remote,
            Armed {
                deadline: Instant::now() + delay,
                backoff,
            },
        );
        true
    }

    /// Disarms the timer of `remote`. Returns `false` if none was armed.
    pub fn cancel(&mut self, remote: Remote) -> bool {
        let cancelled = self.armed.remove(&remote).is_some();
        if cancelled {
            debug!(%remote, "Reconnect timer cancelled");
        }
        cancelled
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    pub fn is_armed(&self, remote: Remote) -> bool {
        self.armed.contains_key(&remote)
    }

    fn earliest(&self) -> Option<(Remote, Instant)> {
        self.armed
            .iter()
            .map(|(remote, armed)| (*remote, armed.deadline))
            .min_by_key(|(_, deadline)| *deadline)
    }

    /// Waits for the next timer to fire and re-schedules it.
    ///
    /// Never completes while nothing is armed. Dropping the future before
    /// it completes leaves the timers untouched.
    pub async fn expired(&mut self) -> Remote {
        let Some((remote, deadline)) = self.earliest() else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(deadline).await;

        if let Some(armed) = self.armed.get_mut(&remote) {
            let delay = armed.backoff.next_delay(&self.policy);
            armed.deadline = Instant::now() + delay;
        }
        remote
    }
}
