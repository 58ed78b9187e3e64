//! Wait policies and the polling loop every engine wait is built on.
//!
//! Policies are plain `Copy` values handed to each call; nothing here holds
//! global timeout state.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use sturdy_common::{Locator, SturdyError};
use sturdy_config::{SettleSettings, WaitSettings};
use tokio::time::{sleep, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long to keep re-checking a condition, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    timeout: Duration,
    poll_interval: Duration,
}

impl WaitPolicy {
    /// Both durations must be non-zero.
    pub fn new(timeout: Duration, poll_interval: Duration) -> sturdy_common::Result<Self> {
        if timeout.is_zero() || poll_interval.is_zero() {
            return Err(SturdyError::Config(format!(
                "wait policy needs a positive timeout and poll interval, got {timeout:?}/{poll_interval:?}"
            )));
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }

    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> sturdy_common::Result<Self> {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_interval_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TryFrom<WaitSettings> for WaitPolicy {
    type Error = SturdyError;

    fn try_from(settings: WaitSettings) -> Result<Self, Self::Error> {
        Self::from_millis(settings.timeout_ms, settings.poll_interval_ms)
    }
}

/// Upper bound on waiting for a lazily rendered region to stop changing.
///
/// `max` replaces fixed sleeps: settling returns as soon as the region is
/// stable, and never later than `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub max: Duration,
    pub poll_interval: Duration,
}

impl SettlePolicy {
    /// The same budget expressed as a wait policy, used to probe optional
    /// controls that only exist while a region is still collapsed.
    pub fn as_wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: self.max.max(Duration::from_millis(1)),
            poll_interval: self.poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            max: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl From<SettleSettings> for SettlePolicy {
    fn from(settings: SettleSettings) -> Self {
        Self {
            max: Duration::from_millis(settings.max_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }
}

/// A predicate over live page state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// An element matching the locator exists in the DOM.
    Located(Locator),
    /// An element matching the locator exists and is displayed.
    Visible(Locator),
    UrlContains(String),
    TitleContains(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Located(l) => write!(f, "{l} is located"),
            Condition::Visible(l) => write!(f, "{l} is visible"),
            Condition::UrlContains(s) => write!(f, "url contains `{s}`"),
            Condition::TitleContains(s) => write!(f, "title contains `{s}`"),
        }
    }
}

/// Why [`poll_until`] gave up.
#[derive(Debug)]
pub enum PollError<E> {
    Timeout { elapsed: Duration },
    Probe(E),
}

/// Call `probe` every `poll_interval` until it yields a value, fails, or the
/// timeout elapses.
///
/// `Ok(None)` from the probe means "not yet". The last sleep is clamped to
/// the remaining budget, so a probe that never succeeds is abandoned close to
/// `timeout` and never later than `timeout + poll_interval`.
pub async fn poll_until<T, E, F, Fut>(policy: WaitPolicy, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();

    loop {
        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => return Err(PollError::Probe(e)),
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(PollError::Timeout { elapsed });
        }

        sleep(policy.poll_interval.min(policy.timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn rejects_zero_durations() {
        assert!(WaitPolicy::from_millis(0, 50).is_err());
        assert!(WaitPolicy::from_millis(500, 0).is_err());
        assert!(WaitPolicy::from_millis(500, 50).is_ok());
    }

    #[test]
    fn condition_display_is_readable() {
        assert_eq!(
            Condition::UrlContains("busca".into()).to_string(),
            "url contains `busca`"
        );
        assert_eq!(
            Condition::Visible(Locator::css(".flourish-embed")).to_string(),
            "css=.flourish-embed is visible"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_ready_value_without_sleeping() {
        let policy = WaitPolicy::from_millis(500, 50).unwrap();
        let start = Instant::now();
        let value = poll_until(policy, || async { Ok::<_, ()>(Some(7)) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(start.elapsed() < policy.poll_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_until_ready() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let policy = WaitPolicy::from_millis(1_000, 100).unwrap();
        let value = poll_until(policy, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>((n == 3).then_some(n))
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_poll_of_budget() {
        let policy = WaitPolicy::from_millis(500, 50).unwrap();
        let start = Instant::now();
        let err = poll_until(policy, || async { Ok::<Option<()>, ()>(None) })
            .await
            .unwrap_err();
        let waited = start.elapsed();
        assert!(matches!(err, PollError::Timeout { .. }));
        assert!(waited >= Duration::from_millis(500));
        assert!(waited < Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_stop_polling() {
        let policy = WaitPolicy::from_millis(500, 50).unwrap();
        let err = poll_until(policy, || async { Err::<Option<()>, _>("session lost") })
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Probe("session lost")));
    }
}
