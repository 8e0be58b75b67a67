//! Adaptive request pacing for one remote API
//!
//! The limiter enforces a minimum delay between consecutive calls. APIs that
//! advertise their budget (e.g. CrossRef's `X-Rate-Limit-Limit: 50` and
//! `X-Rate-Limit-Interval: 1s`) tighten or relax that delay as responses
//! come in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Names of the response headers carrying pacing feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackHeaders {
    /// Header with the number of calls allowed per interval
    pub limit_header: String,
    /// Header with the interval length
    pub interval_header: String,
}

impl FeedbackHeaders {
    pub fn new(limit_header: impl Into<String>, interval_header: impl Into<String>) -> Self {
        Self {
            limit_header: limit_header.into().to_ascii_lowercase(),
            interval_header: interval_header.into().to_ascii_lowercase(),
        }
    }

    /// The header pair CrossRef sends with every response
    pub fn crossref() -> Self {
        Self::new("x-rate-limit-limit", "x-rate-limit-interval")
    }
}

/// Budget advertised by the remote API: `max_calls` per `interval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitFeedback {
    pub max_calls: u32,
    pub interval: Duration,
}

impl RateLimitFeedback {
    /// Read the feedback from lower-cased response headers.
    ///
    /// Returns `None` when either header is missing or malformed.
    pub fn from_headers(headers: &HashMap<String, String>, names: &FeedbackHeaders) -> Option<Self> {
        let max_calls = headers
            .get(&names.limit_header)?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|calls| *calls > 0)?;
        let interval = parse_interval(headers.get(&names.interval_header)?)?;

        Some(Self {
            max_calls,
            interval,
        })
    }

    /// Minimum spacing between calls, rounded up to the next millisecond
    pub fn delay(&self) -> Option<Duration> {
        if self.max_calls == 0 || self.interval.is_zero() {
            return None;
        }
        let millis = self.interval.as_millis().div_ceil(u128::from(self.max_calls));
        u64::try_from(millis).ok().map(Duration::from_millis)
    }
}

/// Parse an interval such as `1s`, `1500ms`, `2m`, or a bare number of seconds
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let raw = raw.trim().to_ascii_lowercase();
    let (number, unit) = match raw.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(split) => raw.split_at(split),
        None => (raw.as_str(), "s"),
    };
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let seconds = match unit.trim() {
        "ms" => value / 1_000.0,
        "s" | "sec" | "secs" => value,
        "m" | "min" => value * 60.0,
        "h" => value * 3_600.0,
        _ => return None,
    };

    Duration::try_from_secs_f64(seconds).ok()
}

struct LimiterState {
    last_call: Option<Instant>,
    delay: Duration,
}

/// Paces the calls made to one remote API.
///
/// Callers hold a [`RatePermit`] for the duration of their call, so one
/// limiter serializes its request stream and no two callers compute their
/// wait from the same stale timestamp.
pub struct RateLimiter {
    name: String,
    feedback: Option<FeedbackHeaders>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            feedback: None,
            state: Mutex::new(LimiterState {
                last_call: None,
                delay,
            }),
        }
    }

    /// Read pacing feedback from the given response headers
    pub fn with_feedback(mut self, headers: FeedbackHeaders) -> Self {
        self.feedback = Some(headers);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }

    /// Wait until the next call may start and reserve the request stream.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let state = self.state.lock().await;
        if let Some(last_call) = state.last_call {
            tokio::time::sleep_until(last_call + state.delay).await;
        }
        RatePermit {
            limiter: self,
            state,
        }
    }

    fn apply(&self, state: &mut LimiterState, feedback: RateLimitFeedback) {
        let Some(delay) = feedback.delay() else {
            return;
        };
        if delay != state.delay {
            debug!(
                api = %self.name,
                old_delay_ms = state.delay.as_millis() as u64,
                new_delay_ms = delay.as_millis() as u64,
                max_calls = feedback.max_calls,
                interval_ms = feedback.interval.as_millis() as u64,
                "Adjusted request pacing"
            );
            state.delay = delay;
        }
    }

    /// Apply feedback outside of a call
    pub async fn update(&self, feedback: RateLimitFeedback) {
        let mut state = self.state.lock().await;
        self.apply(&mut state, feedback);
    }
}

/// Exclusive right to make one call. Dropping it records the call time.
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
    state: MutexGuard<'a, LimiterState>,
}

impl RatePermit<'_> {
    /// Feed the response headers of the finished call back into the limiter.
    ///
    /// Missing or malformed feedback leaves the current delay untouched.
    pub fn observe(&mut self, headers: &HashMap<String, String>) {
        let Some(names) = &self.limiter.feedback else {
            return;
        };
        if let Some(feedback) = RateLimitFeedback::from_headers(headers, names) {
            self.limiter.apply(&mut self.state, feedback);
        }
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        self.state.last_call = Some(Instant::now());
    }
}
