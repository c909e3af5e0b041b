//! Retry policy for transient outbound failures.
//!
//! Only the transient classes (timeout, 429, 5xx, network) retry, and the
//! waits between attempts double each time under a hard cap. The schedule
//! is widened by a jitter fraction so callers that fail together do not
//! retry together. A downstream `Retry-After` hint, when present, takes
//! precedence over the computed wait (callers use the larger of the two).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default first-retry delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 300;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
/// Default jitter fraction (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Doubling stops here; the cap applies long before 2^20 anyway.
const MAX_DOUBLINGS: u32 = 20;

/// Retry parameters for one class of outbound call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First-retry delay in ms (default: 300).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in ms (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter fraction 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// The capped doubling schedule before jitter, in milliseconds.
    fn step_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.min(MAX_DOUBLINGS));
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }

    /// Wait before retry number `attempt` (zero-based), widened upward by
    /// the jitter fraction.
    ///
    /// Deterministic: the full jitter band is always added, which keeps
    /// the wait an upper bound and still spreads callers whose schedules
    /// differ. Callers that want a spread within the band use
    /// [`delay_within_band`](Self::delay_within_band).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let step = self.step_ms(attempt) as f64;
        Duration::from_millis(step.mul_add(self.jitter_factor, step).round() as u64)
    }

    /// Wait before retry `attempt`, placed inside the symmetric jitter
    /// band by `unit` (a value in `[0.0, 1.0]`, e.g. from a PRNG).
    ///
    /// `unit = 0.0` lands at the low edge of the band, `0.5` on the bare
    /// schedule, `1.0` at the high edge.
    #[must_use]
    pub fn delay_within_band(&self, attempt: u32, unit: f64) -> Duration {
        let step = self.step_ms(attempt) as f64;
        let band = step * self.jitter_factor;
        let low = (step - band).max(0.0);
        let chosen = band.mul_add(2.0 * unit.clamp(0.0, 1.0), low);
        Duration::from_millis(chosen.round() as u64)
    }
}

/// Interpret a `Retry-After` HTTP header.
///
/// Accepts delta-seconds (`"120"`) or an HTTP-date; a date in the past
/// yields zero. Unparseable values yield `None`.
#[must_use]
pub fn retry_after_hint(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok().map(Duration::from_secs);
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.signed_duration_since(chrono::Utc::now());
    Some(remaining.to_std().unwrap_or(Duration::ZERO))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
