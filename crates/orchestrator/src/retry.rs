//! Delay policy between in-process conversion attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait applied after a failed attempt before the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,

    Fixed { delay_ms: u64 },

    /// Doubles after every failure, capped at `max_ms`
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay after the failure of attempt `attempt` (zero-based)
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        let ms = match *self {
            Self::None => return None,
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { initial_ms, max_ms } => initial_ms
                .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
                .min(max_ms),
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    /// Sleep for the delay after attempt `attempt`, if any
    pub async fn wait(&self, attempt: u32) {
        if let Some(delay) = self.delay(attempt) {
            tokio::time::sleep(delay).await;
        }
    }
}
