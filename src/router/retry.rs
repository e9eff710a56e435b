//! Per-provider retry policy and exponential backoff

use crate::config::FallbackConfig;
use crate::error::{AppError, AppResult, ErrorKind};
use std::time::Duration;

/// Default attempts per provider before falling through
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;
/// Default base backoff in milliseconds (doubles each retry)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
/// Default multiplier for retries after an `Unavailable` failure
pub const DEFAULT_UNAVAILABLE_MULTIPLIER: u32 = 3;
/// Maximum backoff duration in milliseconds (30 seconds)
///
/// Prevents unbounded sleep from exponential overflow. With base=250ms the
/// cap is reached on the 8th retry, or the 6th after an outage (x3).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Bounded retry applied to each provider in turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per provider (at least 1)
    max_attempts: usize,
    /// Base backoff in milliseconds (doubles each retry)
    base_backoff_ms: u64,
    /// Extra factor applied after an `Unavailable` failure
    unavailable_multiplier: u32,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Errors
    /// Returns an error if `max_attempts` or `unavailable_multiplier` is 0
    pub fn new(
        max_attempts: usize,
        base_backoff_ms: u64,
        unavailable_multiplier: u32,
    ) -> Result<Self, &'static str> {
        if max_attempts == 0 {
            return Err("max_attempts must be at least 1");
        }
        if unavailable_multiplier == 0 {
            return Err("unavailable_multiplier must be at least 1");
        }
        Ok(Self {
            max_attempts,
            base_backoff_ms,
            unavailable_multiplier,
        })
    }

    pub fn from_config(config: &FallbackConfig) -> AppResult<Self> {
        Self::new(
            config.max_attempts_per_provider,
            config.retry_backoff_ms,
            config.unavailable_backoff_multiplier,
        )
        .map_err(|e| AppError::Config(format!("fallback: {}", e)))
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn base_backoff_ms(&self) -> u64 {
        self.base_backoff_ms
    }

    pub fn unavailable_multiplier(&self) -> u32 {
        self.unavailable_multiplier
    }

    /// Delay before retry number `retry` (1-indexed) after a failure of `kind`
    pub fn backoff(&self, retry: usize, kind: ErrorKind) -> Duration {
        Duration::from_millis(calculate_backoff(self, retry, kind))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            unavailable_multiplier: DEFAULT_UNAVAILABLE_MULTIPLIER,
        }
    }
}

/// Calculate exponential backoff with overflow protection
///
/// The formula is `base * 2^(retry-1)`, times the unavailable multiplier when
/// the previous failure was `Unavailable`, capped at [`MAX_BACKOFF_MS`].
///
/// With base=250ms:
/// - Retry 1: 250ms (750ms after an outage)
/// - Retry 2: 500ms (1500ms after an outage)
/// - Retry 3: 1000ms (3000ms after an outage)
pub fn calculate_backoff(policy: &RetryPolicy, retry: usize, kind: ErrorKind) -> u64 {
    let exponent = u32::try_from(retry).unwrap_or(u32::MAX).saturating_sub(1);
    let multiplier = match kind {
        ErrorKind::Unavailable => u64::from(policy.unavailable_multiplier),
        _ => 1,
    };
    policy
        .base_backoff_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .saturating_mul(multiplier)
        .min(MAX_BACKOFF_MS)
}
