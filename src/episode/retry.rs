// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry policy for media downloads.
//!
//! The policy is a pure function from the number of attempts made so far
//! to either the delay before the next attempt or a decision to stop.

use std::time::Duration;

use crate::error::DownloadError;

/// Default maximum attempts, the initial one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for exponential delays
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles with every retry, capped at `max_delay`
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff: Backoff::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
            ..Self::default()
        }
    }

    /// Delay before the next attempt after `attempt` attempts have failed,
    /// or `None` once the attempts are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if attempt >= self.max_attempts {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        };
        Some(delay)
    }
}

/// Whether a download error is worth another attempt.
///
/// Transport failures and short bodies are; HTTP status errors and local
/// sink failures are terminal for the episode.
pub fn is_retryable(error: &DownloadError) -> bool {
    match error {
        DownloadError::Network { .. } | DownloadError::SizeMismatch { .. } => true,
        DownloadError::HttpStatus { .. }
        | DownloadError::Unresolved { .. }
        | DownloadError::Sink(_) => false,
    }
}
