//! Retry policy and attempt state machine

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AttemptUpdate, NotificationStatus};

/// Bounded retries with a fixed backoff schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `backoff[n - 1]`; the last entry repeats
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900),
            ],
        }
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    Sent,
    RetryAfter(Duration),
    Failed,
}

impl AttemptDecision {
    pub fn status(&self) -> NotificationStatus {
        match self {
            AttemptDecision::Sent => NotificationStatus::Sent,
            AttemptDecision::RetryAfter(_) => NotificationStatus::Pending,
            AttemptDecision::Failed => NotificationStatus::Failed,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Decide the next state given the attempt count *including* this attempt
    pub fn decide(&self, attempts: u32, delivered: bool) -> AttemptDecision {
        if delivered {
            AttemptDecision::Sent
        } else if attempts >= self.max_attempts {
            AttemptDecision::Failed
        } else {
            AttemptDecision::RetryAfter(self.delay_for(attempts))
        }
    }

    /// Build the persisted update for an attempt finished at `now`
    pub fn update_for(
        &self,
        previous_attempts: u32,
        delivered: bool,
        response: String,
        now: DateTime<Utc>,
    ) -> (AttemptDecision, AttemptUpdate) {
        let attempts = previous_attempts + 1;
        let decision = self.decide(attempts, delivered);

        let next_attempt_at = match decision {
            AttemptDecision::RetryAfter(delay) => chrono::Duration::from_std(delay)
                .ok()
                .map(|d| now + d),
            _ => None,
        };

        let update = AttemptUpdate {
            attempts,
            status: decision.status(),
            response,
            next_attempt_at,
            sent_at: (decision == AttemptDecision::Sent).then_some(now),
            failed_at: (decision == AttemptDecision::Failed).then_some(now),
            at: now,
        };
        (decision, update)
    }
}

/// Notifier / retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_secs: Vec<u64>,
    /// Capacity of the in-process job queue
    pub queue_size: usize,
    /// Period of the stalled-row recovery scan
    pub recovery_scan_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: "https://util.devi.tools/api/v1/notify".to_string(),
            timeout_ms: 10_000,
            max_attempts: 3,
            backoff_secs: vec![60, 300, 900],
            queue_size: 1024,
            recovery_scan_secs: 30,
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn recovery_scan_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_scan_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
        )
    }
}
