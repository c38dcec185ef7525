//! Delivery Engine
//!
//! Consumes [`NotificationJob`]s, performs one attempt per job and decides
//! the next state through the [`RetryPolicy`]. Retries are re-enqueued after
//! their backoff delay; the persisted `next_attempt_at` lets
//! [`DeliveryEngine::resume_pending`] rebuild the schedule after a restart.
//!
//! Rows that never reached the queue (dispatch overflow, a dropped retry
//! timer) are picked up by [`DeliveryEngine::run_recovery`], which rescans
//! pending rows every `scan_interval`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use super::dispatcher::NotificationJob;
use super::error::NotificationError;
use super::notifier::Notifier;
use super::policy::{AttemptDecision, RetryPolicy};
use super::store::NotificationStore;
use super::types::NotificationId;
use crate::account::AccountStore;

/// Configuration for the delivery engine
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub policy: RetryPolicy,
    /// Maximum pending rows reloaded by one recovery scan
    pub recovery_batch_size: usize,
    /// How often to rescan for pending rows nobody is working on
    pub scan_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            recovery_batch_size: 1000,
            scan_interval: Duration::from_secs(30),
        }
    }
}

/// Jobs may arrive slightly before `next_attempt_at` due to timer granularity
const EARLY_ARRIVAL_TOLERANCE: Duration = Duration::from_millis(50);

/// Result of one call to [`DeliveryEngine::attempt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Decided(AttemptDecision),
    /// Row already terminal, or another worker recorded this attempt first
    Skipped,
    /// Backoff not elapsed yet; nothing was sent. The row's own retry timer
    /// or the recovery scan owns the next attempt, so the job is dropped.
    NotDue(Duration),
}

pub struct DeliveryEngine {
    store: Arc<dyn NotificationStore>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    config: DeliveryConfig,
    queue: mpsc::Sender<NotificationJob>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        config: DeliveryConfig,
        queue: mpsc::Sender<NotificationJob>,
    ) -> Self {
        Self {
            store,
            accounts,
            notifier,
            config,
            queue,
        }
    }

    /// Perform a single delivery attempt and persist its outcome
    pub async fn attempt(&self, id: NotificationId) -> Result<AttemptOutcome, NotificationError> {
        let notification = self
            .store
            .get_notification(id)
            .await?
            .ok_or(NotificationError::NotFound(id))?;

        if notification.status.is_terminal() {
            debug!(notification_id = %id, status = %notification.status, "Skipping finished notification");
            return Ok(AttemptOutcome::Skipped);
        }

        if let Some(at) = notification.next_attempt_at {
            if let Ok(remaining) = (at - Utc::now()).to_std() {
                if remaining > EARLY_ARRIVAL_TOLERANCE {
                    debug!(
                        notification_id = %id,
                        remaining_ms = remaining.as_millis() as u64,
                        "Notification not due yet"
                    );
                    return Ok(AttemptOutcome::NotDue(remaining));
                }
            }
        }

        let result = match self.accounts.get(notification.recipient_id).await {
            Ok(Some(account)) => self
                .notifier
                .send(&account.email, &notification.message)
                .await
                .map_err(|e| e.to_string()),
            Ok(None) => Err(format!(
                "Recipient account {} not found",
                notification.recipient_id
            )),
            Err(e) => Err(e.to_string()),
        };

        let delivered = result.is_ok();
        let response = match result {
            Ok(body) => body,
            Err(message) => message,
        };

        let (decision, update) = self.config.policy.update_for(
            notification.attempts,
            delivered,
            response,
            Utc::now(),
        );

        if !self
            .store
            .record_attempt(id, notification.attempts, &update)
            .await?
        {
            debug!(notification_id = %id, "Attempt already recorded elsewhere");
            return Ok(AttemptOutcome::Skipped);
        }

        match decision {
            AttemptDecision::Sent => info!(
                notification_id = %id,
                transaction_id = %notification.transaction_id,
                attempts = update.attempts,
                "Notification sent"
            ),
            AttemptDecision::RetryAfter(delay) => warn!(
                notification_id = %id,
                attempts = update.attempts,
                retry_in_secs = delay.as_secs(),
                response = %update.response,
                "Notification attempt failed, will retry"
            ),
            AttemptDecision::Failed => error!(
                notification_id = %id,
                transaction_id = %notification.transaction_id,
                attempts = update.attempts,
                response = %update.response,
                "Notification failed permanently"
            ),
        }

        Ok(AttemptOutcome::Decided(decision))
    }

    /// Re-enqueue `job` after `delay`
    pub fn schedule(&self, job: NotificationJob, delay: Duration) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if queue.send(job).await.is_err() {
                warn!(
                    notification_id = %job.notification_id,
                    "Notification queue closed, retry left pending for recovery"
                );
            }
        });
    }

    async fn process(&self, job: NotificationJob) {
        match self.attempt(job.notification_id).await {
            Ok(AttemptOutcome::Decided(AttemptDecision::RetryAfter(delay))) => {
                self.schedule(job, delay);
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    notification_id = %job.notification_id,
                    error = %e,
                    "Notification attempt could not be recorded"
                );
            }
        }
    }

    /// Consume jobs until every sender is dropped
    pub async fn run(self: Arc<Self>, mut jobs: mpsc::Receiver<NotificationJob>) {
        info!(
            max_attempts = self.config.policy.max_attempts,
            "Starting notification delivery engine"
        );

        while let Some(job) = jobs.recv().await {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.process(job).await;
            });
        }

        info!("Notification delivery engine stopped");
    }

    /// Re-schedule pending notifications left over from a previous run
    pub async fn resume_pending(&self) -> Result<usize, NotificationError> {
        let pending = self
            .store
            .find_pending(self.config.recovery_batch_size)
            .await?;

        if pending.is_empty() {
            debug!("No pending notifications to resume");
            return Ok(0);
        }

        let now = Utc::now();
        for notification in &pending {
            let delay = notification
                .next_attempt_at
                .and_then(|at| (at - now).to_std().ok())
                .unwrap_or(Duration::ZERO);
            self.schedule(
                NotificationJob {
                    notification_id: notification.id,
                },
                delay,
            );
        }

        info!(count = pending.len(), "Resumed pending notifications");
        Ok(pending.len())
    }

    /// One recovery pass over pending rows.
    ///
    /// A row is re-enqueued only when it was already due at the previous
    /// pass and its attempt count has not moved since; rows that are merely
    /// waiting in the queue or in a retry timer are left alone. `stalled`
    /// carries the due set between passes. Returns the number re-enqueued.
    pub async fn sweep(
        &self,
        stalled: &mut HashMap<NotificationId, u32>,
    ) -> Result<usize, NotificationError> {
        let pending = self
            .store
            .find_pending(self.config.recovery_batch_size)
            .await?;

        let now = Utc::now();
        let mut due = HashMap::with_capacity(pending.len());
        let mut requeued = 0;
        let mut queue_full = false;

        for notification in pending
            .iter()
            .filter(|n| n.next_attempt_at.is_none_or(|at| at <= now))
        {
            due.insert(notification.id, notification.attempts);
            if queue_full || stalled.get(&notification.id) != Some(&notification.attempts) {
                continue;
            }

            let job = NotificationJob {
                notification_id: notification.id,
            };
            match self.queue.try_send(job) {
                Ok(()) => requeued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        notification_id = %notification.id,
                        "Notification queue full, recovery continues next scan"
                    );
                    queue_full = true;
                }
                Err(TrySendError::Closed(_)) => return Err(NotificationError::QueueClosed),
            }
        }

        *stalled = due;
        if requeued > 0 {
            info!(count = requeued, "Re-enqueued stalled notifications");
        }
        Ok(requeued)
    }

    /// Rescan pending rows every `scan_interval` for as long as the queue is open
    pub async fn run_recovery(self: Arc<Self>) {
        info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            batch_size = self.config.recovery_batch_size,
            "Starting notification recovery scan"
        );

        let mut stalled = HashMap::new();
        loop {
            tokio::time::sleep(self.config.scan_interval).await;
            match self.sweep(&mut stalled).await {
                Ok(_) => {}
                Err(NotificationError::QueueClosed) => {
                    info!("Notification queue closed, recovery scan stopped");
                    return;
                }
                Err(e) => error!(error = %e, "Notification recovery scan failed"),
            }
        }
    }
}
