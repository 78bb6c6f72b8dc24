//! Reconnection with exponential backoff and outbox replay.

use std::time::Duration;

use chatverse_proto::frame::ClientFrame;
use chatverse_proto::id::CorrelationId;

use crate::backend::{Backend, BackendError};
use crate::config::ClientConfig;
use crate::error::ClientError;

use super::ChatClient;

/// Backoff schedule for reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the second attempt (the first is immediate).
    pub base_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Builds a policy from the resolved client configuration.
    #[must_use]
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self {
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay,
            max_attempts: config.reconnect_max_attempts,
        }
    }

    /// Delay to wait after the given failed attempt (0-based): base
    /// doubled per attempt, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl<B: Backend> ChatClient<B> {
    /// Re-establishes the backend link, then replays the outbox.
    ///
    /// Attempts are spaced by [`ReconnectPolicy::delay_for`]. Queued
    /// frames flush in their original order; frames whose intent was
    /// cancelled while offline are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] once `max_attempts` have
    /// failed.
    pub async fn reconnect_with_backoff(
        &self,
        policy: &ReconnectPolicy,
    ) -> Result<(), ClientError> {
        for attempt in 0..policy.max_attempts {
            match self.backend.reconnect().await {
                Ok(()) => {
                    tracing::info!(attempt, "backend link re-established");
                    return self.flush_outbox().await;
                }
                Err(e) => {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "reconnect failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(ClientError::Connection(format!(
            "reconnect gave up after {} attempts",
            policy.max_attempts
        )))
    }

    /// Replays queued frames in FIFO order, skipping cancelled intents.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] if the link drops mid-flush;
    /// the unsent remainder stays queued in order.
    pub async fn flush_outbox(&self) -> Result<(), ClientError> {
        loop {
            let Some((correlation_id, frame)) = self.next_queued() else {
                return Ok(());
            };
            match self.backend.send(frame.clone()).await {
                Ok(()) => {
                    tracing::debug!(correlation_id = %correlation_id, "queued frame flushed");
                }
                Err(BackendError::Disconnected) => {
                    self.outbox.lock().push_front((correlation_id, frame));
                    return Err(ClientError::Connection(
                        "link dropped while flushing outbox".into(),
                    ));
                }
                Err(BackendError::Rejected(reason)) => {
                    tracing::warn!(correlation_id = %correlation_id, reason, "queued frame rejected");
                }
            }
        }
    }

    /// Pops the next non-cancelled queued frame.
    fn next_queued(&self) -> Option<(CorrelationId, ClientFrame)> {
        let mut outbox = self.outbox.lock();
        let mut cancelled = self.cancelled.lock();
        while let Some((correlation_id, frame)) = outbox.pop_front() {
            if cancelled.remove(&correlation_id) {
                tracing::debug!(correlation_id = %correlation_id, "cancelled frame skipped");
                continue;
            }
            return Some((correlation_id, frame));
        }
        None
    }

    /// Number of frames waiting for the next flush.
    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.outbox.lock().len()
    }
}
