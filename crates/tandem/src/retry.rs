//! Bounded exponential-backoff retries for platform calls.
//!
//! One [`RetryPolicy`] serves every call site; the sync orchestrator derives
//! it from the task options. Delays follow
//! `min(base_delay * 2^attempt + jitter, max_delay)` with `jitter` drawn
//! uniformly from `[0, jitter_max]` and `jitter_max <= base_delay`, so the
//! schedule never decreases.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};
use rand::Rng;

use crate::platform::{AuthProvider, PlatformError, ProgressCallback, short_error_message};
use crate::sync::{
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS, MAX_BACKOFF_MS, SyncOptions, SyncProgress, emit,
};

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay.
    pub jitter_max: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_COUNT,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Policy with jitter up to half the base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter_max: base_delay / 2,
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    /// Policy for a task started with `options`.
    #[must_use]
    pub fn from_options(options: &SyncOptions) -> Self {
        Self::new(
            options.retry_count,
            Duration::from_millis(options.retry_delay_ms),
        )
    }

    /// Set the jitter bound. Values above `base_delay` are clamped to it.
    #[must_use]
    pub fn with_jitter_max(mut self, jitter_max: Duration) -> Self {
        self.jitter_max = jitter_max.min(self.base_delay);
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn effective_jitter_max(&self) -> Duration {
        self.jitter_max.min(self.base_delay)
    }

    /// Delay before retry number `attempt` (0-indexed) with the given jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exponential
            .saturating_add(jitter.min(self.effective_jitter_max()))
            .min(self.max_delay)
    }

    /// Largest delay retry number `attempt` can wait.
    #[must_use]
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, self.effective_jitter_max())
    }

    fn sample_jitter(&self) -> Duration {
        let max = self.effective_jitter_max().as_micros() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..=max))
    }

    /// The delay schedule as a backon builder.
    #[must_use]
    pub fn backoff(&self) -> PolicyBackoff {
        PolicyBackoff { policy: *self }
    }

    /// Run `operation`, retrying errors for which `is_retryable` holds.
    ///
    /// Each backoff emits [`SyncProgress::RetryBackoff`] and a debug log line.
    /// When retries run out the last error is returned.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        operation_name: &str,
        operation: F,
        is_retryable: C,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
        C: Fn(&E) -> bool,
    {
        let mut schedule = Schedule::new(self);
        schedule
            .run(operation_name, operation, is_retryable, on_progress)
            .await
    }

    /// Run a platform call with retries and one credential refresh.
    ///
    /// The first authentication failure triggers
    /// [`AuthProvider::refresh_if_needed`] and an immediate re-run outside the
    /// backoff schedule. Retries already spent stay spent. A second
    /// authentication failure is returned as a permanent 401.
    pub async fn execute_with_auth<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
        auth: Option<&dyn AuthProvider>,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let mut schedule = Schedule::new(self);
        let mut refreshed = false;
        loop {
            let outcome = schedule
                .run(
                    operation_name,
                    &mut operation,
                    PlatformError::is_retryable,
                    on_progress,
                )
                .await;

            match outcome {
                Err(err) if err.is_authentication() => {
                    let Some(auth) = auth else {
                        return Err(err);
                    };
                    if refreshed {
                        return Err(PlatformError::permanent(
                            401,
                            format!("still unauthorized after credential refresh: {err}"),
                        ));
                    }
                    tracing::debug!(
                        operation = operation_name,
                        attempts = schedule.attempts(),
                        "Credentials rejected, refreshing once"
                    );
                    auth.refresh_if_needed().await?;
                    refreshed = true;
                }
                other => return other,
            }
        }
    }
}

/// Retry state of one logical call: the remaining delays and the attempts
/// made so far. Survives a credential refresh.
struct Schedule {
    delays: PolicyDelays,
    attempt: AtomicU32,
}

impl Schedule {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            delays: policy.backoff().build(),
            attempt: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Run `operation` until it succeeds, fails for good, or the remaining
    /// delays run out.
    async fn run<T, E, F, Fut, C>(
        &mut self,
        operation_name: &str,
        mut operation: F,
        is_retryable: C,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
        C: Fn(&E) -> bool,
    {
        let attempt = &self.attempt;

        let retry_op = || {
            attempt.fetch_add(1, Ordering::SeqCst);
            operation()
        };

        retry_op
            .retry(&mut self.delays)
            .when(|err| is_retryable(err))
            .notify(|err, dur| {
                let current_attempt = attempt.load(Ordering::SeqCst);
                emit(
                    on_progress,
                    SyncProgress::RetryBackoff {
                        operation: operation_name.to_string(),
                        attempt: current_attempt,
                        delay_ms: dur.as_millis() as u64,
                        error: short_error_message(err),
                    },
                );
                tracing::debug!(
                    operation = operation_name,
                    attempt = current_attempt,
                    delay_ms = dur.as_millis() as u64,
                    "Retrying after error: {}",
                    short_error_message(err)
                );
            })
            .await
    }
}

/// Backon builder producing a [`RetryPolicy`] delay schedule.
#[derive(Debug, Clone, Copy)]
pub struct PolicyBackoff {
    policy: RetryPolicy,
}

impl BackoffBuilder for PolicyBackoff {
    type Backoff = PolicyDelays;

    fn build(self) -> Self::Backoff {
        PolicyDelays {
            policy: self.policy,
            attempt: 0,
        }
    }
}

/// Iterator over the delays of one retried operation.
#[derive(Debug, Clone)]
pub struct PolicyDelays {
    policy: RetryPolicy,
    attempt: u32,
}

impl Iterator for PolicyDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_retries {
            return None;
        }
        let delay = self
            .policy
            .delay_for(self.attempt, self.policy.sample_jitter());
        self.attempt += 1;
        Some(delay)
    }
}
