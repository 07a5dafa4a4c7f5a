use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::error::{Retryable, StepError};
use crate::store::{JobStatus, StepStore};

/// Attempt budget and pacing for every step run by a [`StepRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on a single attempt.
    pub step_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            step_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): doubles each time, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Runs named steps of a job, reusing outputs recorded by earlier runs.
#[derive(Clone)]
pub struct StepRunner {
    store: Arc<dyn StepStore>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StepRunner {
    #[must_use]
    pub fn new(store: Arc<dyn StepStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn StepStore> {
        &self.store
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `step` of `job_id`, or return its recorded output if it already completed.
    ///
    /// Each attempt is bounded by the policy's step timeout. Retryable errors and
    /// timeouts are retried with backoff until the attempt budget is spent. The
    /// output is recorded only on success.
    ///
    /// # Errors
    ///
    /// Returns the step's last error, a timeout, or a store/codec failure.
    pub async fn run_step<T, E, F, Fut>(
        &self,
        job_id: &str,
        step: &str,
        mut f: F,
    ) -> Result<T, StepError<E>>
    where
        T: Serialize + DeserializeOwned,
        E: std::error::Error + Retryable + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = tracing::info_span!("step", job_id, step);
        async {
            if let Some(recorded) = self.store.load_output(job_id, step).await? {
                tracing::debug!("reusing recorded step output");
                return serde_json::from_value(recorded).map_err(|source| StepError::Codec {
                    step: step.to_owned(),
                    source,
                });
            }

            let max_attempts = self.policy.max_attempts.max(1);
            let mut attempt = 0;
            loop {
                attempt += 1;
                match tokio::time::timeout(self.policy.step_timeout, f()).await {
                    Ok(Ok(value)) => {
                        let encoded =
                            serde_json::to_value(&value).map_err(|source| StepError::Codec {
                                step: step.to_owned(),
                                source,
                            })?;
                        self.store.save_output(job_id, step, encoded).await?;
                        tracing::info!(attempt, "step completed");
                        return Ok(value);
                    }
                    Ok(Err(e)) => {
                        if !e.is_retryable() || attempt >= max_attempts {
                            tracing::error!(attempt, error = %e, "step failed");
                            return Err(StepError::Failed {
                                step: step.to_owned(),
                                attempts: attempt,
                                source: e,
                            });
                        }
                        tracing::warn!(attempt, max_attempts, error = %e, "step attempt failed, retrying");
                    }
                    Err(_) => {
                        if attempt >= max_attempts {
                            tracing::error!(attempt, "step timed out");
                            return Err(StepError::TimedOut {
                                step: step.to_owned(),
                                attempts: attempt,
                            });
                        }
                        tracing::warn!(attempt, max_attempts, "step attempt timed out, retrying");
                    }
                }
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }
        .instrument(span)
        .await
    }

    /// Record `job_id` as running, await `job`, then record the outcome.
    ///
    /// # Errors
    ///
    /// Returns the job's own error, or a store error if the status cannot be written.
    pub async fn track_job<T, E, Fut>(
        &self,
        job_id: &str,
        kind: &str,
        job: Fut,
    ) -> Result<T, StepError<E>>
    where
        E: std::fmt::Display,
        Fut: Future<Output = Result<T, StepError<E>>>,
    {
        self.store
            .set_status(job_id, kind, JobStatus::Running)
            .await?;

        let result = job.await;
        let status = match &result {
            Ok(_) => JobStatus::Completed,
            Err(e) => JobStatus::Failed {
                step: e.step().unwrap_or("unknown").to_owned(),
                error: e.to_string(),
            },
        };

        match self.store.set_status(job_id, kind, status).await {
            Ok(()) => result,
            Err(store_err) => {
                tracing::warn!(job_id, error = %store_err, "failed to record job status");
                // A job error is more useful to the caller than the status write error.
                result.and(Err(store_err.into()))
            }
        }
    }
}
