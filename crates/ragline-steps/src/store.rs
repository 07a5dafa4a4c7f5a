use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::StepStoreError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed { step: String, error: String },
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: String,
    #[serde(flatten)]
    pub status: JobStatus,
    /// RFC 3339 timestamp of the last status change.
    pub updated_at: String,
}

/// Persistence for step outputs and job status.
///
/// Outputs are keyed by `(job_id, step)`; the first recorded output for a key wins.
pub trait StepStore: Send + Sync {
    fn load_output(
        &self,
        job_id: &str,
        step: &str,
    ) -> BoxFuture<'_, Result<Option<serde_json::Value>, StepStoreError>>;

    fn save_output(
        &self,
        job_id: &str,
        step: &str,
        output: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), StepStoreError>>;

    /// Names of the steps with a recorded output, in completion order.
    fn completed_steps(&self, job_id: &str) -> BoxFuture<'_, Result<Vec<String>, StepStoreError>>;

    fn set_status(
        &self,
        job_id: &str,
        kind: &str,
        status: JobStatus,
    ) -> BoxFuture<'_, Result<(), StepStoreError>>;

    fn job(&self, job_id: &str) -> BoxFuture<'_, Result<Option<JobRecord>, StepStoreError>>;

    /// Drop completed jobs last updated before `cutoff`, together with their step
    /// outputs. Running and failed jobs are kept so they can still be resumed.
    ///
    /// Returns the number of jobs removed.
    fn purge_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StepStoreError>>;
}

/// Fixed-width UTC timestamp, so stored values order correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

#[derive(Default)]
struct MemoryState {
    outputs: HashMap<(String, String), serde_json::Value>,
    order: HashMap<String, Vec<String>>,
    jobs: HashMap<String, JobRecord>,
}

/// Process-local [`StepStore`]; nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStepStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStepStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryStepStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStepStore").finish_non_exhaustive()
    }
}

impl StepStore for InMemoryStepStore {
    fn load_output(
        &self,
        job_id: &str,
        step: &str,
    ) -> BoxFuture<'_, Result<Option<serde_json::Value>, StepStoreError>> {
        let key = (job_id.to_owned(), step.to_owned());
        Box::pin(async move {
            let state = self.state.read().map_err(|_| StepStoreError::Poisoned)?;
            Ok(state.outputs.get(&key).cloned())
        })
    }

    fn save_output(
        &self,
        job_id: &str,
        step: &str,
        output: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), StepStoreError>> {
        let key = (job_id.to_owned(), step.to_owned());
        Box::pin(async move {
            let mut state = self.state.write().map_err(|_| StepStoreError::Poisoned)?;
            if state.outputs.contains_key(&key) {
                return Ok(());
            }
            state
                .order
                .entry(key.0.clone())
                .or_default()
                .push(key.1.clone());
            state.outputs.insert(key, output);
            Ok(())
        })
    }

    fn completed_steps(&self, job_id: &str) -> BoxFuture<'_, Result<Vec<String>, StepStoreError>> {
        let job_id = job_id.to_owned();
        Box::pin(async move {
            let state = self.state.read().map_err(|_| StepStoreError::Poisoned)?;
            Ok(state.order.get(&job_id).cloned().unwrap_or_default())
        })
    }

    fn set_status(
        &self,
        job_id: &str,
        kind: &str,
        status: JobStatus,
    ) -> BoxFuture<'_, Result<(), StepStoreError>> {
        let record = JobRecord {
            job_id: job_id.to_owned(),
            kind: kind.to_owned(),
            status,
            updated_at: now(),
        };
        Box::pin(async move {
            let mut state = self.state.write().map_err(|_| StepStoreError::Poisoned)?;
            state.jobs.insert(record.job_id.clone(), record);
            Ok(())
        })
    }

    fn job(&self, job_id: &str) -> BoxFuture<'_, Result<Option<JobRecord>, StepStoreError>> {
        let job_id = job_id.to_owned();
        Box::pin(async move {
            let state = self.state.read().map_err(|_| StepStoreError::Poisoned)?;
            Ok(state.jobs.get(&job_id).cloned())
        })
    }

    fn purge_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StepStoreError>> {
        let cutoff = timestamp(cutoff);
        Box::pin(async move {
            let mut state = self.state.write().map_err(|_| StepStoreError::Poisoned)?;
            let expired: Vec<String> = state
                .jobs
                .values()
                .filter(|r| r.status == JobStatus::Completed && r.updated_at < cutoff)
                .map(|r| r.job_id.clone())
                .collect();
            for job_id in &expired {
                state.jobs.remove(job_id);
                state.order.remove(job_id);
                state.outputs.retain(|(owner, _), _| owner != job_id);
            }
            Ok(expired.len() as u64)
        })
    }
}

/// [`StepStore`] backed by a `SQLite` database file.
#[derive(Debug, Clone)]
pub struct SqliteStepStore {
    pool: SqlitePool,
}

impl SqliteStepStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `path` and create the tables.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &str) -> Result<Self, StepStoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_owned()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create the `step_outputs` and `jobs` tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<(), StepStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS step_outputs (
                job_id TEXT NOT NULL,
                step TEXT NOT NULL,
                output TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (job_id, step)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                job_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                failed_step TEXT,
                error TEXT,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn status_from_row(
    status: &str,
    failed_step: Option<String>,
    error: Option<String>,
) -> Result<JobStatus, StepStoreError> {
    match status {
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed {
            step: failed_step.unwrap_or_default(),
            error: error.unwrap_or_default(),
        }),
        other => Err(StepStoreError::Corrupt(format!("unknown job status `{other}`"))),
    }
}

impl StepStore for SqliteStepStore {
    fn load_output(
        &self,
        job_id: &str,
        step: &str,
    ) -> BoxFuture<'_, Result<Option<serde_json::Value>, StepStoreError>> {
        let job_id = job_id.to_owned();
        let step = step.to_owned();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT output FROM step_outputs WHERE job_id = ? AND step = ?")
                    .bind(&job_id)
                    .bind(&step)
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(|(raw,)| {
                serde_json::from_str(&raw).map_err(|e| StepStoreError::Corrupt(e.to_string()))
            })
            .transpose()
        })
    }

    fn save_output(
        &self,
        job_id: &str,
        step: &str,
        output: serde_json::Value,
    ) -> BoxFuture<'_, Result<(), StepStoreError>> {
        let job_id = job_id.to_owned();
        let step = step.to_owned();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO step_outputs (job_id, step, output, completed_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(job_id, step) DO NOTHING",
            )
            .bind(&job_id)
            .bind(&step)
            .bind(output.to_string())
            .bind(now())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn completed_steps(&self, job_id: &str) -> BoxFuture<'_, Result<Vec<String>, StepStoreError>> {
        let job_id = job_id.to_owned();
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT step FROM step_outputs WHERE job_id = ? ORDER BY rowid")
                    .bind(&job_id)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(|(s,)| s).collect())
        })
    }

    fn set_status(
        &self,
        job_id: &str,
        kind: &str,
        status: JobStatus,
    ) -> BoxFuture<'_, Result<(), StepStoreError>> {
        let job_id = job_id.to_owned();
        let kind = kind.to_owned();
        Box::pin(async move {
            let (failed_step, error) = match &status {
                JobStatus::Failed { step, error } => (Some(step.clone()), Some(error.clone())),
                _ => (None, None),
            };
            sqlx::query(
                "INSERT INTO jobs (job_id, kind, status, failed_step, error, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(job_id) DO UPDATE SET
                    kind = excluded.kind,
                    status = excluded.status,
                    failed_step = excluded.failed_step,
                    error = excluded.error,
                    updated_at = excluded.updated_at",
            )
            .bind(&job_id)
            .bind(&kind)
            .bind(status.as_str())
            .bind(failed_step)
            .bind(error)
            .bind(now())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn job(&self, job_id: &str) -> BoxFuture<'_, Result<Option<JobRecord>, StepStoreError>> {
        let job_id = job_id.to_owned();
        Box::pin(async move {
            let row: Option<(String, String, Option<String>, Option<String>, String)> =
                sqlx::query_as(
                    "SELECT kind, status, failed_step, error, updated_at FROM jobs WHERE job_id = ?",
                )
                .bind(&job_id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|(kind, status, failed_step, error, updated_at)| {
                Ok(JobRecord {
                    job_id: job_id.clone(),
                    kind,
                    status: status_from_row(&status, failed_step, error)?,
                    updated_at,
                })
            })
            .transpose()
        })
    }

    fn purge_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StepStoreError>> {
        let cutoff = timestamp(cutoff);
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "DELETE FROM step_outputs WHERE job_id IN (
                    SELECT job_id FROM jobs WHERE status = 'completed' AND updated_at < ?
                 )",
            )
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
            let purged = sqlx::query("DELETE FROM jobs WHERE status = 'completed' AND updated_at < ?")
                .bind(&cutoff)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            Ok(purged)
        })
    }
}
