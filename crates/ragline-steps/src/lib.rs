//! Durable step execution: each named step of a job runs at most once to
//! completion, with bounded retries, and its output is persisted for reuse.

mod error;
mod retention;
mod runner;
mod store;

pub use error::{Retryable, StepError, StepStoreError};
pub use retention::RetentionSweeper;
pub use runner::{RetryPolicy, StepRunner};
pub use store::{InMemoryStepStore, JobRecord, JobStatus, SqliteStepStore, StepStore};
