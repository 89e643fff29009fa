use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Job, NewResult, PendingTask, TaskSummary};

/// Operations the worker needs from the task/result store.
///
/// The result table doubles as the work queue: rows start out `pending`,
/// get claimed, and finish as either a run summary or a failure.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Jobs in `in_progress` that have no completion timestamp yet.
    async fn open_jobs(&self) -> Result<Vec<Job>>;

    /// `pending` tasks of a job, with their website, in store order.
    async fn pending_tasks(&self, job_id: i64) -> Result<Vec<PendingTask>>;

    /// Move a task from `pending` to `in_progress`. Returns `false` when the
    /// task was no longer pending.
    async fn claim_task(&self, task_id: i64) -> Result<bool>;

    /// Finish an `in_progress` task as `success`, overwriting it with the summary.
    async fn complete_task(&self, task_id: i64, summary: TaskSummary) -> Result<()>;

    /// Finish an `in_progress` task as `failed`.
    async fn fail_task(&self, task_id: i64, message: &str) -> Result<()>;

    async fn insert_result(&self, result: NewResult) -> Result<i64>;

    /// Exact match on the dedup key (`description`).
    async fn result_exists(&self, dedup_key: &str) -> Result<bool>;

    async fn complete_job(&self, job_id: i64) -> Result<()>;
}
