use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::db::TaskStore;
use crate::error::Result;
use crate::models::Job;

use super::runner::{TaskOutcome, TaskRunner};

/// Pause between polls. Swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct JobPoller {
    store: Arc<dyn TaskStore>,
    runner: TaskRunner,
    sleeper: Arc<dyn Sleeper>,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl JobPoller {
    pub fn new(
        store: Arc<dyn TaskStore>,
        runner: TaskRunner,
        sleeper: Arc<dyn Sleeper>,
        poll_interval: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            sleeper,
            poll_interval,
            error_backoff,
        }
    }

    /// Poll until `shutdown` is cancelled. A failed cycle is logged and
    /// followed by the longer backoff pause.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("Worker started");

        while !shutdown.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(_) => self.poll_interval,
                Err(e) => {
                    tracing::error!("Worker error: {}", e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.sleeper.sleep(pause) => {}
            }
        }

        tracing::info!("Worker stopped");
    }

    /// One pass over every open job. Returns how many jobs were looked at.
    pub async fn poll_once(&self) -> Result<usize> {
        let jobs = self.store.open_jobs().await?;
        if !jobs.is_empty() {
            tracing::debug!("{} open jobs", jobs.len());
        }

        for job in &jobs {
            self.process_job(job).await?;
        }
        Ok(jobs.len())
    }

    async fn process_job(&self, job: &Job) -> Result<()> {
        let tasks = self.store.pending_tasks(job.id).await?;
        if tasks.is_empty() {
            // Tasks may still be on their way in
            tracing::debug!("Job {} ({}) has no pending tasks", job.id, job.status);
            return Ok(());
        }

        tracing::info!(
            "Processing job {} created {} ({} sites)",
            job.id,
            job.created_at.format("%Y-%m-%d %H:%M"),
            tasks.len()
        );

        let (mut new_articles, mut failed) = (0, 0);
        for task in &tasks {
            match self.runner.run(task).await? {
                TaskOutcome::Succeeded { new_articles: n } => new_articles += n,
                TaskOutcome::Failed(_) => failed += 1,
                TaskOutcome::NotClaimed => {}
            }
        }

        self.store.complete_job(job.id).await?;
        tracing::info!(
            "Job {} completed: {} new articles, {} failed sites",
            job.id,
            new_articles,
            failed
        );
        Ok(())
    }
}
