use std::sync::Arc;

use crate::crawl::{ArticleExtractor, Deduplicator, LinkDiscoverer, ScrapeOutcome};
use crate::db::TaskStore;
use crate::error::Result;
use crate::models::{PendingTask, TaskSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Another run moved the task out of `pending` first.
    NotClaimed,
    Succeeded { new_articles: usize },
    Failed(String),
}

/// Drives a single task from `pending` to `success` or `failed`.
pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    discoverer: LinkDiscoverer,
    dedup: Deduplicator,
    extractor: ArticleExtractor,
    max_links: usize,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        discoverer: LinkDiscoverer,
        extractor: ArticleExtractor,
        max_links: usize,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(store.clone()),
            store,
            discoverer,
            extractor,
            max_links,
        }
    }

    /// Errors from the crawl, and a failed summary write, end up on the task
    /// row. Only a failure to record `failed` is returned to the caller.
    pub async fn run(&self, task: &PendingTask) -> Result<TaskOutcome> {
        tracing::info!("Scanning {} (task {})", task.website.name, task.id);

        // Persist the pickup before any network I/O
        if !self.store.claim_task(task.id).await? {
            tracing::warn!("Task {} is no longer pending, skipping", task.id);
            return Ok(TaskOutcome::NotClaimed);
        }

        let new_articles = match self.crawl_site(task).await {
            Ok(count) => count,
            Err(e) => return self.record_failure(task, e.to_string()).await,
        };

        let summary = TaskSummary::for_site(&task.website, new_articles);
        tracing::info!("{}: {}", task.website.name, summary.content);
        match self.store.complete_task(task.id, summary).await {
            Ok(()) => Ok(TaskOutcome::Succeeded { new_articles }),
            Err(e) => self.record_failure(task, e.to_string()).await,
        }
    }

    async fn record_failure(&self, task: &PendingTask, message: String) -> Result<TaskOutcome> {
        tracing::error!("Task {} for {} failed: {}", task.id, task.website.url, message);
        self.store.fail_task(task.id, &message).await?;
        Ok(TaskOutcome::Failed(message))
    }

    async fn crawl_site(&self, task: &PendingTask) -> Result<usize> {
        let site_url = &task.website.url;
        let links = self.discoverer.discover(site_url).await;

        let mut new_articles = 0;
        for link in links.iter().take(self.max_links) {
            if is_same_page(link, site_url) {
                continue;
            }
            if self.dedup.is_duplicate(link).await? {
                tracing::debug!("Duplicate: {}", link);
                continue;
            }
            match self.extractor.scrape(link, task).await {
                ScrapeOutcome::Saved => new_articles += 1,
                ScrapeOutcome::Skipped => {}
                ScrapeOutcome::Failed(reason) => {
                    tracing::warn!("Failed to scrape {}: {}", link, reason);
                }
            }
        }

        Ok(new_articles)
    }
}

fn is_same_page(link: &str, site_url: &str) -> bool {
    link.trim_matches('/') == site_url.trim_matches('/')
}
