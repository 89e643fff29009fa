use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crawl::{ArticleExtractor, Fetcher, HttpFetcher, LinkDiscoverer};
use crate::db::{Repository, TaskStore};
use crate::error::Result;
use crate::models::JobReport;
use crate::services::{seed_websites, ImageStore, SupabaseStorage};
use crate::worker::{JobPoller, TaskRunner, TokioSleeper};

const DEFAULT_IMAGE_PREFIX: &str = "scraped";

pub struct App {
    repository: Repository,
    poller: JobPoller,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        let store: Arc<dyn TaskStore> = Arc::new(repository.clone());
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config)?);

        let image_store: Option<Arc<dyn ImageStore>> = match &config.storage {
            Some(storage) => Some(Arc::new(SupabaseStorage::new(storage)?) as Arc<dyn ImageStore>),
            None => {
                tracing::info!("No image storage configured, keeping source image URLs");
                None
            }
        };
        let image_prefix = config
            .storage
            .as_ref()
            .map(|s| s.prefix.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE_PREFIX.to_string());

        let runner = TaskRunner::new(
            store.clone(),
            LinkDiscoverer::new(fetcher.clone()),
            ArticleExtractor::new(fetcher, store.clone(), image_store, image_prefix),
            config.max_links_per_task,
        );
        let poller = JobPoller::new(
            store,
            runner,
            Arc::new(TokioSleeper),
            config.poll_interval(),
            config.error_backoff(),
        );

        Ok(Self { repository, poller })
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        self.poller.run(shutdown).await;
    }

    /// Process whatever is queued right now, then return.
    pub async fn run_once(&self) -> Result<usize> {
        self.poller.poll_once().await
    }

    pub async fn seed(&self, path: &Path) -> Result<usize> {
        seed_websites(&self.repository, path).await
    }

    /// Queue a job covering every known website. `None` when there are none.
    pub async fn enqueue_all(&self) -> Result<Option<i64>> {
        let websites = self.repository.get_all_websites().await?;
        if websites.is_empty() {
            return Ok(None);
        }

        let count = websites.len();
        let job_id = self.repository.create_job(websites).await?;
        tracing::info!("Created job {} for {} websites", job_id, count);
        Ok(Some(job_id))
    }

    pub async fn job_report(&self, job_id: i64) -> Result<Option<JobReport>> {
        let Some(job) = self.repository.get_job(job_id).await? else {
            return Ok(None);
        };

        let rows = self.repository.tasks_for_job(job_id).await?;
        let finished = rows.iter().filter(|row| row.status.is_terminal()).count();
        Ok(Some(JobReport { job, finished, rows }))
    }
}
