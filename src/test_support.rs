//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::crawl::Fetcher;
use crate::db::{Repository, TaskStore};
use crate::error::{AppError, Result};
use crate::models::{Job, NewResult, NewWebsite, PendingTask, TaskSummary, Website};
use crate::services::{site_name, ImageStore};

pub async fn temp_repository() -> (TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawl.db");
    let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
    (dir, repo)
}

/// A repository holding one website per URL, named the way the seeder names them.
pub async fn seeded_repository(urls: &[&str]) -> (TempDir, Repository, Vec<Website>) {
    let (dir, repo) = temp_repository().await;
    let mut websites = Vec::new();
    for url in urls {
        let name = site_name(url);
        let id = repo
            .insert_website(NewWebsite {
                url: url.to_string(),
                name: name.clone(),
            })
            .await
            .unwrap();
        websites.push(Website {
            id,
            url: url.to_string(),
            name,
        });
    }
    (dir, repo, websites)
}

/// Minimal article page: one paragraph of body text, optional h1 and og:image.
pub fn article_page(title: &str, h1: Option<&str>, body: &str, image: Option<&str>) -> String {
    let image_meta = image
        .map(|src| format!(r#"<meta property="og:image" content="{}">"#, src))
        .unwrap_or_default();
    let heading = h1.map(|h| format!("<h1>{}</h1>", h)).unwrap_or_default();
    format!(
        "<html><head><title>{}</title>{}</head><body><article>{}<p>{}</p></article></body></html>",
        title, image_meta, heading, body
    )
}

/// Serves canned pages and images; any other URL is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
    article_requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_image(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }

    pub fn article_requests(&self) -> Vec<String> {
        self.article_requests.lock().unwrap().clone()
    }

    fn not_found(url: &str) -> AppError {
        AppError::HttpStatus {
            url: url.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_category_page(&self, url: &str) -> Result<String> {
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_article(&self, url: &str) -> Result<String> {
        self.article_requests.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.images.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }
}

#[derive(Default)]
pub struct FakeImageStore {
    reject_uploads: bool,
    uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
}

impl FakeImageStore {
    pub fn failing() -> Self {
        Self {
            reject_uploads: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn public_url_for(path: &str) -> String {
        format!("https://storage.test/public/{}", path)
    }
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if self.reject_uploads {
            return Err(AppError::Storage("bucket unavailable".to_string()));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), bytes, content_type.to_string()));
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String> {
        Ok(Self::public_url_for(path))
    }
}

/// A real repository with injectable faults.
pub struct ScriptedStore {
    inner: Repository,
    poll_failures: AtomicUsize,
    dedup_failure_prefix: Option<String>,
    fail_completions: bool,
    open_at_completion: Mutex<Option<usize>>,
}

impl ScriptedStore {
    pub fn new(inner: Repository) -> Self {
        Self {
            inner,
            poll_failures: AtomicUsize::new(0),
            dedup_failure_prefix: None,
            fail_completions: false,
            open_at_completion: Mutex::new(None),
        }
    }

    /// The next `count` calls to `open_jobs` fail.
    pub fn failing_polls(self, count: usize) -> Self {
        self.poll_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_dedup(self) -> Self {
        self.failing_dedup_for("")
    }

    /// Dedup lookups for URLs starting with `prefix` fail.
    pub fn failing_dedup_for(mut self, prefix: &str) -> Self {
        self.dedup_failure_prefix = Some(prefix.to_string());
        self
    }

    /// Every `complete_task` call fails; `fail_task` still works.
    pub fn failing_completion(mut self) -> Self {
        self.fail_completions = true;
        self
    }

    /// How many of the job's tasks were still open when `complete_job` ran.
    pub fn open_tasks_at_completion(&self) -> Option<usize> {
        *self.open_at_completion.lock().unwrap()
    }
}

#[async_trait]
impl TaskStore for ScriptedStore {
    async fn open_jobs(&self) -> Result<Vec<Job>> {
        let remaining = self.poll_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.poll_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("database is locked").into());
        }
        self.inner.open_jobs().await
    }

    async fn pending_tasks(&self, job_id: i64) -> Result<Vec<PendingTask>> {
        self.inner.pending_tasks(job_id).await
    }

    async fn claim_task(&self, task_id: i64) -> Result<bool> {
        self.inner.claim_task(task_id).await
    }

    async fn complete_task(&self, task_id: i64, summary: TaskSummary) -> Result<()> {
        if self.fail_completions {
            return Err(anyhow::anyhow!("database is locked").into());
        }
        self.inner.complete_task(task_id, summary).await
    }

    async fn fail_task(&self, task_id: i64, message: &str) -> Result<()> {
        self.inner.fail_task(task_id, message).await
    }

    async fn insert_result(&self, result: NewResult) -> Result<i64> {
        self.inner.insert_result(result).await
    }

    async fn result_exists(&self, dedup_key: &str) -> Result<bool> {
        if let Some(prefix) = &self.dedup_failure_prefix {
            if dedup_key.starts_with(prefix.as_str()) {
                return Err(anyhow::anyhow!("dedup lookup unavailable").into());
            }
        }
        self.inner.result_exists(dedup_key).await
    }

    async fn complete_job(&self, job_id: i64) -> Result<()> {
        let open = self
            .inner
            .tasks_for_job(job_id)
            .await?
            .iter()
            .filter(|task| !task.status.is_terminal())
            .count();
        *self.open_at_completion.lock().unwrap() = Some(open);
        self.inner.complete_job(job_id).await
    }
}
