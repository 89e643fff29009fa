use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::Website;

/// Lifecycle of a row in the result table: `Pending -> InProgress -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(AppError::InvalidStatus(other.to_string())),
        }
    }
}

/// A row of the result table. Depending on its phase it is a queued site crawl,
/// a scraped article, or the summary of a finished crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub job_id: i64,
    pub website_id: i64,
    pub status: TaskStatus,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Site URL while queued or summarized, article URL for scraped results.
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A queued task together with the site it targets.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub id: i64,
    pub job_id: i64,
    pub website: Website,
}

/// A scraped article about to be written as a `success` row.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub job_id: i64,
    pub website_id: i64,
    pub title: String,
    pub content: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Fields written over a task row when its crawl finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub title: String,
    pub content: String,
    pub description: String,
}

impl TaskSummary {
    pub fn for_site(website: &Website, new_articles: usize) -> Self {
        let content = if new_articles == 0 {
            "No new articles found".to_string()
        } else {
            format!("Added {} new articles", new_articles)
        };

        Self {
            title: format!("Scanned {}", website.name),
            content,
            description: website.url.clone(),
        }
    }
}
