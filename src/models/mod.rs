mod article;
mod job;
mod task;
mod website;

pub use article::ExtractedArticle;
pub use job::{Job, JobReport, JobStatus};
pub use task::{NewResult, PendingTask, Task, TaskStatus, TaskSummary};
pub use website::{NewWebsite, Website};
