use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Job, JobStatus, NewResult, NewWebsite, PendingTask, Task, TaskStatus, TaskSummary, Website,
};

use super::schema::SCHEMA;
use super::store::TaskStore;

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Website operations

    pub async fn insert_website(&self, website: NewWebsite) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO websites (url, name) VALUES (?1, ?2)",
                    params![website.url, website.name],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn website_exists(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM websites WHERE url = ?1)",
                    params![url],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    pub async fn get_all_websites(&self) -> Result<Vec<Website>> {
        let websites = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, url, name FROM websites ORDER BY id")?;
                let websites = stmt
                    .query_map([], |row| website_from_row(row, 0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(websites)
            })
            .await?;
        Ok(websites)
    }

    // Job operations

    /// Create a job with one pending task per website. The job only becomes
    /// visible to the poller once all of its tasks exist.
    pub async fn create_job(&self, websites: Vec<Website>) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO scrape_jobs (status) VALUES (?1)",
                    params![JobStatus::Pending.as_str()],
                )?;
                let job_id = tx.last_insert_rowid();

                for website in &websites {
                    tx.execute(
                        "INSERT INTO scrape_results (job_id, website_id, status, title, content, description)
                         VALUES (?1, ?2, ?3, '', '', ?4)",
                        params![job_id, website.id, TaskStatus::Pending.as_str(), website.url],
                    )?;
                }

                tx.execute(
                    "UPDATE scrape_jobs SET status = ?1 WHERE id = ?2",
                    params![JobStatus::InProgress.as_str(), job_id],
                )?;
                tx.commit()?;
                Ok(job_id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let job = self
            .conn
            .call(move |conn| {
                let job = conn
                    .query_row(
                        "SELECT id, status, created_at, completed_at FROM scrape_jobs WHERE id = ?1",
                        params![id],
                        job_from_row,
                    )
                    .optional()?;
                Ok(job)
            })
            .await?;
        Ok(job)
    }

    // Task operations

    #[cfg(test)]
    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let task = self
            .conn
            .call(move |conn| {
                let task = conn
                    .query_row(
                        r#"SELECT id, job_id, website_id, status, title, content, description,
                                  image_url, error_message, created_at
                           FROM scrape_results WHERE id = ?1"#,
                        params![id],
                        task_from_row,
                    )
                    .optional()?;
                Ok(task)
            })
            .await?;
        Ok(task)
    }

    pub async fn tasks_for_job(&self, job_id: i64) -> Result<Vec<Task>> {
        let tasks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, job_id, website_id, status, title, content, description,
                              image_url, error_message, created_at
                       FROM scrape_results WHERE job_id = ?1 ORDER BY id"#,
                )?;
                let tasks = stmt
                    .query_map(params![job_id], task_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tasks)
            })
            .await?;
        Ok(tasks)
    }

    /// Run a status-guarded update and fail if it touched no row.
    async fn transition(
        &self,
        task_id: i64,
        sql: &'static str,
        values: Vec<Option<String>>,
        target: TaskStatus,
    ) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&task_id];
                for value in &values {
                    bound.push(value);
                }
                Ok(conn.execute(sql, bound.as_slice())?)
            })
            .await?;

        if changed == 0 {
            return Err(anyhow::anyhow!(
                "task {} cannot move to {}: not in progress",
                task_id,
                target
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for Repository {
    async fn open_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, status, created_at, completed_at FROM scrape_jobs
                       WHERE status = ?1 AND completed_at IS NULL
                       ORDER BY id"#,
                )?;
                let jobs = stmt
                    .query_map(params![JobStatus::InProgress.as_str()], job_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }

    async fn pending_tasks(&self, job_id: i64) -> Result<Vec<PendingTask>> {
        let tasks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT r.id, r.job_id, w.id, w.url, w.name
                       FROM scrape_results r
                       JOIN websites w ON r.website_id = w.id
                       WHERE r.job_id = ?1 AND r.status = ?2
                       ORDER BY r.id"#,
                )?;
                let tasks = stmt
                    .query_map(params![job_id, TaskStatus::Pending.as_str()], |row| {
                        Ok(PendingTask {
                            id: row.get(0)?,
                            job_id: row.get(1)?,
                            website: website_from_row(row, 2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tasks)
            })
            .await?;
        Ok(tasks)
    }

    async fn claim_task(&self, task_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE scrape_results SET status = ?1 WHERE id = ?2 AND status = ?3",
                    params![
                        TaskStatus::InProgress.as_str(),
                        task_id,
                        TaskStatus::Pending.as_str()
                    ],
                )?)
            })
            .await?;
        Ok(changed == 1)
    }

    async fn complete_task(&self, task_id: i64, summary: TaskSummary) -> Result<()> {
        self.transition(
            task_id,
            "UPDATE scrape_results SET status = 'success', title = ?2, content = ?3, description = ?4
             WHERE id = ?1 AND status = 'in_progress'",
            vec![
                Some(summary.title),
                Some(summary.content),
                Some(summary.description),
            ],
            TaskStatus::Success,
        )
        .await
    }

    async fn fail_task(&self, task_id: i64, message: &str) -> Result<()> {
        self.transition(
            task_id,
            "UPDATE scrape_results SET status = 'failed', error_message = ?2
             WHERE id = ?1 AND status = 'in_progress'",
            vec![Some(message.to_string())],
            TaskStatus::Failed,
        )
        .await
    }

    async fn insert_result(&self, result: NewResult) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO scrape_results
                           (job_id, website_id, status, title, content, description, image_url)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        result.job_id,
                        result.website_id,
                        TaskStatus::Success.as_str(),
                        result.title,
                        result.content,
                        result.description,
                        result.image_url,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    async fn result_exists(&self, dedup_key: &str) -> Result<bool> {
        let key = dedup_key.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM scrape_results WHERE description = ?1)",
                    params![key],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    async fn complete_job(&self, job_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE scrape_jobs SET status = ?1, completed_at = datetime('now') WHERE id = ?2",
                    params![JobStatus::Completed.as_str(), job_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn parse_status<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = AppError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn website_from_row(row: &Row, offset: usize) -> rusqlite::Result<Website> {
    Ok(Website {
        id: row.get(offset)?,
        url: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        status: parse_status(row, 1)?,
        created_at: row
            .get::<_, String>(2)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        completed_at: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| parse_datetime(&s)),
    })
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        job_id: row.get(1)?,
        website_id: row.get(2)?,
        status: parse_status(row, 3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        description: row.get(6)?,
        image_url: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}
