use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "crawl-worker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_max_links")]
    pub max_links_per_task: usize,

    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_article_timeout")]
    pub article_timeout_secs: u64,

    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,

    /// Object storage for relocated lead images. Images keep their source URL when unset.
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("crawl.db").to_string_lossy().to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_error_backoff() -> u64 {
    5
}

fn default_max_links() -> usize {
    10
}

fn default_page_timeout() -> u64 {
    15
}

fn default_article_timeout() -> u64 {
    10
}

fn default_image_timeout() -> u64 {
    10
}

fn default_bucket() -> String {
    "article-images".to_string()
}

fn default_prefix() -> String {
    "scraped".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            error_backoff_secs: default_error_backoff(),
            max_links_per_task: default_max_links(),
            page_timeout_secs: default_page_timeout(),
            article_timeout_secs: default_article_timeout(),
            image_timeout_secs: default_image_timeout(),
            storage: None,
        }
    }
}

impl Config {
    /// Load from the given path (or the default location), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// `SUPABASE_URL` and `SUPABASE_SERVICE_KEY` override the storage section.
    /// Both must be present to create one from scratch.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SUPABASE_URL").filter(|v| !v.is_empty());
        let key = lookup("SUPABASE_SERVICE_KEY").filter(|v| !v.is_empty());

        if let Some(storage) = self.storage.as_mut() {
            if let Some(url) = url {
                storage.url = url;
            }
            if let Some(key) = key {
                storage.service_key = key;
            }
        } else if let (Some(url), Some(service_key)) = (url, key) {
            self.storage = Some(StorageConfig {
                url,
                service_key,
                bucket: default_bucket(),
                prefix: default_prefix(),
            });
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn article_timeout(&self) -> Duration {
        Duration::from_secs(self.article_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}
