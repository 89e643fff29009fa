use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// Durable storage for relocated article images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn public_url(&self, path: &str) -> Result<String>;
}

/// Supabase Storage bucket accessed over its REST API.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ImageStore for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.base_url, self.bucket, path
            ))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::Storage(format!(
                "upload rejected ({}): {}",
                status, error_text
            )));
        }

        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String> {
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        ))
    }
}
