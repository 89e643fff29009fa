use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use reqwest::{Client, RequestBuilder};

use crate::config::Config;
use crate::error::{AppError, Result};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const CATEGORY_REFERER: &str = "https://www.google.com/";

/// Outbound HTTP used by the crawl pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a category listing page. Non-2xx responses are errors.
    async fn fetch_category_page(&self, url: &str) -> Result<String>;

    async fn fetch_article(&self, url: &str) -> Result<String>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
    page_timeout: Duration,
    article_timeout: Duration,
    image_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

        let client = Client::builder()
            .user_agent(USER_AGENT_STRING)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            page_timeout: config.page_timeout(),
            article_timeout: config.article_timeout(),
            image_timeout: config.image_timeout(),
        })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("{} -> {}", url, status);

        if !status.is_success() {
            return Err(AppError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_category_page(&self, url: &str) -> Result<String> {
        let request = self
            .client
            .get(url)
            .header(REFERER, CATEGORY_REFERER)
            .timeout(self.page_timeout);
        let html = self.send(url, request).await?.text().await?;
        tracing::debug!("Fetched {} chars from {}", html.len(), url);
        Ok(html)
    }

    async fn fetch_article(&self, url: &str) -> Result<String> {
        let request = self.client.get(url).timeout(self.article_timeout);
        Ok(self.send(url, request).await?.text().await?)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let request = self.client.get(url).timeout(self.image_timeout);
        let bytes = self.send(url, request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
