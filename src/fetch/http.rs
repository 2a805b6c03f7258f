//! HTTP fetching over reqwest, anonymous or backed by a cookie store.

use super::retry::RetryPolicy;
use super::{FetchedContent, Fetcher};
use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Client;
use reqwest_cookie_store::CookieStoreMutex;
use std::sync::Arc;

/// Plain GET (or form POST when a body is given) with bounded retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    /// A fetcher that neither sends nor keeps cookies.
    pub fn new(config: &Config) -> Result<Self> {
        Self::build(config, None)
    }

    /// A fetcher whose every response, redirect hops and error statuses included,
    /// feeds `jar`, and whose every request draws its `Cookie` header from it.
    pub(crate) fn with_cookie_store(config: &Config, jar: Arc<CookieStoreMutex>) -> Result<Self> {
        Self::build(config, Some(jar))
    }

    fn build(config: &Config, jar: Option<Arc<CookieStoreMutex>>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let mut builder = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(jar) = jar {
            builder = builder.cookie_provider(jar);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(config.fetch_attempts, config.retry_backoff),
        })
    }

    async fn send_once(&self, url: &str, body: Option<&str>) -> Result<FetchedContent> {
        let request = match body {
            Some(form) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(form.to_string()),
            None => self.client.get(url),
        };

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            tracing::debug!(target: "fetch_task", "HTTP {} for {}", status, url);
            return Err(AppError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        Ok(FetchedContent {
            url: final_url,
            status: status.as_u16(),
            body: text,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, body: Option<&str>) -> Result<FetchedContent> {
        self.retry.run(url, || self.send_once(url, body)).await
    }
}
