//! Page fetching: one content type returned by every fetcher, anonymous and
//! session-bearing implementations, and per-host routing between them.

mod http;
mod retry;
mod session;

pub use http::HttpFetcher;
pub use retry::RetryPolicy;
pub use session::SessionFetcher;

use crate::core::error::Result;
use crate::utils::domain::host_matches;

use async_trait::async_trait;
use std::sync::Arc;

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// `URL -> content`. A body turns the request into a form POST.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, body: Option<&str>) -> Result<FetchedContent>;
}

/// Sends listed hosts through the session fetcher and everything else anonymously.
pub struct RoutedFetcher {
    anonymous: Arc<dyn Fetcher>,
    session: Option<Arc<dyn Fetcher>>,
    authenticated_hosts: Vec<String>,
}

impl RoutedFetcher {
    pub fn new(
        anonymous: Arc<dyn Fetcher>,
        session: Option<Arc<dyn Fetcher>>,
        authenticated_hosts: Vec<String>,
    ) -> Self {
        Self {
            anonymous,
            session,
            authenticated_hosts,
        }
    }

    fn route(&self, url: &str) -> &Arc<dyn Fetcher> {
        match self.session {
            Some(ref session)
                if self
                    .authenticated_hosts
                    .iter()
                    .any(|host| host_matches(url, host)) =>
            {
                session
            }
            _ => &self.anonymous,
        }
    }
}

#[async_trait]
impl Fetcher for RoutedFetcher {
    async fn fetch(&self, url: &str, body: Option<&str>) -> Result<FetchedContent> {
        self.route(url).fetch(url, body).await
    }
}
