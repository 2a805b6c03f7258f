//! Depth-bounded crawl from a seed URL, collecting addresses from every page visited.

use super::extract::extract;
use crate::core::models::EmailCandidate;
use crate::fetch::Fetcher;
use crate::utils::domain::absolute_http_url;

use scraper::{Html, Selector};
use std::collections::BTreeSet;

/// Absolute http(s) links on a page, in document order.
fn absolute_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(absolute_http_url)
        .map(|url| url.to_string())
        .collect()
}

/// Crawls from `seed`. Depth 0 is the seed itself; links are followed while the
/// current depth is below `max_depth`. Pages are not de-duplicated across levels.
///
/// Fetch failures are logged and skip that page only.
pub async fn crawl(seed: &str, fetcher: &dyn Fetcher, max_depth: usize) -> BTreeSet<EmailCandidate> {
    let mut found = BTreeSet::new();
    let mut frontier = vec![seed.to_string()];

    for depth in 0..=max_depth {
        let mut next = Vec::new();
        for url in &frontier {
            let content = match fetcher.fetch(url, None).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(target: "crawl_task", "Failed to fetch {} (depth {}): {}", url, depth, e);
                    continue;
                }
            };

            let extracted = extract(&content.body);
            if !extracted.is_empty() {
                tracing::debug!(target: "crawl_task", "Found {} address(es) on {}", extracted.len(), url);
            }
            found.extend(extracted);

            if depth < max_depth {
                next.extend(absolute_links(&content.body));
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{AppError, Result};
    use crate::fetch::FetchedContent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct PageFetcher {
        pages: HashMap<String, String>,
        visits: Mutex<Vec<String>>,
    }

    impl PageFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl Fetcher for PageFetcher {
        async fn fetch(&self, url: &str, _body: Option<&str>) -> Result<FetchedContent> {
            self.visits.lock().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(FetchedContent {
                    url: url.to_string(),
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(AppError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    fn chain() -> PageFetcher {
        PageFetcher::default()
            .page(
                "https://seed.test/",
                r#"seed@seed.test <a href="https://b.test/">b</a> <a href="/relative">r</a>"#,
            )
            .page(
                "https://b.test/",
                r#"b at b dot test <a href="https://c.test/">c</a>"#,
            )
            .page("https://c.test/", "c@c.test")
    }

    #[tokio::test]
    async fn test_depth_one_never_visits_grandchild() {
        let fetcher = chain();
        let found = crawl("https://seed.test/", &fetcher, 1).await;

        let emails: Vec<&str> = found.iter().map(|c| c.as_str()).collect();
        assert_eq!(emails, vec!["b@b.test", "seed@seed.test"]);
        assert_eq!(
            fetcher.visits.lock().clone(),
            vec!["https://seed.test/", "https://b.test/"]
        );
    }

    #[tokio::test]
    async fn test_depth_zero_is_seed_only() {
        let fetcher = chain();
        let found = crawl("https://seed.test/", &fetcher, 0).await;
        assert_eq!(found.len(), 1);
        assert_eq!(fetcher.visits.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_page() {
        let fetcher = PageFetcher::default().page(
            "https://seed.test/",
            r#"<a href="https://gone.test/">x</a> <a href="https://ok.test/">y</a>"#,
        )
        .page("https://ok.test/", "ok@ok.test");
        let found = crawl("https://seed.test/", &fetcher, 1).await;
        assert_eq!(found.len(), 1);
        assert_eq!(fetcher.visits.lock().len(), 3);
    }

    #[test]
    fn test_only_absolute_links() {
        let links = absolute_links(
            r#"<a href="https://a.test/x">1</a><a href="mailto:x@y.test">2</a><a href="/z">3</a><a>4</a>"#,
        );
        assert_eq!(links, vec!["https://a.test/x"]);
    }
}
