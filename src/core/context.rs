//! Run-scoped state shared by every query of one pipeline invocation.

use crate::fetch::{Fetcher, RoutedFetcher, SessionFetcher};

use std::sync::Arc;

/// Carries the run id, its tracing span, and the fetcher all queries of the run use.
///
/// Cloning is cheap; clones share the same session and cookie jar.
#[derive(Clone)]
pub struct RunContext {
    run_id: String,
    span: tracing::Span,
    fetcher: Arc<dyn Fetcher>,
    anonymous: Arc<dyn Fetcher>,
    session: Option<Arc<SessionFetcher>>,
}

impl RunContext {
    /// Starts a run. The session's cookie jar is loaded here and nowhere else.
    pub fn open(
        anonymous: Arc<dyn Fetcher>,
        session: Option<Arc<SessionFetcher>>,
        authenticated_hosts: Vec<String>,
    ) -> Self {
        let run_id = format!("{:08x}", rand::random::<u32>());
        let span = tracing::info_span!("run", run_id = %run_id);

        if let Some(ref session) = session {
            let _entered = span.enter();
            session.load_cookies();
        }

        let routed = RoutedFetcher::new(
            Arc::clone(&anonymous),
            session.clone().map(|s| s as Arc<dyn Fetcher>),
            authenticated_hosts,
        );
        tracing::debug!(target: "prospect_task", "Opened run {}", run_id);

        Self {
            run_id,
            span,
            fetcher: Arc::new(routed),
            anonymous,
            session,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Routes listed hosts through the session, everything else anonymously.
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Never carries cookies. Used for search pages.
    pub fn anonymous_fetcher(&self) -> &dyn Fetcher {
        self.anonymous.as_ref()
    }

    /// Ends the run, writing the cookie jar back once. Persist failures are logged.
    pub fn close(self) {
        let _entered = self.span.enter();
        if let Some(ref session) = self.session {
            if let Err(e) = session.persist_cookies() {
                tracing::error!(target: "fetch_task", "Failed to persist cookie jar: {}", e);
            }
        }
        tracing::debug!(target: "prospect_task", "Closed run {}", self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::error::Result;
    use crate::fetch::FetchedContent;
    use async_trait::async_trait;

    struct Blank;

    #[async_trait]
    impl Fetcher for Blank {
        async fn fetch(&self, url: &str, _body: Option<&str>) -> Result<FetchedContent> {
            Ok(FetchedContent {
                url: url.to_string(),
                status: 200,
                body: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_open_without_session() {
        let ctx = RunContext::open(Arc::new(Blank), None, vec!["linkedin.com".to_string()]);
        assert_eq!(ctx.run_id().len(), 8);
        let page = ctx.fetcher().fetch("https://www.linkedin.com/in/x", None).await.unwrap();
        assert_eq!(page.status, 200);
        ctx.close();
    }

    #[test]
    fn test_close_persists_jar_once() {
        let path = std::env::temp_dir().join(format!("mail-prospector-ctx-{}.json", rand::random::<u64>()));
        let config = Config::default();
        let session = Arc::new(SessionFetcher::new(&config, &path).unwrap());

        let ctx = RunContext::open(Arc::new(Blank), Some(session), Vec::new());
        let clone = ctx.clone();
        drop(clone);
        assert!(!path.exists());

        ctx.close();
        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }
}
