//! # Mail Prospector Core Library
//!
//! Discovers and verifies email addresses for a named person. Candidates come from
//! username/domain permutations and from crawling hint pages; each is then checked
//! against the domain's mail exchangers with an SMTP probe that never sends mail, and
//! verified addresses are ranked by how closely their owner's name matches the query.
//!
//! Used directly as a library or through the `mail-prospector` binary.

mod core;
mod discovery;
mod fetch;
mod utils;
mod verification;

pub use crate::core::config::{Config, ConfigBuilder, ConfigFile, SenderMode, SenderPolicy};
pub use crate::core::context::RunContext;
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    EmailCandidate, Identity, MailHost, PersonName, PersonQuery, ProbeOutcome, ProbeResult,
    ProspectResult, ScoredMatch,
};
pub use crate::core::prospector::{Collaborators, Prospector};
pub use crate::discovery::{crawl, extract};
pub use crate::fetch::{FetchedContent, Fetcher, HttpFetcher, RoutedFetcher, SessionFetcher};
pub use crate::utils::distance::{edit_distance, name_distance};
pub use crate::utils::dns::{DnsMxResolver, MxResolver};
pub use crate::utils::smtp::{
    HostAttempt, HostVerdict, LettreConnector, ProbeStage, SmtpConnector, SmtpProber, SmtpReply,
    SmtpSession,
};
pub use crate::verification::{HttpIdentityResolver, IdentityResolver, IdentityScorer, NoIdentityResolver};

use crate::utils::smtp::test_smtp_connectivity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

/// Called once per finished query, from whichever worker finished it.
pub type ProgressHook = Arc<dyn Fn(&PersonQuery, &ProspectResult) + Send + Sync>;

/// Builds the production pipeline: DNS, SMTP, HTTP and identity backends.
pub fn initialize_prospector(config: Config) -> Result<Prospector> {
    Prospector::new(config)
}

/// Checks that outbound SMTP on the configured port is reachable at all.
pub async fn check_smtp_connectivity(config: &Config) -> Result<()> {
    test_smtp_connectivity(config.smtp_port).await
}

/// Runs one query in a run of its own, loading and persisting the cookie jar around it.
pub async fn find_single(prospector: &Prospector, query: &PersonQuery) -> ProspectResult {
    let ctx = prospector.open_run();
    let result = prospector.prospect(&ctx, query).await;
    ctx.close();
    result
}

/// Runs every query through a fixed pool of workers and returns one result per query.
pub async fn process_queries(
    prospector: Arc<Prospector>,
    queries: Vec<PersonQuery>,
) -> HashMap<PersonQuery, ProspectResult> {
    process_queries_with_progress(prospector, queries, None).await
}

/// [`process_queries`] with a hook invoked as each query completes.
///
/// `min(max_concurrency, queries)` workers pull from one shared queue. Each worker
/// drives a query to completion before taking the next and hands back its own
/// results; they are merged only once every worker has been joined.
pub async fn process_queries_with_progress(
    prospector: Arc<Prospector>,
    queries: Vec<PersonQuery>,
    progress: Option<ProgressHook>,
) -> HashMap<PersonQuery, ProspectResult> {
    let total = queries.len();
    if total == 0 {
        return HashMap::new();
    }
    let workers = prospector.config().max_concurrency.clamp(1, total);

    let (tx, rx) = mpsc::unbounded_channel();
    for query in queries {
        // The receiver is alive until the workers below drop it.
        let _ = tx.send(query);
    }
    drop(tx);
    let queue = Arc::new(Mutex::new(rx));

    let ctx = prospector.open_run();
    tracing::info!(target: "prospect_task",
        "Run {}: {} queries across {} workers", ctx.run_id(), total, workers);

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let prospector = Arc::clone(&prospector);
        let ctx = ctx.clone();
        let progress = progress.clone();

        tasks.spawn(async move {
            let mut finished = Vec::new();
            loop {
                let next = queue.lock().await.recv().await;
                let Some(query) = next else { break };

                let result = prospector.prospect(&ctx, &query).await;
                if let Some(ref hook) = progress {
                    hook(&query, &result);
                }
                finished.push((query, result));
            }
            tracing::debug!(target: "prospect_task", "Worker {} finished {} queries", worker, finished.len());
            finished
        });
    }

    let mut results = HashMap::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(finished) => results.extend(finished),
            Err(e) => tracing::error!("A worker task failed to join: {}", e),
        }
    }

    ctx.close();
    results
}
