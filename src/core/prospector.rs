use crate::core::config::{get_random_sleep_duration, Config};
use crate::core::context::RunContext;
use crate::core::error::{AppError, Result};
use crate::core::models::{EmailCandidate, MailHost, PersonQuery, ProbeResult, ProspectResult, ScoredMatch};
use crate::discovery::crawl;
use crate::fetch::{Fetcher, HttpFetcher, SessionFetcher};
use crate::utils::dns::{DnsMxResolver, MxResolver};
use crate::utils::domain::absolute_http_url;
use crate::utils::patterns::generate_candidates;
use crate::utils::smtp::{LettreConnector, SmtpConnector, SmtpProber};
use crate::verification::{HttpIdentityResolver, IdentityResolver, IdentityScorer, NoIdentityResolver};

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::Instrument;

/// The external systems a [`Prospector`] talks to.
pub struct Collaborators {
    pub resolver: Arc<dyn MxResolver>,
    pub connector: Arc<dyn SmtpConnector>,
    pub identity: Arc<dyn IdentityResolver>,
    pub anonymous_fetcher: Arc<dyn Fetcher>,
    pub session_fetcher: Option<Arc<SessionFetcher>>,
}

/// Runs the full pipeline for one query at a time: generate, crawl, resolve, probe, score.
pub struct Prospector {
    config: Arc<Config>,
    resolver: Arc<dyn MxResolver>,
    prober: SmtpProber,
    scorer: IdentityScorer,
    anonymous_fetcher: Arc<dyn Fetcher>,
    session_fetcher: Option<Arc<SessionFetcher>>,
    /// Mail hosts per domain, shared by every query. Only definitive answers are kept.
    mx_cache: Mutex<HashMap<String, Vec<MailHost>>>,
}

impl Prospector {
    /// Wires up the production DNS, SMTP, HTTP and identity backends.
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing prospector components...");
        let resolver = Arc::new(DnsMxResolver::new(&config)?);
        tracing::debug!("DNS resolver initialized.");

        let connector = Arc::new(LettreConnector::new(
            config.smtp_port,
            config.smtp_timeout,
            &config.helo_name,
        ));

        let identity: Arc<dyn IdentityResolver> = match config.identity_api_key {
            Some(ref key) => Arc::new(HttpIdentityResolver::new(&config, key.clone())?),
            None => {
                tracing::info!("No identity API key configured; identity scoring is disabled.");
                Arc::new(NoIdentityResolver)
            }
        };

        let http = HttpFetcher::new(&config)?;
        let session = SessionFetcher::new(&config, config.cookie_jar_path.clone())?;
        tracing::debug!("HTTP fetchers initialized.");

        let prospector = Self::from_parts(
            config,
            Collaborators {
                resolver,
                connector,
                identity,
                anonymous_fetcher: Arc::new(http),
                session_fetcher: Some(Arc::new(session)),
            },
        );
        tracing::info!("Prospector initialized successfully.");
        Ok(prospector)
    }

    pub fn from_parts(config: Config, parts: Collaborators) -> Self {
        let config = Arc::new(config);
        Self {
            prober: SmtpProber::with_connector(Arc::clone(&config), parts.connector),
            scorer: IdentityScorer::new(parts.identity, config.max_name_distance),
            resolver: parts.resolver,
            anonymous_fetcher: parts.anonymous_fetcher,
            session_fetcher: parts.session_fetcher,
            mx_cache: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts a run: loads the cookie jar and builds the routed fetcher.
    pub fn open_run(&self) -> RunContext {
        RunContext::open(
            Arc::clone(&self.anonymous_fetcher),
            self.session_fetcher.clone(),
            self.config.authenticated_hosts.clone(),
        )
    }

    /// Runs one query to completion. Per-host, per-page and per-lookup failures are
    /// logged and never abort the query.
    pub async fn prospect(&self, ctx: &RunContext, query: &PersonQuery) -> ProspectResult {
        let span = tracing::info_span!(parent: ctx.span(), "prospect", query = %query.name);
        self.run_query(ctx, query).instrument(span).await
    }

    async fn run_query(&self, ctx: &RunContext, query: &PersonQuery) -> ProspectResult {
        let task_label = format!("[{}]", query.name);
        tracing::info!(target: "prospect_task", "{} Starting prospecting", task_label);
        let start_time = Instant::now();

        let candidates = self.gather_candidates(ctx, query, &task_label).await;
        if candidates.is_empty() {
            tracing::warn!(target: "prospect_task", "{} No candidate addresses generated or found.", task_label);
            return ProspectResult::skipped("no candidate addresses generated or found");
        }
        tracing::info!(target: "prospect_task", "{} {} unique candidates to probe.", task_label, candidates.len());

        let probes = self.probe_candidates(&candidates, &task_label).await;
        let matches = self.score_verified(&probes, query, &task_label).await;

        let result = ProspectResult {
            candidates_considered: candidates.len(),
            scores: matches.iter().map(|m| (m.candidate.clone(), m.score)).collect(),
            matches,
            probes,
            skipped_reason: None,
        };

        tracing::info!(target: "prospect_task",
            "{} Finished in {:.2?}: {} verified, best match {:?}",
            task_label,
            start_time.elapsed(),
            result.verified().count(),
            result.best_match().map(|m| m.candidate.as_str()));
        result
    }

    async fn gather_candidates(
        &self,
        ctx: &RunContext,
        query: &PersonQuery,
        task_label: &str,
    ) -> BTreeSet<EmailCandidate> {
        let mut candidates = generate_candidates(
            &query.name,
            query.hint_urls.iter().map(String::as_str),
            &self.config.default_domains,
        );
        tracing::debug!(target: "prospect_task", "{} Generated {} pattern candidates", task_label, candidates.len());

        for hint in query.hint_urls.iter().filter(|h| h.contains("://")) {
            if absolute_http_url(hint).is_none() {
                tracing::debug!(target: "prospect_task", "{} Not crawling non-http hint {}", task_label, hint);
                continue;
            }
            let found = crawl(hint, ctx.fetcher(), self.config.max_depth).await;
            tracing::debug!(target: "prospect_task", "{} Crawl of {} found {} address(es)", task_label, hint, found.len());
            candidates.extend(found);
        }

        if let Some(directory_url) = self.directory_url(query) {
            let found = crawl(&directory_url, ctx.fetcher(), self.config.max_depth).await;
            tracing::debug!(target: "prospect_task", "{} Directory crawl of {} found {} address(es)", task_label, directory_url, found.len());
            candidates.extend(found);
        }

        if let Some(search_url) = self.search_url(query) {
            let found = crawl(&search_url, ctx.anonymous_fetcher(), self.config.max_depth).await;
            tracing::debug!(target: "prospect_task", "{} Search crawl found {} address(es)", task_label, found.len());
            candidates.extend(found);
        }

        candidates
    }

    /// Fills the configured search template with the name and keywords, `+`-joined.
    fn search_url(&self, query: &PersonQuery) -> Option<String> {
        let template = self.config.search_url_template.as_deref()?;
        let terms = [query.name.first.as_str(), query.name.last.as_str()]
            .into_iter()
            .chain(query.keywords.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");
        let encoded: String = url::form_urlencoded::byte_serialize(terms.as_bytes()).collect();
        Some(template.replace("{query}", &encoded))
    }

    /// Fills the configured directory template with the encoded first and last name.
    fn directory_url(&self, query: &PersonQuery) -> Option<String> {
        let template = self.config.directory_url_template.as_deref()?;
        let encode = |part: &str| url::form_urlencoded::byte_serialize(part.as_bytes()).collect::<String>();
        Some(
            template
                .replace("{first}", &encode(&query.name.first))
                .replace("{last}", &encode(&query.name.last)),
        )
    }

    /// Probes every candidate, resolving each domain's mail hosts once.
    async fn probe_candidates(
        &self,
        candidates: &BTreeSet<EmailCandidate>,
        task_label: &str,
    ) -> Vec<ProbeResult> {
        let mut probes = Vec::with_capacity(candidates.len());
        let mut smtp_used = false;

        for candidate in candidates {
            let hosts = self.resolve_mail_hosts(candidate.domain(), task_label).await;
            let hosts = hosts.as_slice();

            if hosts.is_empty() {
                probes.push(ProbeResult::no_mail_hosts(candidate.clone()));
                continue;
            }

            if smtp_used {
                let pause = get_random_sleep_duration(&self.config);
                tracing::trace!(target: "prospect_task", "{} Sleeping {:?} before probing {}", task_label, pause, candidate);
                sleep(pause).await;
            }
            smtp_used = true;

            probes.push(self.prober.verify(candidate, hosts).await);
        }
        probes
    }

    /// An empty list on any failure: the candidate is then inconclusive, not an error.
    /// Lookup failures other than a missing domain or missing records are retried by
    /// the next candidate that needs the domain.
    async fn resolve_mail_hosts(&self, domain: &str, task_label: &str) -> Vec<MailHost> {
        let cached = self.mx_cache.lock().get(domain).cloned();
        if let Some(hosts) = cached {
            return hosts;
        }

        match self.resolver.resolve(domain).await {
            Ok(hosts) => {
                tracing::debug!(target: "prospect_task", "{} {} mail host(s) for {}", task_label, hosts.len(), domain);
                self.mx_cache.lock().insert(domain.to_string(), hosts.clone());
                hosts
            }
            Err(e @ (AppError::NxDomain(_) | AppError::NoDnsRecords(_))) => {
                tracing::warn!(target: "prospect_task", "{} {}", task_label, e);
                self.mx_cache.lock().insert(domain.to_string(), Vec::new());
                Vec::new()
            }
            Err(e) => {
                tracing::error!(target: "prospect_task", "{} MX lookup for {} failed: {}", task_label, domain, e);
                Vec::new()
            }
        }
    }

    /// Scores verified candidates, pacing identity lookups. Sorted by ascending score.
    async fn score_verified(
        &self,
        probes: &[ProbeResult],
        query: &PersonQuery,
        task_label: &str,
    ) -> Vec<ScoredMatch> {
        let mut matches = Vec::new();
        if !self.scorer.is_enabled() {
            return matches;
        }

        let mut looked_up = false;
        for probe in probes.iter().filter(|p| p.verified) {
            if looked_up {
                sleep(self.config.identity_pacing).await;
            }
            looked_up = true;

            match self.scorer.score(&probe.candidate, &query.name).await {
                Ok(Some(scored)) => matches.push(scored),
                Ok(None) => {}
                Err(e) if e.is_transport() => {
                    tracing::error!(target: "identity_task", "{} Identity lookup for {} failed: {}", task_label, probe.candidate, e);
                }
                Err(e) => {
                    tracing::warn!(target: "identity_task", "{} No identity for {}: {}", task_label, probe.candidate, e);
                }
            }
        }

        matches.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.candidate.cmp(&b.candidate)));
        matches
    }
}
