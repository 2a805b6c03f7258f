//! Probes candidate addresses against their domain's mail hosts.

use super::error::describe_session_error;
use super::result::{HostAttempt, HostVerdict, ProbeStage, SmtpReply};
use super::session::{LettreConnector, ScopedSession, SmtpConnector};
use crate::core::config::{Config, SenderMode, SenderPolicy};
use crate::core::error::{AppError, Result};
use crate::core::models::{EmailCandidate, MailHost, ProbeResult};

use lettre::transport::smtp::client::SmtpConnection;
use lettre::transport::smtp::extension::ClientId;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Walks a candidate's mail hosts in preference order until one answers conclusively.
#[derive(Clone)]
pub struct SmtpProber {
    config: Arc<Config>,
    connector: Arc<dyn SmtpConnector>,
}

impl SmtpProber {
    /// A prober that speaks SMTP over the network.
    pub fn new(config: Arc<Config>) -> Self {
        let connector = LettreConnector::new(config.smtp_port, config.smtp_timeout, &config.helo_name);
        Self::with_connector(config, Arc::new(connector))
    }

    pub fn with_connector(config: Arc<Config>, connector: Arc<dyn SmtpConnector>) -> Self {
        Self { config, connector }
    }

    /// Probes `candidate` against `hosts`.
    ///
    /// Hosts are tried in order with `host_pacing` between them. The first host that
    /// accepts or rejects the recipient decides; if none does, the result is inconclusive
    /// and reports the last host tried.
    pub async fn verify(&self, candidate: &EmailCandidate, hosts: &[MailHost]) -> ProbeResult {
        if hosts.is_empty() {
            tracing::debug!(target: "smtp_task", "No mail hosts for <{}>", candidate);
            return ProbeResult::no_mail_hosts(candidate.clone());
        }

        let mut attempts = Vec::with_capacity(hosts.len());
        for (index, host) in hosts.iter().enumerate() {
            if index > 0 && !self.config.host_pacing.is_zero() {
                tracing::debug!(target: "smtp_task",
                    "Sleeping {:?} before trying {}", self.config.host_pacing, host);
                tokio::time::sleep(self.config.host_pacing).await;
            }

            let attempt = self.attempt_host(candidate, host).await;
            tracing::debug!(target: "smtp_task",
                "<{}> via {}: {:?} at {:?} ({})",
                candidate, host, attempt.verdict, attempt.stage, attempt.note);

            let conclusive = attempt.verdict.is_conclusive();
            attempts.push(attempt);
            if conclusive {
                break;
            }
        }

        let result = ProbeResult::from_attempts(candidate.clone(), attempts);
        tracing::info!(target: "smtp_task",
            "Final SMTP result for <{}>: {:?} (host: {})",
            candidate,
            result.outcome,
            result.host.as_deref().unwrap_or("-"));
        result
    }

    /// Runs one blocking host session off the async runtime, bounded by `host_attempt_timeout`.
    async fn attempt_host(&self, candidate: &EmailCandidate, host: &MailHost) -> HostAttempt {
        let connector = Arc::clone(&self.connector);
        let policy = self.config.sender_policy.clone();
        let budget = self.config.host_attempt_timeout;
        let task_host = host.clone();
        let task_candidate = candidate.clone();

        let task = tokio::task::spawn_blocking(move || {
            run_host_session(connector.as_ref(), &task_host, &task_candidate, &policy, budget)
        });

        match tokio::time::timeout(self.config.host_attempt_timeout, task).await {
            Ok(Ok(attempt)) => attempt,
            Ok(Err(join_err)) => {
                tracing::error!(target: "smtp_task", "SMTP task for {} panicked: {}", host, join_err);
                HostAttempt::started(host.hostname()).inconclusive(format!("task failed: {}", join_err))
            }
            Err(_) => {
                // The blocking session cannot be cancelled. It stops at its next command
                // boundary, and QUIT is sent from that thread.
                tracing::warn!(target: "smtp_task",
                    "SMTP attempt against {} exceeded {:?}; abandoning the session, it quits once its current command returns",
                    host, self.config.host_attempt_timeout);
                HostAttempt::started(host.hostname()).inconclusive("host attempt timed out")
            }
        }
    }
}

/// Time left for a host session. Each command may block for at most what remains.
struct SessionBudget {
    deadline: Instant,
}

impl SessionBudget {
    fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// Caps the next command at the remaining budget; `false` once it is spent.
    fn arm(&self, session: &mut ScopedSession, host: &MailHost) -> bool {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            tracing::debug!(target: "smtp_task", "Session budget for {} is spent", host);
            return false;
        }
        if let Err(e) = session.limit_command_time(remaining) {
            tracing::debug!(target: "smtp_task", "Could not cap command time on {}: {}", host, e);
        }
        true
    }
}

const BUDGET_SPENT: &str = "host attempt budget spent";

/// Drives one session: connect, greet, VRFY, then MAIL FROM / RCPT TO per the sender policy.
///
/// No command starts once `budget` has elapsed, and none may block past it. Every exit
/// path sends QUIT through the [`ScopedSession`] guard.
pub(crate) fn run_host_session(
    connector: &dyn SmtpConnector,
    host: &MailHost,
    candidate: &EmailCandidate,
    policy: &SenderPolicy,
    budget: Duration,
) -> HostAttempt {
    let budget = SessionBudget::new(budget);
    let mut attempt = HostAttempt::started(host.hostname());

    let mut session = match connector.connect(host) {
        Ok(session) => ScopedSession::new(session, host.hostname()),
        Err(e) => {
            let note = describe_session_error(&e, host.hostname());
            return attempt.inconclusive(note);
        }
    };
    attempt.stage = ProbeStage::Connected;

    if !budget.arm(&mut session, host) {
        return attempt.inconclusive(BUDGET_SPENT);
    }
    match session.greet() {
        Ok(reply) if reply.is_positive() => {
            attempt.stage = ProbeStage::Greeted;
        }
        Ok(reply) => return attempt.with_reply(reply).inconclusive("greeting refused"),
        Err(e) => {
            let note = describe_session_error(&e, host.hostname());
            return attempt.inconclusive(note);
        }
    }

    if !budget.arm(&mut session, host) {
        return attempt.inconclusive(BUDGET_SPENT);
    }
    match session.verify(candidate.as_str()) {
        Ok(reply) => {
            tracing::debug!(target: "smtp_task", "VRFY <{}> on {}: {}", candidate, host, reply);
            attempt.vrfy_reply = Some(reply);
        }
        Err(e) => {
            tracing::debug!(target: "smtp_task", "VRFY <{}> on {} failed: {}", candidate, host, e);
        }
    }
    attempt.stage = ProbeStage::Probed;

    for sender in &policy.senders {
        if !budget.arm(&mut session, host) {
            return attempt.inconclusive(BUDGET_SPENT);
        }
        let reply = match session.mail_from(sender) {
            Ok(reply) => reply,
            Err(e) => {
                let note = describe_session_error(&e, host.hostname());
                return attempt.inconclusive(note);
            }
        };
        if reply.code != 250 {
            tracing::debug!(target: "smtp_task", "Sender <{}> refused by {}: {}", sender, host, reply);
            attempt.last_reply = Some(reply);
            if !reset_session(&mut session, host) {
                return attempt.inconclusive("RSET failed after sender refusal");
            }
            continue;
        }
        attempt.stage = ProbeStage::SenderNegotiated;
        attempt.sender = Some(sender.clone());

        if !budget.arm(&mut session, host) {
            return attempt.inconclusive(BUDGET_SPENT);
        }
        let reply = match session.rcpt_to(candidate.as_str()) {
            Ok(reply) => reply,
            Err(e) => {
                let note = describe_session_error(&e, host.hostname());
                return attempt.inconclusive(note);
            }
        };

        match classify_recipient_reply(&reply) {
            HostVerdict::Inconclusive if policy.mode == SenderMode::EachAccepted => {
                tracing::debug!(target: "smtp_task",
                    "RCPT <{}> on {} inconclusive with sender <{}>: {}", candidate, host, sender, reply);
                attempt.last_reply = Some(reply);
                if !reset_session(&mut session, host) {
                    return attempt.inconclusive("RSET failed after inconclusive recipient reply");
                }
            }
            verdict => return attempt.conclude(verdict, reply),
        }
    }

    let note = if attempt.sender.is_some() {
        "no sender produced a conclusive recipient reply"
    } else {
        "no sender in the pool was accepted"
    };
    attempt.inconclusive(note)
}

/// 250 and 550 are the only conclusive recipient replies.
fn classify_recipient_reply(reply: &SmtpReply) -> HostVerdict {
    match reply.code {
        250 => HostVerdict::Accepted,
        550 => HostVerdict::Rejected,
        _ => HostVerdict::Inconclusive,
    }
}

fn reset_session(session: &mut ScopedSession, host: &MailHost) -> bool {
    match session.reset() {
        Ok(reply) if reply.is_positive() => true,
        Ok(reply) => {
            tracing::debug!(target: "smtp_task", "RSET refused by {}: {}", host, reply);
            false
        }
        Err(e) => {
            tracing::debug!(target: "smtp_task", "RSET to {} failed: {}", host, e);
            false
        }
    }
}

/// Tests basic SMTP connectivity to a known reliable server (Google).
/// This helps diagnose if outbound port 25 is generally blocked.
pub async fn test_smtp_connectivity(port: u16) -> Result<()> {
    tracing::info!("Testing outbound SMTP (port {}) connectivity to Google...", port);

    let test_server = "gmail-smtp-in.l.google.com";
    let timeout = Duration::from_secs(5);

    let probe = tokio::task::spawn_blocking(move || -> Result<()> {
        let socket_addr = (test_server, port)
            .to_socket_addrs()
            .map_err(|e| AppError::Config(format!("DNS resolution failed for {}: {}", test_server, e)))?
            .next()
            .ok_or_else(|| {
                AppError::Config(format!("Could not resolve any IP address for {}", test_server))
            })?;

        let helo_name = ClientId::Domain("localhost".to_string());
        let mut conn = SmtpConnection::connect(socket_addr, Some(timeout), &helo_name, None, None)?;
        conn.quit().ok();
        Ok(())
    });

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!("SMTP connectivity test successful (connected to {}).", test_server);
            Ok(())
        }
        Ok(Ok(Err(e))) => {
            tracing::error!("SMTP connectivity test failed for {}: {}", test_server, e);
            Err(e)
        }
        Ok(Err(join_err)) => Err(AppError::Initialization(format!(
            "SMTP connectivity task failed: {}",
            join_err
        ))),
        Err(_) => {
            tracing::error!(
                "SMTP connectivity test timed out connecting to {}. Outbound port {} is likely blocked.",
                test_server,
                port
            );
            Err(AppError::Timeout(format!(
                "SMTP connection to {} timed out",
                test_server
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::models::ProbeOutcome;
    use crate::utils::smtp::session::SmtpSession;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted behavior for one host.
    #[derive(Clone)]
    pub(crate) enum HostScript {
        Unreachable,
        /// RCPT reply code keyed by recipient; anything unlisted gets `default`.
        Replies {
            rcpt: HashMap<String, u16>,
            default: u16,
            refused_senders: Vec<String>,
        },
    }

    #[derive(Default)]
    pub(crate) struct StubConnector {
        pub(crate) hosts: HashMap<String, HostScript>,
        pub(crate) quits: Arc<AtomicUsize>,
        pub(crate) transcript: Arc<Mutex<Vec<String>>>,
        /// How long VRFY blocks before answering.
        pub(crate) vrfy_delay: Duration,
    }

    impl StubConnector {
        pub(crate) fn with_host(mut self, host: &str, script: HostScript) -> Self {
            self.hosts.insert(host.to_string(), script);
            self
        }
    }

    struct StubSession {
        rcpt: HashMap<String, u16>,
        default: u16,
        refused_senders: Vec<String>,
        quits: Arc<AtomicUsize>,
        transcript: Arc<Mutex<Vec<String>>>,
        vrfy_delay: Duration,
    }

    impl SmtpConnector for StubConnector {
        fn connect(&self, host: &MailHost) -> Result<Box<dyn SmtpSession>> {
            match self.hosts.get(host.hostname()) {
                Some(HostScript::Replies {
                    rcpt,
                    default,
                    refused_senders,
                }) => Ok(Box::new(StubSession {
                    rcpt: rcpt.clone(),
                    default: *default,
                    refused_senders: refused_senders.clone(),
                    quits: Arc::clone(&self.quits),
                    transcript: Arc::clone(&self.transcript),
                    vrfy_delay: self.vrfy_delay,
                })),
                _ => Err(AppError::transport(host.hostname(), "Connection refused")),
            }
        }
    }

    impl SmtpSession for StubSession {
        fn greet(&mut self) -> Result<SmtpReply> {
            self.transcript.lock().push("EHLO".into());
            Ok(SmtpReply::new(250, "hello"))
        }
        fn verify(&mut self, address: &str) -> Result<SmtpReply> {
            self.transcript.lock().push(format!("VRFY {}", address));
            std::thread::sleep(self.vrfy_delay);
            Ok(SmtpReply::new(252, "cannot verify"))
        }
        fn mail_from(&mut self, sender: &str) -> Result<SmtpReply> {
            self.transcript.lock().push(format!("MAIL {}", sender));
            if self.refused_senders.iter().any(|s| s == sender) {
                Ok(SmtpReply::new(553, "sender refused"))
            } else {
                Ok(SmtpReply::new(250, "ok"))
            }
        }
        fn rcpt_to(&mut self, recipient: &str) -> Result<SmtpReply> {
            self.transcript.lock().push(format!("RCPT {}", recipient));
            let code = self.rcpt.get(recipient).copied().unwrap_or(self.default);
            Ok(SmtpReply::new(code, "rcpt"))
        }
        fn reset(&mut self) -> Result<SmtpReply> {
            self.transcript.lock().push("RSET".into());
            Ok(SmtpReply::new(250, "reset"))
        }
        fn quit(&mut self) -> Result<()> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn limit_command_time(&mut self, limit: Duration) -> Result<()> {
            assert!(!limit.is_zero());
            Ok(())
        }
    }

    pub(crate) fn replies(default: u16) -> HostScript {
        HostScript::Replies {
            rcpt: HashMap::new(),
            default,
            refused_senders: Vec::new(),
        }
    }

    const BUDGET: Duration = Duration::from_secs(30);

    fn prober(connector: StubConnector, mode: SenderMode) -> SmtpProber {
        paced_prober(connector, mode, Duration::ZERO)
    }

    fn paced_prober(connector: StubConnector, mode: SenderMode, pacing: Duration) -> SmtpProber {
        let mut config = Config {
            host_pacing: pacing,
            ..Config::default()
        };
        config.sender_policy.mode = mode;
        SmtpProber::with_connector(Arc::new(config), Arc::new(connector))
    }

    fn candidate(s: &str) -> EmailCandidate {
        EmailCandidate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_falls_through_unreachable_host() {
        let connector = StubConnector::default()
            .with_host("mx1.example.com", HostScript::Unreachable)
            .with_host("mx2.example.com", replies(250));
        let prober = prober(connector, SenderMode::FirstAccepted);
        let hosts = [
            MailHost::new("mx1.example.com", 10),
            MailHost::new("mx2.example.com", 20),
        ];

        let result = prober.verify(&candidate("jane@example.com"), &hosts).await;
        assert!(result.verified);
        assert_eq!(result.host.as_deref(), Some("mx2.example.com"));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.last_reply.map(|r| r.code), Some(250));
    }

    #[tokio::test]
    async fn test_rejection_stops_host_walk() {
        let connector = StubConnector::default()
            .with_host("mx1.example.com", replies(550))
            .with_host("mx2.example.com", replies(250));
        let prober = prober(connector, SenderMode::FirstAccepted);
        let hosts = [
            MailHost::new("mx1.example.com", 10),
            MailHost::new("mx2.example.com", 20),
        ];

        let result = prober.verify(&candidate("nobody@example.com"), &hosts).await;
        assert!(!result.verified);
        assert_eq!(result.outcome, ProbeOutcome::Rejected);
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_all_inconclusive_reports_last_host() {
        let connector = StubConnector::default()
            .with_host("mx1.example.com", replies(451))
            .with_host("mx2.example.com", HostScript::Unreachable);
        let prober = prober(connector, SenderMode::FirstAccepted);
        let hosts = [
            MailHost::new("mx1.example.com", 10),
            MailHost::new("mx2.example.com", 20),
        ];

        let result = prober.verify(&candidate("jane@example.com"), &hosts).await;
        assert!(!result.verified);
        assert_eq!(result.outcome, ProbeOutcome::Inconclusive);
        assert_eq!(result.host.as_deref(), Some("mx2.example.com"));
    }

    #[tokio::test]
    async fn test_no_hosts_is_inconclusive() {
        let prober = prober(StubConnector::default(), SenderMode::FirstAccepted);
        let result = prober.verify(&candidate("jane@example.com"), &[]).await;
        assert!(!result.verified);
        assert!(result.attempts.is_empty());
        assert!(result.host.is_none());
    }

    #[test]
    fn test_session_quits_on_every_path() {
        let connector = StubConnector::default().with_host("mx.example.com", replies(550));
        let quits = Arc::clone(&connector.quits);
        let host = MailHost::new("mx.example.com", 10);
        let policy = SenderPolicy::default();

        run_host_session(&connector, &host, &candidate("a@example.com"), &policy, BUDGET);
        assert_eq!(quits.load(Ordering::SeqCst), 1);

        let unreachable = StubConnector::default();
        let attempt = run_host_session(&unreachable, &host, &candidate("a@example.com"), &policy, BUDGET);
        assert_eq!(attempt.stage, ProbeStage::Init);
        assert_eq!(unreachable.quits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refused_sender_moves_to_next() {
        let connector = StubConnector::default().with_host(
            "mx.example.com",
            HostScript::Replies {
                rcpt: HashMap::new(),
                default: 250,
                refused_senders: vec!["info@gmail.com".to_string()],
            },
        );
        let transcript = Arc::clone(&connector.transcript);
        let host = MailHost::new("mx.example.com", 10);

        let attempt = run_host_session(
            &connector,
            &host,
            &candidate("a@example.com"),
            &SenderPolicy::default(),
            BUDGET,
        );
        assert_eq!(attempt.verdict, HostVerdict::Accepted);
        assert_eq!(attempt.sender.as_deref(), Some("contact@gmail.com"));
        assert_eq!(attempt.vrfy_reply.as_ref().map(|r| r.code), Some(252));

        let log = transcript.lock().clone();
        assert_eq!(
            log,
            vec![
                "EHLO",
                "VRFY a@example.com",
                "MAIL info@gmail.com",
                "RSET",
                "MAIL contact@gmail.com",
                "RCPT a@example.com",
            ]
        );
    }

    #[test]
    fn test_sender_modes_on_ambiguous_recipient() {
        let host = MailHost::new("mx.example.com", 10);
        let policy = SenderPolicy {
            senders: vec!["a@gmail.com".to_string(), "b@gmail.com".to_string()],
            mode: SenderMode::FirstAccepted,
        };

        let connector = StubConnector::default().with_host("mx.example.com", replies(450));
        let transcript = Arc::clone(&connector.transcript);
        let attempt = run_host_session(&connector, &host, &candidate("x@example.com"), &policy, BUDGET);
        assert_eq!(attempt.verdict, HostVerdict::Inconclusive);
        assert_eq!(transcript.lock().iter().filter(|l| l.starts_with("RCPT")).count(), 1);

        let each = SenderPolicy {
            mode: SenderMode::EachAccepted,
            ..policy
        };
        let connector = StubConnector::default().with_host("mx.example.com", replies(450));
        let transcript = Arc::clone(&connector.transcript);
        let attempt = run_host_session(&connector, &host, &candidate("x@example.com"), &each, BUDGET);
        assert_eq!(attempt.verdict, HostVerdict::Inconclusive);
        assert_eq!(transcript.lock().iter().filter(|l| l.starts_with("RCPT")).count(), 2);
        assert!(attempt.note.contains("no sender produced"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_only_between_hosts() {
        let pacing = Duration::from_secs(3);
        let hosts = [
            MailHost::new("mx1.example.com", 10),
            MailHost::new("mx2.example.com", 20),
            MailHost::new("mx3.example.com", 30),
        ];

        let connector = StubConnector::default()
            .with_host("mx1.example.com", replies(451))
            .with_host("mx2.example.com", replies(451))
            .with_host("mx3.example.com", replies(451));
        let prober = paced_prober(connector, SenderMode::FirstAccepted, pacing);
        let start = tokio::time::Instant::now();
        let result = prober.verify(&candidate("jane@example.com"), &hosts).await;
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(start.elapsed(), pacing * 2);

        let connector = StubConnector::default().with_host("mx1.example.com", replies(250));
        let prober = paced_prober(connector, SenderMode::FirstAccepted, pacing);
        let start = tokio::time::Instant::now();
        let result = prober.verify(&candidate("jane@example.com"), &hosts).await;
        assert!(result.verified);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_spent_budget_stops_session_and_quits() {
        let connector = StubConnector {
            vrfy_delay: Duration::from_millis(50),
            ..StubConnector::default()
        }
        .with_host("mx.example.com", replies(250));
        let quits = Arc::clone(&connector.quits);
        let transcript = Arc::clone(&connector.transcript);
        let host = MailHost::new("mx.example.com", 10);

        let attempt = run_host_session(
            &connector,
            &host,
            &candidate("a@example.com"),
            &SenderPolicy::default(),
            Duration::from_millis(20),
        );

        assert_eq!(attempt.verdict, HostVerdict::Inconclusive);
        assert_eq!(attempt.note, BUDGET_SPENT);
        assert_eq!(quits.load(Ordering::SeqCst), 1);
        assert!(!transcript.lock().iter().any(|l| l.starts_with("MAIL")));
    }
}
