//! Runtime configuration: defaults, the TOML file shape, and the fluent builder.

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;

pub(crate) use crate::core::error::Result;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sender addresses declared in `MAIL FROM` while negotiating with a mail host.
const DEFAULT_SENDER_POOL: &[&str] = &[
    "info@gmail.com",
    "contact@gmail.com",
    "contact@yahoo.com",
    "info@yahoo.com",
    "support@google.com",
];

/// How the sender pool is used once a sender has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderMode {
    /// The first accepted sender is authoritative; an ambiguous recipient reply ends the host.
    #[default]
    FirstAccepted,
    /// After an ambiguous recipient reply, RSET and continue with the next pool sender.
    EachAccepted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderPolicy {
    pub senders: Vec<String>,
    pub mode: SenderMode,
}

impl Default for SenderPolicy {
    fn default() -> Self {
        Self {
            senders: DEFAULT_SENDER_POOL.iter().map(|s| s.to_string()).collect(),
            mode: SenderMode::FirstAccepted,
        }
    }
}

/// Effective configuration used by every component of a run.
#[derive(Debug, Clone)]
pub struct Config {
    // Network
    pub request_timeout: Duration,
    pub user_agent: String,
    pub fetch_attempts: u32,
    pub retry_backoff: Duration,
    /// Jittered pause (seconds) between consecutive candidates that hit SMTP.
    pub sleep_between_requests: (f32, f32),

    // DNS
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    // SMTP
    pub smtp_timeout: Duration,
    pub host_attempt_timeout: Duration,
    pub smtp_port: u16,
    pub helo_name: String,
    /// Fixed delay between mail-host attempts for one candidate.
    pub host_pacing: Duration,
    pub sender_policy: SenderPolicy,

    // Crawl
    pub max_depth: usize,
    /// Search page to crawl, with `{query}` replaced by the encoded name and keywords.
    pub search_url_template: Option<String>,
    /// Per-name profile directory, with `{first}` and `{last}` filled in. Crawled through
    /// the routed fetcher, so listed hosts get the cookie-bearing session.
    pub directory_url_template: Option<String>,
    /// Hosts fetched through the cookie-bearing session instead of anonymously.
    pub authenticated_hosts: Vec<String>,
    pub cookie_jar_path: String,

    // Identity
    pub identity_endpoint: String,
    pub identity_api_key: Option<String>,
    pub identity_pacing: Duration,
    pub max_name_distance: Option<usize>,

    // Pipeline
    pub max_concurrency: usize,
    /// Extra domains every name is tried against, on top of the query's hints and gmail.com.
    pub default_domains: Vec<String>,

    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            fetch_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            sleep_between_requests: (0.5, 1.5),

            dns_timeout: Duration::from_secs(5),
            dns_servers: vec![
                "8.8.8.8".to_string(),
                "1.1.1.1".to_string(),
                "9.9.9.9".to_string(),
            ],

            smtp_timeout: Duration::from_secs(10),
            host_attempt_timeout: Duration::from_secs(45),
            smtp_port: 25,
            helo_name: "localhost".to_string(),
            host_pacing: Duration::from_secs(1),
            sender_policy: SenderPolicy::default(),

            max_depth: 1,
            search_url_template: None,
            directory_url_template: None,
            authenticated_hosts: vec!["linkedin.com".to_string()],
            cookie_jar_path: ".prospector-cookies.json".to_string(),

            identity_endpoint: "https://person.clearbit.com/v2/people/find".to_string(),
            identity_api_key: None,
            identity_pacing: Duration::from_secs(2),
            max_name_distance: None,

            max_concurrency: 5,
            default_domains: Vec::new(),

            loaded_config_path: None,
        }
    }
}

/// Shape of the optional TOML configuration file. Every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub network: NetworkSection,
    pub dns: DnsSection,
    pub smtp: SmtpSection,
    pub crawl: CrawlSection,
    pub identity: IdentitySection,
    pub pipeline: PipelineSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSection {
    pub request_timeout: Option<u64>,
    /// Takes precedence over `request_timeout` when both are set.
    pub request_timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub fetch_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub min_sleep: Option<f32>,
    pub max_sleep: Option<f32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DnsSection {
    pub dns_timeout: Option<u64>,
    pub dns_timeout_ms: Option<u64>,
    pub dns_servers: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpSection {
    pub smtp_timeout: Option<u64>,
    pub smtp_timeout_ms: Option<u64>,
    pub host_attempt_timeout: Option<u64>,
    pub host_attempt_timeout_ms: Option<u64>,
    pub smtp_port: Option<u16>,
    pub helo_name: Option<String>,
    pub host_pacing_ms: Option<u64>,
    pub sender_pool: Option<Vec<String>>,
    pub sender_mode: Option<SenderMode>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlSection {
    pub max_depth: Option<usize>,
    pub search_url_template: Option<String>,
    pub directory_url_template: Option<String>,
    pub authenticated_hosts: Option<Vec<String>>,
    pub cookie_jar_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentitySection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub identity_pacing_ms: Option<u64>,
    pub max_name_distance: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_concurrency: Option<usize>,
    pub default_domains: Option<Vec<String>>,
}

/// Picks a pause inside the configured `sleep_between_requests` range.
pub(crate) fn get_random_sleep_duration(config: &Config) -> Duration {
    let (min, max) = config.sleep_between_requests;
    if max <= 0.0 {
        return Duration::ZERO;
    }
    if max <= min {
        return Duration::from_secs_f32(min.max(0.0));
    }
    Duration::from_secs_f32(rand::thread_rng().gen_range(min..=max))
}
