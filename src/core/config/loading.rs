//! Loads configuration files and merges their settings into a `Config`.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Reads and parses a TOML configuration file.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Reading config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let parsed: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    Ok(parsed)
}

fn non_empty(list: &Option<Vec<String>>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = list
        .as_ref()?
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Merges every set key of `file_config` onto `config`. Unset keys leave `config` untouched.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // Network
    let network = &file_config.network;
    if let Some(timeout) = network.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(ms) = network.request_timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ref user_agent) = network.user_agent {
        config.user_agent = user_agent.clone();
    }
    if let Some(attempts) = network.fetch_attempts {
        config.fetch_attempts = attempts;
    }
    if let Some(ms) = network.retry_backoff_ms {
        config.retry_backoff = Duration::from_millis(ms);
    }
    if let Some(min_sleep) = network.min_sleep {
        config.sleep_between_requests.0 = min_sleep;
    }
    if let Some(max_sleep) = network.max_sleep {
        config.sleep_between_requests.1 = max_sleep;
    }

    // DNS
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ms) = file_config.dns.dns_timeout_ms {
        config.dns_timeout = Duration::from_millis(ms);
    }
    if let Some(servers) = non_empty(&file_config.dns.dns_servers) {
        config.dns_servers = servers;
    }

    // SMTP
    let smtp = &file_config.smtp;
    if let Some(timeout) = smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }
    if let Some(ms) = smtp.smtp_timeout_ms {
        config.smtp_timeout = Duration::from_millis(ms);
    }
    if let Some(timeout) = smtp.host_attempt_timeout {
        config.host_attempt_timeout = Duration::from_secs(timeout);
    }
    if let Some(ms) = smtp.host_attempt_timeout_ms {
        config.host_attempt_timeout = Duration::from_millis(ms);
    }
    if let Some(port) = smtp.smtp_port {
        config.smtp_port = port;
    }
    if let Some(ref helo) = smtp.helo_name {
        config.helo_name = helo.trim().to_string();
    }
    if let Some(ms) = smtp.host_pacing_ms {
        config.host_pacing = Duration::from_millis(ms);
    }
    if let Some(senders) = non_empty(&smtp.sender_pool) {
        config.sender_policy.senders = senders;
    }
    if let Some(mode) = smtp.sender_mode {
        config.sender_policy.mode = mode;
    }

    // Crawl
    let crawl = &file_config.crawl;
    if let Some(depth) = crawl.max_depth {
        config.max_depth = depth;
    }
    if let Some(ref template) = crawl.search_url_template {
        let template = template.trim();
        config.search_url_template = (!template.is_empty()).then(|| template.to_string());
    }
    if let Some(ref template) = crawl.directory_url_template {
        let template = template.trim();
        config.directory_url_template = (!template.is_empty()).then(|| template.to_string());
    }
    if let Some(ref hosts) = crawl.authenticated_hosts {
        config.authenticated_hosts = hosts
            .iter()
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
    }
    if let Some(ref path) = crawl.cookie_jar_path {
        config.cookie_jar_path = path.clone();
    }

    // Identity
    let identity = &file_config.identity;
    if let Some(ref endpoint) = identity.endpoint {
        config.identity_endpoint = endpoint.trim().to_string();
    }
    if let Some(ref key) = identity.api_key {
        let key = key.trim();
        config.identity_api_key = (!key.is_empty()).then(|| key.to_string());
    }
    if let Some(ms) = identity.identity_pacing_ms {
        config.identity_pacing = Duration::from_millis(ms);
    }
    if let Some(distance) = identity.max_name_distance {
        config.max_name_distance = Some(distance);
    }

    // Pipeline
    if let Some(concurrency) = file_config.pipeline.max_concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(ref domains) = file_config.pipeline.default_domains {
        config.default_domains = domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SenderMode;

    #[test]
    fn test_apply_only_touches_set_keys() {
        let mut config = Config::default();
        let mut file = ConfigFile::default();
        file.smtp.sender_mode = Some(SenderMode::EachAccepted);
        file.dns.dns_servers = Some(vec!["  ".to_string()]);
        file.pipeline.default_domains = Some(vec!["  Proton.me ".to_string(), String::new()]);
        apply_file_config(&mut config, &file);

        assert_eq!(config.sender_policy.mode, SenderMode::EachAccepted);
        // blank server list is ignored
        assert_eq!(config.dns_servers, Config::default().dns_servers);
        assert_eq!(config.default_domains, vec!["proton.me".to_string()]);
        assert_eq!(config.smtp_port, 25);
    }

    #[test]
    fn test_blank_api_key_clears_it() {
        let mut config = Config {
            identity_api_key: Some("abc".to_string()),
            ..Config::default()
        };
        let mut file = ConfigFile::default();
        file.identity.api_key = Some("   ".to_string());
        apply_file_config(&mut config, &file);
        assert!(config.identity_api_key.is_none());
    }
}
