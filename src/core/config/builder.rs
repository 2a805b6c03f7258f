//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile, Result, SenderMode};
use crate::core::error::AppError;
use std::path::Path;
use std::time::Duration;

/// Files checked, in order, when no explicit configuration file is given.
const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["./mail-prospector.toml", "./config.toml"];

/// Builder for [`Config`].
///
/// Precedence is defaults, then the configuration file, then the explicit overrides
/// set on the builder. Validation runs last.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    skip_default_locations: bool,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    /// Do not look for configuration files in the working directory.
    pub fn without_default_files(mut self) -> Self {
        self.skip_default_locations = true;
        self
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.pipeline.max_concurrency = Some(value);
        self
    }
    pub fn default_domains(mut self, domains: Vec<String>) -> Self {
        self.overrides.pipeline.default_domains = Some(domains);
        self
    }
    pub fn sleep_between_requests(mut self, min: f32, max: f32) -> Self {
        self.overrides.network.min_sleep = Some(min);
        self.overrides.network.max_sleep = Some(max);
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.network.request_timeout_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.overrides.network.user_agent = Some(value.into());
        self
    }
    pub fn fetch_attempts(mut self, value: u32) -> Self {
        self.overrides.network.fetch_attempts = Some(value);
        self
    }
    pub fn retry_backoff(mut self, duration: Duration) -> Self {
        self.overrides.network.retry_backoff_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn smtp_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.smtp_timeout_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn host_attempt_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.host_attempt_timeout_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn smtp_port(mut self, port: u16) -> Self {
        self.overrides.smtp.smtp_port = Some(port);
        self
    }
    pub fn helo_name(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.helo_name = Some(value.into());
        self
    }
    pub fn host_pacing(mut self, duration: Duration) -> Self {
        self.overrides.smtp.host_pacing_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn sender_pool(mut self, senders: Vec<String>) -> Self {
        self.overrides.smtp.sender_pool = Some(senders);
        self
    }
    pub fn sender_mode(mut self, mode: SenderMode) -> Self {
        self.overrides.smtp.sender_mode = Some(mode);
        self
    }
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.overrides.crawl.max_depth = Some(depth);
        self
    }
    pub fn search_url_template(mut self, template: Option<impl Into<String>>) -> Self {
        self.overrides.crawl.search_url_template = template.map(Into::into);
        self
    }
    pub fn directory_url_template(mut self, template: Option<impl Into<String>>) -> Self {
        self.overrides.crawl.directory_url_template = template.map(Into::into);
        self
    }
    pub fn authenticated_hosts(mut self, hosts: Vec<String>) -> Self {
        self.overrides.crawl.authenticated_hosts = Some(hosts);
        self
    }
    pub fn cookie_jar_path(mut self, path: impl Into<String>) -> Self {
        self.overrides.crawl.cookie_jar_path = Some(path.into());
        self
    }
    pub fn identity_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.overrides.identity.endpoint = Some(endpoint.into());
        self
    }
    pub fn identity_api_key(mut self, key: Option<impl Into<String>>) -> Self {
        self.overrides.identity.api_key = key.map(Into::into);
        self
    }
    pub fn identity_pacing(mut self, duration: Duration) -> Self {
        self.overrides.identity.identity_pacing_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn max_name_distance(mut self, value: usize) -> Self {
        self.overrides.identity.max_name_distance = Some(value);
        self
    }

    /// Builds the final `Config`, applying defaults, file settings, overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {}",
                        path, e
                    )));
                }
            }
        } else if !self.skip_default_locations {
            for path_str in DEFAULT_CONFIG_LOCATIONS {
                if !Path::new(path_str).exists() {
                    continue;
                }
                match load_config_file(path_str) {
                    Ok(file_config) => {
                        apply_file_config(&mut self.config, &file_config);
                        loaded_path = Some(path_str.to_string());
                        tracing::info!("Loaded configuration from default location: {}", path_str);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load or parse default config '{}': {}", path_str, e);
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::debug!("No configuration file found. Using defaults and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_overrides_win_over_file() {
        let path = std::env::temp_dir().join(format!(
            "mail-prospector-cfg-{}.toml",
            rand::random::<u32>()
        ));
        fs::write(
            &path,
            "[pipeline]\nmax_concurrency = 3\n[smtp]\nsmtp_port = 2525\nhelo_name = \"probe.example.org\"\n",
        )
        .unwrap();

        let config = ConfigBuilder::new()
            .config_file(path.to_string_lossy())
            .max_concurrency(8)
            .build()
            .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.smtp_port, 2525);
        assert_eq!(config.helo_name, "probe.example.org");
        assert!(config.loaded_config_path.is_some());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigBuilder::new()
            .config_file("/definitely/not/here/mail-prospector.toml")
            .build();
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_defaults_survive_empty_overrides() {
        let config = ConfigBuilder::new().without_default_files().build().unwrap();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.sender_policy.senders.len(), 5);
        assert_eq!(config.host_pacing, Duration::from_secs(1));
        assert_eq!(config.identity_pacing, Duration::from_secs(2));
    }

    #[test]
    fn test_sub_second_timeouts_survive() {
        let config = ConfigBuilder::new()
            .without_default_files()
            .request_timeout(Duration::from_millis(1500))
            .dns_timeout(Duration::from_millis(750))
            .smtp_timeout(Duration::from_millis(250))
            .host_attempt_timeout(Duration::from_millis(900))
            .build()
            .unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.dns_timeout, Duration::from_millis(750));
        assert_eq!(config.smtp_timeout, Duration::from_millis(250));
        assert_eq!(config.host_attempt_timeout, Duration::from_millis(900));
    }
}
