//! Validation of the merged `Config`.

use super::{Config, Result};
use crate::core::error::AppError;
use crate::core::models::EmailCandidate;

/// Rejects impossible settings and clamps questionable ones, logging each adjustment.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    if config.sleep_between_requests.0 < 0.0 || config.sleep_between_requests.1 < 0.0 {
        return Err(AppError::Config(
            "Sleep durations cannot be negative.".to_string(),
        ));
    }
    if config.sleep_between_requests.0 > config.sleep_between_requests.1 {
        tracing::warn!(
            "Min sleep ({:.2}s) > Max sleep ({:.2}s). Setting max sleep = min sleep.",
            config.sleep_between_requests.0,
            config.sleep_between_requests.1
        );
        config.sleep_between_requests.1 = config.sleep_between_requests.0;
    }
    if config.max_concurrency == 0 {
        tracing::warn!("Max concurrency was set to 0. Setting to 1.");
        config.max_concurrency = 1;
    }
    if config.fetch_attempts == 0 {
        tracing::warn!("Fetch attempts was set to 0. Setting to 1.");
        config.fetch_attempts = 1;
    }
    if config.dns_servers.is_empty() {
        tracing::warn!("DNS servers list is empty. Falling back to the system resolver configuration.");
    }
    if config.smtp_port == 0 {
        return Err(AppError::Config("SMTP port cannot be 0.".to_string()));
    }
    if config.helo_name.is_empty() {
        tracing::warn!("HELO name is empty. Using 'localhost'.");
        config.helo_name = "localhost".to_string();
    }

    if config.sender_policy.senders.is_empty() {
        return Err(AppError::Config(
            "Sender pool must contain at least one address.".to_string(),
        ));
    }
    for sender in &config.sender_policy.senders {
        if EmailCandidate::parse(sender).is_none() {
            return Err(AppError::Config(format!(
                "Invalid sender address in pool: {}",
                sender
            )));
        }
    }

    if let Some(ref template) = config.search_url_template {
        if !template.contains("{query}") {
            tracing::warn!(
                "Search URL template '{}' has no {{query}} placeholder; every query will fetch the same page.",
                template
            );
        }
        url::Url::parse(&template.replace("{query}", "x"))?;
    }
    if let Some(ref template) = config.directory_url_template {
        if !template.contains("{first}") || !template.contains("{last}") {
            tracing::warn!(
                "Directory URL template '{}' lacks a {{first}} or {{last}} placeholder.",
                template
            );
        }
        url::Url::parse(&template.replace("{first}", "x").replace("{last}", "y"))?;
    }
    if config.identity_endpoint.is_empty() {
        return Err(AppError::Config(
            "Identity endpoint cannot be empty.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_concurrency_and_sleep() {
        let mut config = Config {
            max_concurrency: 0,
            sleep_between_requests: (2.0, 1.0),
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.sleep_between_requests, (2.0, 2.0));
    }

    #[test]
    fn test_rejects_bad_sender_pool() {
        let mut config = Config::default();
        config.sender_policy.senders = vec!["not-an-address".to_string()];
        assert!(matches!(
            validate_config(&mut config),
            Err(AppError::Config(_))
        ));

        config.sender_policy.senders.clear();
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_rejects_unparseable_search_template() {
        let mut config = Config {
            search_url_template: Some("not a url {query}".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            validate_config(&mut config),
            Err(AppError::UrlParse(_))
        ));
    }

    #[test]
    fn test_rejects_unparseable_directory_template() {
        let mut config = Config {
            directory_url_template: Some("{first}/{last}".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            validate_config(&mut config),
            Err(AppError::UrlParse(_))
        ));

        config.directory_url_template = Some("https://www.linkedin.com/pub/dir/{first}/{last}".to_string());
        assert!(validate_config(&mut config).is_ok());
    }
}
