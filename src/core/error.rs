//! Error type shared across the crate.
//!
//! Most failures in the pipeline are host- or fetch-scoped and are logged where they
//! happen; only input validation and configuration problems normally reach callers.

use thiserror::Error;

/// Result type alias using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// The person's name did not split into exactly a first and last token.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A hint could not be turned into a bare domain (e.g. it is a full path).
    #[error("Domain extraction failed: {0}")]
    DomainExtraction(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A connect, handshake or fetch failed after any retries were exhausted.
    #[error("Transport error for {target}: {message}")]
    Transport { target: String, message: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Domain does not exist: {0}")]
    NxDomain(String),

    #[error("No mail exchanger records found for {0}")]
    NoDnsRecords(String),

    #[error("DNS resolution error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    #[error("Identity lookup failed: {0}")]
    Identity(String),

    #[error("Cookie store error: {0}")]
    Cookies(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub(crate) fn transport(target: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Transport {
            target: target.into(),
            message: message.into(),
        }
    }

    /// True for errors that only concern a single host or fetch and never abort a run.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Transport { .. }
                | AppError::Http(_)
                | AppError::HttpStatus { .. }
                | AppError::Smtp(_)
                | AppError::Timeout(_)
                | AppError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(AppError::transport("mx.acme.com", "refused").is_transport());
        assert!(AppError::HttpStatus { url: "https://acme.com".into(), status: 503 }.is_transport());
        assert!(!AppError::Identity("quota exceeded".into()).is_transport());
        assert!(!AppError::NxDomain("acme.invalid".into()).is_transport());
    }
}
