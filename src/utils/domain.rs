//! Utility functions for handling domain names and URLs.

use crate::core::error::{AppError, Result};
use url::Url;

/// Reduces a hint to a bare domain usable for address generation.
///
/// Strips `http://`, `https://` and every literal `www`, then trims surrounding dots
/// and lowercases. Anything still containing `/` is a full path, not a domain, and is
/// rejected with `AppError::DomainExtraction`, as is a result without a dot.
pub(crate) fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction(
            "Input string is empty".to_string(),
        ));
    }

    let lowered = trimmed.to_lowercase();
    let stripped = lowered
        .replace("https://", "")
        .replace("http://", "")
        .replace("www", "");
    let domain = stripped.trim_matches('.');

    if domain.contains('/') {
        tracing::debug!("Rejecting '{}' as a domain: it is a path", trimmed);
        return Err(AppError::DomainExtraction(format!(
            "'{}' is a path, not a bare domain",
            trimmed
        )));
    }
    if domain.is_empty()
        || !domain.contains('.')
        || domain.contains("..")
        || domain.chars().any(char::is_whitespace)
    {
        return Err(AppError::DomainExtraction(format!(
            "Extracted domain appears invalid: '{}'",
            domain
        )));
    }

    Ok(domain.to_string())
}

/// Parses an absolute http(s) URL. Anything else (relative links, `mailto:`, `javascript:`) is `None`.
pub(crate) fn absolute_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Some(url),
        _ => None,
    }
}

/// True when `url`'s host is `suffix` or a subdomain of it.
pub(crate) fn host_matches(url: &str, suffix: &str) -> bool {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) else {
        return false;
    };
    let suffix = suffix.trim().trim_start_matches('.').to_lowercase();
    !suffix.is_empty() && (host == suffix || host.ends_with(&format!(".{}", suffix)))
}
