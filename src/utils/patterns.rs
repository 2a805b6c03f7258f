//! Generates likely email addresses from a person's name and a set of domains.

use crate::core::models::{EmailCandidate, PersonName};
use crate::utils::domain::normalize_domain;
use std::collections::BTreeSet;

/// Webmail domain tried for every name, whatever the hints and configuration.
pub(crate) const ALWAYS_TRIED_DOMAIN: &str = "gmail.com";

/// Removes most non-alphanumeric characters, whitespace, and converts to lowercase.
fn sanitize_name_part(part: &str) -> String {
    part.trim()
        .replace(
            |c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'),
            "",
        )
        .to_lowercase()
}

/// Local parts tried for every domain.
fn local_parts(first: &str, last: &str) -> Vec<String> {
    let first_initial = first.chars().next().unwrap_or_default();
    let last_initial = last.chars().next().unwrap_or_default();

    vec![
        format!("{}.{}", first, last),           // john.smith
        format!("{}{}", first_initial, last),    // jsmith
        format!("{}{}", first, last_initial),    // johns
        format!("{}{}", last_initial, first),    // sjohn
        format!("{}{}", first, last),            // johnsmith
        first.to_string(),                       // john
    ]
}

/// Crosses the name's local parts with every usable domain.
///
/// [`ALWAYS_TRIED_DOMAIN`] and `extra_domains` are tried in addition to `domains`. Hints
/// that do not normalize to a bare domain are logged and skipped; they never fail the call.
pub(crate) fn generate_candidates<'a>(
    name: &PersonName,
    domains: impl IntoIterator<Item = &'a str>,
    extra_domains: &[String],
) -> BTreeSet<EmailCandidate> {
    let first = sanitize_name_part(&name.first);
    let last = sanitize_name_part(&name.last);

    if first.is_empty() || last.is_empty() {
        tracing::warn!(
            "Cannot generate patterns: sanitized name parts are empty (original: '{}')",
            name
        );
        return BTreeSet::new();
    }

    let domains: BTreeSet<String> = domains
        .into_iter()
        .map(str::to_string)
        .chain(extra_domains.iter().cloned())
        .chain(std::iter::once(ALWAYS_TRIED_DOMAIN.to_string()))
        .filter_map(|raw| match normalize_domain(&raw) {
            Ok(domain) => Some(domain),
            Err(e) => {
                tracing::debug!("Skipping '{}' for pattern generation: {}", raw, e);
                None
            }
        })
        .collect();

    let parts = local_parts(&first, &last);
    let candidates: BTreeSet<EmailCandidate> = domains
        .iter()
        .flat_map(|domain| {
            parts
                .iter()
                .filter_map(move |local| EmailCandidate::parse(&format!("{}@{}", local, domain)))
        })
        .collect();

    tracing::debug!(
        "Generated {} candidates for '{}' across {} domain(s)",
        candidates.len(),
        name,
        domains.len()
    );
    candidates
}
