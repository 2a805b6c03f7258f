//! Pulls email-like strings out of page content, including the `name at host dot tld` form.

use crate::core::models::EmailCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*(?:@|\s+at\s+)(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.|\s+dot\s+))+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?",
    )
    .expect("email pattern is valid")
});

static AT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+at\s+").expect("valid"));
static DOT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+dot\s+").expect("valid"));

/// Every address found in `content`, normalized. Obfuscated forms are rewritten,
/// then anything [`EmailCandidate::parse`] refuses (asset names, `//` prefixes) is dropped.
pub fn extract(content: &str) -> BTreeSet<EmailCandidate> {
    EMAIL_PATTERN
        .find_iter(content)
        .filter_map(|m| {
            let raw = m.as_str();
            let unobfuscated = AT_WORD.replace_all(raw, "@");
            let unobfuscated = DOT_WORD.replace_all(&unobfuscated, ".");
            let candidate = EmailCandidate::parse(&unobfuscated);
            if candidate.is_none() {
                tracing::trace!("Discarding extracted match '{}'", raw);
            }
            candidate
        })
        .collect()
}
