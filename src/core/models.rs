//! Data types flowing through the prospecting pipeline.

use crate::core::error::{AppError, Result};
use crate::utils::smtp::{HostAttempt, HostVerdict, SmtpReply};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// File extensions that mark a scraped "address" as an asset reference (`logo@2x.png`).
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".bmp"];

/// A person's name, split into exactly one first and one last token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

impl PersonName {
    /// Splits `full_name` on whitespace. Anything other than two tokens is rejected.
    pub fn parse(full_name: &str) -> Result<Self> {
        let tokens: Vec<&str> = full_name.split_whitespace().collect();
        match tokens.as_slice() {
            [first, last] => Ok(Self {
                first: first.to_string(),
                last: last.to_string(),
            }),
            _ => Err(AppError::InvalidName(format!(
                "expected exactly a first and last name, got '{}'",
                full_name.trim()
            ))),
        }
    }

    pub fn full(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

/// One input record: who to look for, plus hints on where to look.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonQuery {
    pub name: PersonName,
    /// URLs to crawl and/or bare domains to generate addresses for.
    pub hint_urls: BTreeSet<String>,
    /// Free text appended to the search query, if search is configured.
    pub keywords: String,
}

impl PersonQuery {
    pub fn new<I, S>(full_name: &str, hint_urls: I, keywords: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            name: PersonName::parse(full_name)?,
            hint_urls: hint_urls
                .into_iter()
                .map(Into::into)
                .map(|h: String| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            keywords: keywords.into().trim().to_string(),
        })
    }

    /// Parses a batch record: the first two tokens are the name, tokens carrying a
    /// URL scheme are hints, and everything else is joined into the keywords.
    pub fn from_record(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(AppError::InvalidName(format!(
                "record has fewer than two name tokens: '{}'",
                line.trim()
            )));
        }
        let full_name = format!("{} {}", tokens[0], tokens[1]);

        let (hints, keywords): (Vec<&str>, Vec<&str>) = tokens[2..]
            .iter()
            .copied()
            .partition(|token| token.contains("://"));

        Self::new(&full_name, hints, keywords.join(" "))
    }
}

impl fmt::Display for PersonQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A normalized address: lowercase, no whitespace, not an asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailCandidate(String);

impl EmailCandidate {
    /// Normalizes `raw` and returns `None` if it cannot be a probe-able address.
    pub fn parse(raw: &str) -> Option<Self> {
        let email = raw.trim().to_lowercase();

        if email.is_empty() || email.chars().any(char::is_whitespace) {
            return None;
        }
        let (local, domain) = email.split_once('@')?;
        if IMAGE_EXTENSIONS
            .iter()
            .any(|ext| local.ends_with(ext) || domain.ends_with(ext))
        {
            return None;
        }
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || local.starts_with("//")
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return None;
        }

        Some(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }

    pub fn domain(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or_default()
    }
}

impl fmt::Display for EmailCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailCandidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A mail exchanger for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailHost {
    hostname: String,
    pub preference: u16,
}

impl MailHost {
    pub fn new(hostname: &str, preference: u16) -> Self {
        Self {
            hostname: hostname.trim().trim_end_matches('.').to_lowercase(),
            preference,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Display for MailHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hostname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Accepted,
    Rejected,
    Inconclusive,
}

/// Final verdict for one candidate after walking its mail hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: EmailCandidate,
    pub verified: bool,
    pub outcome: ProbeOutcome,
    pub last_reply: Option<SmtpReply>,
    /// The conclusive host, or the last host tried when nothing was conclusive.
    pub host: Option<String>,
    pub attempts: Vec<HostAttempt>,
}

impl ProbeResult {
    pub(crate) fn from_attempts(candidate: EmailCandidate, attempts: Vec<HostAttempt>) -> Self {
        let conclusive = attempts.iter().find(|a| a.verdict.is_conclusive());
        let reported = conclusive.or_else(|| attempts.last());

        let outcome = match conclusive.map(|a| a.verdict) {
            Some(HostVerdict::Accepted) => ProbeOutcome::Accepted,
            Some(HostVerdict::Rejected) => ProbeOutcome::Rejected,
            _ => ProbeOutcome::Inconclusive,
        };

        Self {
            candidate,
            verified: outcome == ProbeOutcome::Accepted,
            outcome,
            last_reply: reported.and_then(|a| a.last_reply.clone()),
            host: reported.map(|a| a.host.clone()),
            attempts,
        }
    }

    pub(crate) fn no_mail_hosts(candidate: EmailCandidate) -> Self {
        Self::from_attempts(candidate, Vec::new())
    }
}

/// What an identity provider knows about the owner of an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub full_name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub candidate: EmailCandidate,
    /// Edit distance between the identity's name and the queried name. Lower is better.
    pub score: usize,
    pub identity: Identity,
}

/// Everything one query produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProspectResult {
    pub candidates_considered: usize,
    pub probes: Vec<ProbeResult>,
    /// Sorted by ascending score.
    pub matches: Vec<ScoredMatch>,
    pub scores: BTreeMap<EmailCandidate, usize>,
    pub skipped_reason: Option<String>,
}

impl ProspectResult {
    pub fn verified(&self) -> impl Iterator<Item = &EmailCandidate> {
        self.probes
            .iter()
            .filter(|p| p.verified)
            .map(|p| &p.candidate)
    }

    pub fn best_match(&self) -> Option<&ScoredMatch> {
        self.matches.first()
    }

    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_name_requires_two_tokens() {
        let name = PersonName::parse("  Jane   Doe ").unwrap();
        assert_eq!(name.first, "Jane");
        assert_eq!(name.last, "Doe");
        assert!(matches!(
            PersonName::parse("Cher"),
            Err(AppError::InvalidName(_))
        ));
        assert!(matches!(
            PersonName::parse("Jean Luc Picard"),
            Err(AppError::InvalidName(_))
        ));
        assert!(PersonName::parse("").is_err());
    }

    #[test]
    fn test_from_record_splits_hints_and_keywords() {
        let query =
            PersonQuery::from_record("Jane Doe https://acme.com/team rust  berlin http://blog.example.org\n")
                .unwrap();
        assert_eq!(query.name.full(), "Jane Doe");
        assert_eq!(
            query.hint_urls,
            BTreeSet::from([
                "https://acme.com/team".to_string(),
                "http://blog.example.org".to_string()
            ])
        );
        assert_eq!(query.keywords, "rust berlin");

        assert!(PersonQuery::from_record("Jane").is_err());
    }

    #[test]
    fn test_candidate_normalization() {
        let c = EmailCandidate::parse("  John.Smith@Example.COM ").unwrap();
        assert_eq!(c.as_str(), "john.smith@example.com");
        assert_eq!(c.local_part(), "john.smith");
        assert_eq!(c.domain(), "example.com");
    }

    #[test]
    fn test_candidate_rejections() {
        assert!(EmailCandidate::parse("logo.png@cdn.example.com").is_none());
        assert!(EmailCandidate::parse("icon@2x.JPG").is_none());
        assert!(EmailCandidate::parse("//cdn.example.com@foo.com").is_none());
        assert!(EmailCandidate::parse("a b@example.com").is_none());
        assert!(EmailCandidate::parse("no-at-sign.example.com").is_none());
        assert!(EmailCandidate::parse("a@b@example.com").is_none());
        assert!(EmailCandidate::parse("@example.com").is_none());
        assert!(EmailCandidate::parse("user@localhost").is_none());
    }

    #[test]
    fn test_extension_like_labels_are_kept() {
        assert!(EmailCandidate::parse("info@pref.gifu.lg.jp").is_some());
        assert!(EmailCandidate::parse("x@a.pngroup.com").is_some());
        assert!(EmailCandidate::parse("jpeg.fan@example.com").is_some());
        assert!(EmailCandidate::parse("banner@cdn.example.webp").is_none());
    }

    #[test]
    fn test_mail_host_strips_trailing_dot() {
        let host = MailHost::new("ALT1.ASPMX.L.Google.com.", 20);
        assert_eq!(host.hostname(), "alt1.aspmx.l.google.com");
        assert_eq!(host.preference, 20);
    }
}
