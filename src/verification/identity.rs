//! Ranks verified addresses by how closely their resolved owner matches the queried name.

use crate::core::error::Result;
use crate::core::models::{EmailCandidate, Identity, PersonName, ScoredMatch};
use crate::utils::distance::name_distance;

use async_trait::async_trait;
use std::sync::Arc;

/// Looks up who owns an address.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` means the provider knows nothing about `email`.
    async fn lookup(&self, email: &str) -> Result<Option<Identity>>;

    /// `false` lets callers skip the scoring stage, and its pacing, entirely.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Used when no identity provider is configured. Knows nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdentityResolver;

#[async_trait]
impl IdentityResolver for NoIdentityResolver {
    async fn lookup(&self, _email: &str) -> Result<Option<Identity>> {
        Ok(None)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

pub struct IdentityScorer {
    resolver: Arc<dyn IdentityResolver>,
    max_distance: Option<usize>,
}

impl IdentityScorer {
    pub fn new(resolver: Arc<dyn IdentityResolver>, max_distance: Option<usize>) -> Self {
        Self {
            resolver,
            max_distance,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.resolver.is_enabled()
    }

    /// Scores `candidate` against `query_name`.
    ///
    /// No identity yields `Ok(None)`. So does a match farther than the configured
    /// maximum distance, when one is set.
    pub async fn score(
        &self,
        candidate: &EmailCandidate,
        query_name: &PersonName,
    ) -> Result<Option<ScoredMatch>> {
        let Some(identity) = self.resolver.lookup(candidate.as_str()).await? else {
            tracing::debug!(target: "identity_task", "No identity known for <{}>", candidate);
            return Ok(None);
        };

        let score = name_distance(&identity.full_name, &query_name.full());
        tracing::info!(target: "identity_task",
            "<{}> belongs to '{}' (distance {} from '{}')",
            candidate, identity.full_name, score, query_name);

        if let Some(max) = self.max_distance {
            if score > max {
                tracing::debug!(target: "identity_task",
                    "Dropping <{}>: distance {} exceeds {}", candidate, score, max);
                return Ok(None);
            }
        }

        Ok(Some(ScoredMatch {
            candidate: candidate.clone(),
            score,
            identity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Directory(HashMap<String, String>);

    #[async_trait]
    impl IdentityResolver for Directory {
        async fn lookup(&self, email: &str) -> Result<Option<Identity>> {
            Ok(self.0.get(email).map(|name| Identity {
                full_name: name.clone(),
                metadata: serde_json::Value::Null,
            }))
        }
    }

    fn directory() -> Arc<dyn IdentityResolver> {
        Arc::new(Directory(HashMap::from([
            ("jane.doe@acme.com".to_string(), " JANE DOE ".to_string()),
            ("jdoe@acme.com".to_string(), "John Doerr".to_string()),
        ])))
    }

    fn email(s: &str) -> EmailCandidate {
        EmailCandidate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_exact_name_scores_zero() {
        let scorer = IdentityScorer::new(directory(), None);
        let name = PersonName::parse("Jane Doe").unwrap();
        let scored = scorer.score(&email("jane.doe@acme.com"), &name).await.unwrap().unwrap();
        assert_eq!(scored.score, 0);
        assert_eq!(scored.identity.full_name, " JANE DOE ");
    }

    #[tokio::test]
    async fn test_unknown_address_is_none() {
        let scorer = IdentityScorer::new(directory(), None);
        let name = PersonName::parse("Jane Doe").unwrap();
        assert!(scorer.score(&email("x@acme.com"), &name).await.unwrap().is_none());

        let nobody = IdentityScorer::new(Arc::new(NoIdentityResolver), None);
        assert!(!nobody.is_enabled());
        assert!(nobody.score(&email("jane.doe@acme.com"), &name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_distance_cutoff() {
        let name = PersonName::parse("Jane Doe").unwrap();
        let strict = IdentityScorer::new(directory(), Some(2));
        assert!(strict.score(&email("jdoe@acme.com"), &name).await.unwrap().is_none());

        let lenient = IdentityScorer::new(directory(), None);
        let scored = lenient.score(&email("jdoe@acme.com"), &name).await.unwrap().unwrap();
        assert!(scored.score > 2);
    }
}
