//! Identity lookups against a person-enrichment HTTP API.

use super::identity::IdentityResolver;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::Identity;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// Resolves an address with `GET {endpoint}?email=...` and a bearer key.
///
/// * `200` carries the person; the name is read from `name.fullName`.
/// * `202` means the lookup was queued and `404` means unknown; both are `Ok(None)`.
/// * Anything else is an `AppError::Identity`.
pub struct HttpIdentityResolver {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpIdentityResolver {
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build identity client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.identity_endpoint.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn lookup(&self, email: &str) -> Result<Option<Identity>> {
        let task_label = format!("[Identity: {}]", email);
        tracing::debug!(target: "identity_task", "{} Querying {}", task_label, self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("email", email)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let person: serde_json::Value = response.json().await?;
                let Some(full_name) = person
                    .pointer("/name/fullName")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                else {
                    tracing::warn!(target: "identity_task", "{} Record has no full name", task_label);
                    return Ok(None);
                };
                Ok(Some(Identity {
                    full_name: full_name.to_string(),
                    metadata: person,
                }))
            }
            StatusCode::ACCEPTED | StatusCode::NOT_FOUND => {
                tracing::debug!(target: "identity_task", "{} No identity ({})", task_label, status);
                Ok(None)
            }
            _ => {
                tracing::error!(target: "identity_task", "{} Unexpected status {}", task_label, status);
                Err(AppError::Identity(format!(
                    "lookup for {} returned HTTP {}",
                    email, status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn resolver(endpoint: String) -> HttpIdentityResolver {
        let config = Config {
            identity_endpoint: endpoint,
            ..Config::default()
        };
        HttpIdentityResolver::new(&config, "sk_test").unwrap()
    }

    #[tokio::test]
    async fn test_found_person() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/people/find")
            .match_query(Matcher::UrlEncoded("email".into(), "jane@acme.com".into()))
            .match_header("authorization", "Bearer sk_test")
            .with_status(200)
            .with_body(r#"{"name":{"fullName":"Jane Doe","givenName":"Jane"},"location":"Berlin"}"#)
            .create_async()
            .await;

        let identity = resolver(format!("{}/people/find", server.url()))
            .lookup("jane@acme.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.full_name, "Jane Doe");
        assert_eq!(identity.metadata["location"], "Berlin");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_queued_and_unknown_are_none() {
        let mut server = mockito::Server::new_async().await;
        let _queued = server
            .mock("GET", "/people/find")
            .match_query(Matcher::UrlEncoded("email".into(), "queued@acme.com".into()))
            .with_status(202)
            .create_async()
            .await;
        let _unknown = server
            .mock("GET", "/people/find")
            .match_query(Matcher::UrlEncoded("email".into(), "ghost@acme.com".into()))
            .with_status(404)
            .create_async()
            .await;

        let resolver = resolver(format!("{}/people/find", server.url()));
        assert!(resolver.lookup("queued@acme.com").await.unwrap().is_none());
        assert!(resolver.lookup("ghost@acme.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_identity_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/people/find")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let result = resolver(format!("{}/people/find", server.url()))
            .lookup("jane@acme.com")
            .await;
        assert!(matches!(result, Err(AppError::Identity(_))));
    }
}
