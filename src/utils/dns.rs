//! Mail-exchanger resolution.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::MailHost;

use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// Resolves a domain to its mail hosts, most preferred first.
#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<Vec<MailHost>>;
}

/// Builds the async resolver from the configured name servers, or the system
/// configuration when none parse.
pub(crate) fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let ips: Vec<IpAddr> = config
        .dns_servers
        .iter()
        .filter_map(|s| match s.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!("Ignoring unparseable DNS server address '{}'", s);
                None
            }
        })
        .collect();

    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;
    opts.attempts = 2;

    let resolver_config = if ips.is_empty() {
        tracing::debug!("Using system DNS configuration");
        let (system_config, _) = trust_dns_resolver::system_conf::read_system_conf().map_err(|e| {
            AppError::Initialization(format!("Failed to read system DNS configuration: {}", e))
        })?;
        system_config
    } else {
        tracing::debug!("Using DNS servers: {:?}", ips);
        ResolverConfig::from_parts(None, vec![], NameServerConfigGroup::from_ips_clear(&ips, 53, true))
    };

    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

/// [`MxResolver`] backed by DNS.
pub struct DnsMxResolver {
    resolver: TokioAsyncResolver,
}

impl DnsMxResolver {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            resolver: create_resolver(config)?,
        })
    }
}

#[async_trait]
impl MxResolver for DnsMxResolver {
    async fn resolve(&self, domain: &str) -> Result<Vec<MailHost>> {
        let lookup = match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(e) => {
                return Err(match e.kind() {
                    ResolveErrorKind::NoRecordsFound { response_code, .. }
                        if *response_code == ResponseCode::NXDomain =>
                    {
                        AppError::NxDomain(domain.to_string())
                    }
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        AppError::NoDnsRecords(domain.to_string())
                    }
                    _ => AppError::Dns(e),
                });
            }
        };

        let mut hosts: Vec<MailHost> = lookup
            .iter()
            .map(|mx| MailHost::new(&mx.exchange().to_utf8(), mx.preference()))
            .filter(|host| !host.hostname().is_empty())
            .collect();
        // stable: equal preferences keep resolver order
        hosts.sort_by_key(|host| host.preference);

        if hosts.is_empty() {
            return Err(AppError::NoDnsRecords(domain.to_string()));
        }
        tracing::debug!(
            "Resolved {} mail host(s) for {}: {}",
            hosts.len(),
            domain,
            hosts.iter().map(|h| h.hostname()).collect::<Vec<_>>().join(", ")
        );
        Ok(hosts)
    }
}
