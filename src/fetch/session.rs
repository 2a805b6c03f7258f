//! Cookie-bearing fetches for hosts that need an established session.
//!
//! The jar is loaded once when a run starts and written back once when it ends. Cookies
//! follow RFC 6265 domain and path matching, and reqwest feeds the jar from every
//! response it sees, redirect hops included.

use super::http::HttpFetcher;
use super::{FetchedContent, Fetcher};
use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use async_trait::async_trait;
use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads a jar written by [`save_jar`]. A missing file is an empty jar.
pub(crate) fn load_jar(path: &Path) -> Result<CookieStore> {
    if !path.exists() {
        tracing::debug!(target: "fetch_task", "No cookie jar at {}; starting empty", path.display());
        return Ok(CookieStore::default());
    }
    let reader = BufReader::new(File::open(path)?);
    cookie_store::serde::json::load_all(reader).map_err(|e| AppError::Cookies(e.to_string()))
}

/// Writes every cookie, session cookies included, so a run can resume a login.
pub(crate) fn save_jar(jar: &CookieStore, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    cookie_store::serde::json::save_incl_expired_and_nonpersistent(jar, &mut writer)
        .map_err(|e| AppError::Cookies(e.to_string()))?;
    writer.flush()?;
    Ok(())
}

/// Fetcher whose client shares one cookie store across every request of a run.
pub struct SessionFetcher {
    http: HttpFetcher,
    jar: Arc<CookieStoreMutex>,
    path: PathBuf,
}

impl SessionFetcher {
    pub fn new(config: &Config, path: impl Into<PathBuf>) -> Result<Self> {
        let jar = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        Ok(Self {
            http: HttpFetcher::with_cookie_store(config, Arc::clone(&jar))?,
            jar,
            path: path.into(),
        })
    }

    fn with_jar<T>(&self, f: impl FnOnce(&mut CookieStore) -> T) -> Result<T> {
        let mut guard = self
            .jar
            .lock()
            .map_err(|_| AppError::Cookies("cookie store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }

    /// Replaces the in-memory jar with the one on disk. An unreadable file is logged
    /// and ignored.
    pub fn load_cookies(&self) {
        let loaded = load_jar(&self.path).and_then(|jar| {
            let count = jar.iter_any().count();
            self.with_jar(|current| *current = jar)?;
            Ok(count)
        });
        match loaded {
            Ok(count) => {
                tracing::info!(target: "fetch_task", "Loaded {} cookie(s) from {}", count, self.path.display());
            }
            Err(e) => {
                tracing::warn!(target: "fetch_task", "Ignoring unreadable cookie jar {}: {}", self.path.display(), e);
            }
        }
    }

    pub fn persist_cookies(&self) -> Result<()> {
        let count = self.with_jar(|jar| -> Result<usize> {
            save_jar(jar, &self.path)?;
            Ok(jar.iter_any().count())
        })??;
        tracing::info!(target: "fetch_task", "Persisted {} cookie(s) to {}", count, self.path.display());
        Ok(())
    }

    pub fn cookie_count(&self) -> usize {
        self.with_jar(|jar| jar.iter_any().count()).unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for SessionFetcher {
    async fn fetch(&self, url: &str, body: Option<&str>) -> Result<FetchedContent> {
        self.http.fetch(url, body).await
    }
}
