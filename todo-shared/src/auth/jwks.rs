/// JSON Web Key Set cache
///
/// Signing keys are published by the auth server at
/// `{auth_url}/api/auth/.well-known/jwks.json`. The set is fetched lazily,
/// kept for a TTL, and refetched when a token names a key id that is not in
/// the cached set (key rotation). Such forced refetches are rate limited,
/// since the key id is read before any signature is checked.
///
/// A static set can be injected instead of a URL; it never expires and is
/// never refetched.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Minimum time between refetches forced by unknown key ids
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// Path of the key set below the auth server URL
pub const JWKS_PATH: &str = "/api/auth/.well-known/jwks.json";

#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("Failed to fetch key set: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Key set contains no keys")]
    Empty,

    #[error("No key with id '{0}' in key set")]
    UnknownKey(String),
}

enum KeySource {
    Remote { url: String, client: reqwest::Client },
    Static,
}

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

pub struct JwksCache {
    source: KeySource,
    ttl: Duration,
    min_refresh_interval: Duration,
    cached: RwLock<Option<CachedKeys>>,
    /// Serializes fetches; holds the time of the last forced refetch
    refresh_lock: Mutex<Option<Instant>>,
}

impl JwksCache {
    /// Cache backed by the key set at `url`
    pub fn remote(url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source: KeySource::Remote {
                url: url.into(),
                client: reqwest::Client::new(),
            },
            ttl,
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Cache for the key set of an auth server at `auth_url`
    pub fn for_auth_server(auth_url: &str, ttl: Duration) -> Self {
        Self::remote(format!("{}{}", auth_url.trim_end_matches('/'), JWKS_PATH), ttl)
    }

    /// Fixed key set, never refetched
    pub fn from_static(keys: JwkSet) -> Self {
        Self {
            source: KeySource::Static,
            ttl: Duration::MAX,
            min_refresh_interval: Duration::MAX,
            cached: RwLock::new(Some(CachedKeys {
                keys: Arc::new(keys),
                fetched_at: Instant::now(),
            })),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Overrides how often an unknown key id may force a refetch
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Key set URL, `None` for a static set
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            KeySource::Remote { url, .. } => Some(url),
            KeySource::Static => None,
        }
    }

    /// Finds the key for a token
    ///
    /// With a `kid`, the key with that id; without one, the first key in the
    /// set. An unknown `kid` triggers a refetch, at most once per
    /// `min_refresh_interval`; inside that window it is rejected outright.
    pub async fn key_for(&self, kid: Option<&str>) -> Result<Jwk, JwksError> {
        let keys = self.current().await?;
        if let Some(jwk) = select(&keys, kid) {
            return Ok(jwk.clone());
        }

        let Some(kid) = kid else {
            return Err(JwksError::Empty);
        };

        if matches!(self.source, KeySource::Static) {
            return Err(JwksError::UnknownKey(kid.to_string()));
        }

        let mut last_forced = self.refresh_lock.lock().await;

        // another caller may have refetched while we waited
        if let Some(keys) = self.cached_keys().await {
            if let Some(jwk) = select(&keys, Some(kid)) {
                return Ok(jwk.clone());
            }
        }

        if last_forced.is_some_and(|at| at.elapsed() < self.min_refresh_interval) {
            debug!(kid, "Key id not in cached set, refetch throttled");
            return Err(JwksError::UnknownKey(kid.to_string()));
        }
        *last_forced = Some(Instant::now());

        debug!(kid, "Key id not in cached set, refetching");
        let keys = self.fetch().await?;
        select(&keys, Some(kid))
            .cloned()
            .ok_or_else(|| JwksError::UnknownKey(kid.to_string()))
    }

    async fn cached_keys(&self) -> Option<Arc<JwkSet>> {
        self.cached.read().await.as_ref().map(|c| c.keys.clone())
    }

    /// Cached set if still fresh, otherwise a refetched one
    ///
    /// When refetching fails and a stale set exists, the stale set is used.
    /// Concurrent callers share one fetch.
    async fn current(&self) -> Result<Arc<JwkSet>, JwksError> {
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }
        let stale = self.cached_keys().await;

        match self.fetch().await {
            Ok(keys) => Ok(keys),
            Err(e) => match stale {
                Some(keys) => {
                    warn!(error = %e, "Key set refresh failed, using stale keys");
                    Ok(keys)
                }
                None => Err(e),
            },
        }
    }

    async fn fresh(&self) -> Option<Arc<JwkSet>> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.keys.clone())
    }

    /// Fetches the remote set and stores it; callers hold `refresh_lock`
    async fn fetch(&self) -> Result<Arc<JwkSet>, JwksError> {
        let (url, client) = match &self.source {
            KeySource::Remote { url, client } => (url, client),
            KeySource::Static => return self.cached_keys().await.ok_or(JwksError::Empty),
        };

        let keys: JwkSet = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if keys.keys.is_empty() {
            return Err(JwksError::Empty);
        }

        info!(url = %url, keys = keys.keys.len(), "Fetched signing keys");

        let keys = Arc::new(keys);
        *self.cached.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }
}

fn select<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None => keys.keys.first(),
    }
}
