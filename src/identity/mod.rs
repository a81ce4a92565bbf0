//! Outbound credentials — bearer tokens for the gateway and peer agents.
//!
//! A [`TokenProvider`] fronts one [`TokenExchange`] backend and caches the
//! tokens it mints per `(provider, scopes)`. Each initialized session owns its
//! own provider, so cached tokens live exactly as long as the session.
//!
//! Token values are never logged; `Debug` impls redact them.

pub mod client_credentials;
pub mod workload;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AppError;

// ── Exchange seam ─────────────────────────────────────────────────────────────

/// OAuth2 flow requested from the credential provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OAuthFlow {
    #[serde(rename = "M2M")]
    M2m,
    #[serde(rename = "USER_FEDERATION")]
    UserFederation,
}

/// One exchange request. `workload_token` is the caller's identity credential.
#[derive(Clone)]
pub struct TokenRequest {
    pub provider_name: String,
    pub scopes: Vec<String>,
    pub flow: OAuthFlow,
    pub force: bool,
    pub workload_token: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("provider_name", &self.provider_name)
            .field("scopes", &self.scopes)
            .field("flow", &self.flow)
            .field("force", &self.force)
            .field("workload_token", &self.workload_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A boxed, owned future returned by [`TokenExchange::exchange`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

/// Backend that turns a [`TokenRequest`] into a bearer token.
///
/// Implementations return [`AppError::Auth`] for anything the provider
/// rejects and never fall back to an unauthenticated result.
pub trait TokenExchange: Send + Sync {
    fn exchange<'a>(&'a self, request: &'a TokenRequest) -> ExchangeFuture<'a>;
}

// ── TokenProvider ─────────────────────────────────────────────────────────────

/// (provider, sorted scopes, flow)
type CacheKey = (String, Vec<String>, OAuthFlow);

/// Fetch-or-reuse front end over a [`TokenExchange`].
pub struct TokenProvider {
    exchange: Arc<dyn TokenExchange>,
    workload_token: RwLock<Option<String>>,
    cache: Mutex<HashMap<CacheKey, String>>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.cache.lock().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("TokenProvider").field("cached_tokens", &cached).finish()
    }
}

impl TokenProvider {
    pub fn new(exchange: Arc<dyn TokenExchange>, workload_token: Option<String>) -> Self {
        Self {
            exchange,
            workload_token: RwLock::new(workload_token),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the identity credential used for later exchanges.
    pub fn refresh_workload_token(&self, token: String) {
        if let Ok(mut slot) = self.workload_token.write() {
            *slot = Some(token);
        }
    }

    /// Return a bearer token for `provider_name`, exchanging only on a cache
    /// miss or when `force` is set.
    pub async fn get_token(
        &self,
        provider_name: &str,
        scopes: &[String],
        flow: OAuthFlow,
        force: bool,
    ) -> Result<String, AppError> {
        if provider_name.trim().is_empty() {
            return Err(AppError::Config("credential provider name is empty".into()));
        }

        let mut sorted = scopes.to_vec();
        sorted.sort();
        let key = (provider_name.to_string(), sorted, flow);

        if !force {
            let cache = self
                .cache
                .lock()
                .map_err(|_| AppError::Internal("token cache lock poisoned".into()))?;
            if let Some(token) = cache.get(&key) {
                debug!(provider = provider_name, "token cache hit");
                return Ok(token.clone());
            }
        }

        let workload_token = self.workload_token.read().ok().and_then(|t| t.clone());
        let request = TokenRequest {
            provider_name: provider_name.to_string(),
            scopes: scopes.to_vec(),
            flow,
            force,
            workload_token,
        };

        let token = self.exchange.exchange(&request).await.map_err(|e| {
            warn!(provider = provider_name, class = e.class(), "token exchange failed");
            match e {
                AppError::Config(m) => AppError::Config(m),
                AppError::Auth(m) => AppError::Auth(m),
                other => AppError::Auth(other.to_string()),
            }
        })?;

        self.cache
            .lock()
            .map_err(|_| AppError::Internal("token cache lock poisoned".into()))?
            .insert(key, token.clone());
        info!(provider = provider_name, forced = force, "bearer token obtained");
        Ok(token)
    }
}

// ── Transport check ───────────────────────────────────────────────────────────

/// Credential endpoints must be HTTPS; plain HTTP is accepted for loopback only.
pub fn ensure_verified_transport(url: &str) -> Result<reqwest::Url, AppError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| AppError::Config(format!("invalid endpoint URL '{url}': {e}")))?;
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback(&parsed) => Ok(parsed),
        scheme => Err(AppError::Config(format!(
            "refusing {scheme} endpoint '{url}': credentials require TLS"
        ))),
    }
}

fn is_loopback(url: &reqwest::Url) -> bool {
    let Some(host) = url.host_str() else { return false };
    if host == "localhost" {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
