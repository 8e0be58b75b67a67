//! Configuration management
//!
//! Values come from the environment (after loading a `.env` file when one
//! exists) and fall back to the `DEFAULT_*` constants below.

use lotus_common::{ErrorKind, LotusError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::reconcile::client::{RemoteApiClient, Transport};
use crate::reconcile::rate_limit::{FeedbackHeaders, RateLimiter};
use crate::reconcile::resolver::{
    ResolverConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_BYTES, DEFAULT_RESOLVER_CONCURRENCY,
};
use crate::reconcile::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::remote::crossref::DEFAULT_CROSSREF_URL;
use crate::remote::sparql::DEFAULT_ENTITY_PREFIX;

// ============================================================================
// Defaults
// ============================================================================

/// Default Wikibase action API endpoint.
pub const DEFAULT_WIKIBASE_API_URL: &str = "https://www.wikidata.org/w/api.php";

/// Default SPARQL endpoint.
pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("lotus-import/", env!("CARGO_PKG_VERSION"));

/// Largest accepted chunk size.
pub const MAX_CHUNK_SIZE: usize = 5_000;

/// Default delay between SPARQL queries in milliseconds.
pub const DEFAULT_SPARQL_DELAY_MS: u64 = 100;

/// Default delay between Wikibase edits in milliseconds.
pub const DEFAULT_WIKIBASE_DELAY_MS: u64 = 500;

/// Default delay between CrossRef lookups in milliseconds.
pub const DEFAULT_CROSSREF_DELAY_MS: u64 = 100;

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    pub wikibase: WikibaseConfig,
    pub resolver: ResolverConfig,
    pub sparql_api: ApiConfig,
    pub wikibase_api: ApiConfig,
    pub crossref_api: ApiConfig,
    pub crossref_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikibaseConfig {
    pub api_url: String,
    pub sparql_url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub entity_prefix: String,
}

/// Pacing and retry settings for one remote API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub feedback: Option<FeedbackHeaders>,
}

impl ApiConfig {
    pub fn new(default_delay_ms: u64) -> Self {
        Self {
            default_delay_ms,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            feedback: None,
        }
    }

    pub fn with_feedback(mut self, feedback: FeedbackHeaders) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Read `LOTUS_<PREFIX>_DELAY_MS`, `_TIMEOUT_SECS`, `_MAX_ATTEMPTS`,
    /// `_RETRY_DELAY_MS`, `_LIMIT_HEADER` and `_INTERVAL_HEADER`
    fn with_env(mut self, prefix: &str, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("LOTUS_{}_{}", prefix, suffix));
        let parsed = |suffix: &str| var(suffix).and_then(|s| s.trim().parse().ok());

        if let Some(delay) = parsed("DELAY_MS") {
            self.default_delay_ms = delay;
        }
        if let Some(timeout) = parsed("TIMEOUT_SECS") {
            self.timeout_secs = timeout;
        }
        if let Some(attempts) = var("MAX_ATTEMPTS").and_then(|s| s.trim().parse().ok()) {
            self.max_attempts = attempts;
        }
        if let Some(delay) = parsed("RETRY_DELAY_MS") {
            self.retry_delay_ms = delay;
        }
        if let (Some(limit), Some(interval)) = (var("LIMIT_HEADER"), var("INTERVAL_HEADER")) {
            self.feedback = Some(FeedbackHeaders::new(limit, interval));
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
            .recovering([ErrorKind::Network, ErrorKind::RateLimitExceeded])
    }

    /// A client for one API over `transport`
    pub fn client(&self, name: &str, transport: Arc<dyn Transport>) -> RemoteApiClient {
        let mut limiter = RateLimiter::new(name, Duration::from_millis(self.default_delay_ms));
        if let Some(feedback) = &self.feedback {
            limiter = limiter.with_feedback(feedback.clone());
        }
        RemoteApiClient::new(name, transport, limiter)
            .with_retry(self.retry_policy())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

impl ImportConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from a variable lookup, without validating it
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let number = |name: &str, default: usize| {
            lookup(name)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            wikibase: WikibaseConfig {
                api_url: string("LOTUS_WIKIBASE_API_URL", DEFAULT_WIKIBASE_API_URL),
                sparql_url: string("LOTUS_SPARQL_URL", DEFAULT_SPARQL_URL),
                username: lookup("LOTUS_WIKIBASE_USER").filter(|s| !s.is_empty()),
                password: lookup("LOTUS_WIKIBASE_PASSWORD").filter(|s| !s.is_empty()),
                entity_prefix: string("LOTUS_ENTITY_PREFIX", DEFAULT_ENTITY_PREFIX),
            },
            resolver: ResolverConfig {
                chunk_size: number("LOTUS_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
                max_chunk_bytes: number("LOTUS_MAX_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES),
                concurrency: number("LOTUS_RESOLVER_CONCURRENCY", DEFAULT_RESOLVER_CONCURRENCY),
            },
            sparql_api: ApiConfig::new(DEFAULT_SPARQL_DELAY_MS).with_env("SPARQL", &lookup),
            wikibase_api: ApiConfig::new(DEFAULT_WIKIBASE_DELAY_MS).with_env("WIKIBASE", &lookup),
            crossref_api: ApiConfig::new(DEFAULT_CROSSREF_DELAY_MS)
                .with_feedback(FeedbackHeaders::crossref())
                .with_env("CROSSREF", &lookup),
            crossref_url: string("LOTUS_CROSSREF_URL", DEFAULT_CROSSREF_URL),
            user_agent: string("LOTUS_USER_AGENT", DEFAULT_USER_AGENT),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("Wikibase API URL", &self.wikibase.api_url),
            ("SPARQL URL", &self.wikibase.sparql_url),
            ("CrossRef URL", &self.crossref_url),
        ] {
            if url.trim().is_empty() {
                return Err(LotusError::config(format!("{} cannot be empty", name)));
            }
        }

        if !(1..=MAX_CHUNK_SIZE).contains(&self.resolver.chunk_size) {
            return Err(LotusError::config(format!(
                "Chunk size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.resolver.chunk_size
            )));
        }
        if self.resolver.max_chunk_bytes == 0 {
            return Err(LotusError::config("Maximum chunk size in bytes must be greater than 0"));
        }
        if self.resolver.concurrency == 0 {
            return Err(LotusError::config("Resolver concurrency must be greater than 0"));
        }

        for (name, api) in [
            ("SPARQL", &self.sparql_api),
            ("Wikibase", &self.wikibase_api),
            ("CrossRef", &self.crossref_api),
        ] {
            if api.max_attempts == 0 {
                return Err(LotusError::config(format!("{} max attempts must be greater than 0", name)));
            }
            if api.timeout_secs == 0 {
                return Err(LotusError::config(format!("{} timeout must be greater than 0", name)));
            }
        }

        if self.user_agent.trim().is_empty() {
            return Err(LotusError::config("User agent cannot be empty"));
        }

        Ok(())
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ImportConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ImportConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ImportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolver.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.wikibase.sparql_url, DEFAULT_SPARQL_URL);
        assert_eq!(config.crossref_api.feedback, Some(FeedbackHeaders::crossref()));
        assert_eq!(config.sparql_api.feedback, None);
        assert_eq!(config.wikibase.username, None);
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(&[
            ("LOTUS_CHUNK_SIZE", "50"),
            ("LOTUS_RESOLVER_CONCURRENCY", "4"),
            ("LOTUS_CROSSREF_DELAY_MS", "250"),
            ("LOTUS_SPARQL_MAX_ATTEMPTS", "5"),
            ("LOTUS_SPARQL_LIMIT_HEADER", "X-Calls"),
            ("LOTUS_SPARQL_INTERVAL_HEADER", "X-Window"),
            ("LOTUS_WIKIBASE_USER", "LotusBot"),
        ]);

        assert_eq!(config.resolver.chunk_size, 50);
        assert_eq!(config.resolver.concurrency, 4);
        assert_eq!(config.crossref_api.default_delay_ms, 250);
        assert_eq!(config.sparql_api.max_attempts, 5);
        assert_eq!(config.sparql_api.feedback, Some(FeedbackHeaders::new("x-calls", "x-window")));
        assert_eq!(config.wikibase.username.as_deref(), Some("LotusBot"));
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = config_from(&[("LOTUS_CHUNK_SIZE", "lots")]);
        assert_eq!(config.resolver.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            ("LOTUS_CHUNK_SIZE", "0"),
            ("LOTUS_CHUNK_SIZE", "5001"),
            ("LOTUS_RESOLVER_CONCURRENCY", "0"),
            ("LOTUS_WIKIBASE_MAX_ATTEMPTS", "0"),
            ("LOTUS_SPARQL_URL", ""),
        ];
        for (name, value) in bad {
            let err = config_from(&[(name, value)]).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{}={}", name, value);
        }
    }

    #[tokio::test]
    async fn test_client_uses_configured_pacing() {
        use crate::reconcile::client::HttpTransport;

        let api = ApiConfig::new(40);
        let transport = Arc::new(HttpTransport::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap());
        let client = api.client("sparql", transport);
        assert_eq!(client.limiter().current_delay().await, Duration::from_millis(40));
        assert_eq!(client.name(), "sparql");
    }
}
