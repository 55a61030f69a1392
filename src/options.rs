//! Client configuration: base URL, transport handle and transport options.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientError;
use crate::http::{build_http_client, Transport};

/// Environment variable holding the API base URL, e.g. `https://api.dify.ai/v1`.
pub const ENV_BASE_URL: &str = "DIFY_API_BASE_URL";
/// Environment variable holding the app API key.
pub const ENV_API_KEY: &str = "DIFY_API_KEY";
/// Optional environment variable holding a request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "DIFY_TIMEOUT_SECS";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Options used to build the default `reqwest` transport.
///
/// Nothing here is set by default: the client enforces no timeout unless
/// one is configured explicitly.
///
/// # Example
/// ```rust
/// use dify::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::default()
///     .with_timeout(Duration::from_secs(30))
///     .with_proxy("http://proxy.example.com:8080".to_string());
/// assert_eq!(options.timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Request timeout
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,
}

impl TransportOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// Configuration owned by a [`Client`](crate::client::Client).
///
/// Built once with the `with_*` methods and then handed to
/// [`Client::with_config`](crate::client::Client::with_config); the client
/// never mutates it afterwards.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every API path is appended to
    pub base_url: String,

    /// Executes outbound requests
    pub transport: Arc<dyn Transport>,

    /// Headers added to every request, after the defaults and before the
    /// per-request headers
    pub extra_headers: HashMap<String, String>,
}

impl ClientConfig {
    /// Default configuration: a plain `reqwest::Client` with no timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: Arc::new(reqwest::Client::new()),
            extra_headers: HashMap::new(),
        }
    }

    /// Replace the transport, e.g. with a preconfigured `reqwest::Client`
    /// or a test double.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Build a `reqwest::Client` from transport options and use it.
    pub fn with_transport_options(self, options: &TransportOptions) -> Result<Self, ClientError> {
        let http_client = build_http_client(options)?;
        Ok(self.with_transport(http_client))
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers.insert(key, value);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("extra_headers", &self.extra_headers)
            .finish_non_exhaustive()
    }
}

/// Settings read from the process environment.
///
/// Loading is an explicit step the caller performs before constructing a
/// client; the library never reads the environment on its own.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub transport: TransportOptions,
}

impl EnvConfig {
    /// Read [`ENV_BASE_URL`], [`ENV_API_KEY`] and optionally [`ENV_TIMEOUT_SECS`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EnvConfig::from_env`] with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::Config(format!("{key} is not set")))
        };

        let base_url = required(ENV_BASE_URL)?;
        let api_key = SecretString::new(required(ENV_API_KEY)?);

        let mut transport = TransportOptions::default();
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}"))
            })?;
            transport = transport.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            base_url,
            api_key,
            transport,
        })
    }

    /// Client configuration for the loaded base URL and transport options.
    pub fn client_config(&self) -> Result<ClientConfig, ClientError> {
        ClientConfig::new(self.base_url.clone()).with_transport_options(&self.transport)
    }
}
