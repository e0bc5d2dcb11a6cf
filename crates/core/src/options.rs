use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default upstream request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// API credentials for an exchange account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Options an exchange client is constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Space out upstream requests according to the exchange's rate limit.
    pub enable_rate_limit: bool,
    /// Upper bound for a single upstream request.
    pub timeout: Duration,
    /// Log every upstream request and response body at debug level.
    pub verbose: bool,
    /// Retain the last raw response body. Off by default to keep memory flat.
    pub keep_last_response: bool,
    /// Talk to the exchange's testnet instead of production.
    pub sandbox: bool,
    pub credentials: Option<Credentials>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            enable_rate_limit: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            verbose: false,
            keep_last_response: false,
            sandbox: false,
            credentials: None,
        }
    }
}

impl ClientOptions {
    /// Merge caller-supplied overrides into these options.
    pub fn merge(&mut self, overrides: ClientOverrides) {
        if let Some(credentials) = overrides.credentials {
            self.credentials = Some(credentials);
        }
        if let Some(sandbox) = overrides.sandbox {
            self.sandbox = sandbox;
        }
    }
}

/// Per-exchange settings a caller layers on top of a cached client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOverrides {
    pub credentials: Option<Credentials>,
    pub sandbox: Option<bool>,
}
