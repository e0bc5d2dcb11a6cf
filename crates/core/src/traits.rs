use crate::models::RawMarkets;
use crate::options::{ClientOptions, ClientOverrides};
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported while talking to an exchange.
///
/// Display output is the upstream error text, unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    // Transient: the exchange could not be reached or answered in time.
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    RequestTimeout(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    ExchangeNotAvailable(String),

    // Reported by the exchange itself.
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Maintenance(String),
    #[error("{0}")]
    BadResponse(String),
    #[error("{0}")]
    Exchange(String),
}

impl ExchangeError {
    /// Whether the failure is a connectivity problem a caller may retry.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_)
                | ExchangeError::RequestTimeout(_)
                | ExchangeError::RateLimited(_)
                | ExchangeError::ExchangeNotAvailable(_)
        )
    }
}

/// Errors resolving or configuring exchange clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),
    #[error("Section {0} not found in config file")]
    MissingSection(String),
}

/// A single market entry that could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("market entry is a {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("{0}")]
    Invalid(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Exchange Client Trait
// ---------------------------------------------------------------------------

/// A configured session with one exchange.
///
/// Instances are shared behind an `Arc` for the life of the process, so any
/// mutable state lives behind interior locks.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Exchange identifier (e.g. "binance").
    fn id(&self) -> &str;

    /// Snapshot of the options currently in effect.
    fn options(&self) -> ClientOptions;

    /// Whether `load_markets` is available for this exchange.
    fn supports_market_loading(&self) -> bool;

    /// Merge per-exchange settings (credentials, sandbox) into this client.
    fn apply_overrides(&self, overrides: ClientOverrides);

    /// Raw body of the last upstream response, if the client keeps it.
    fn last_response(&self) -> Option<String> {
        None
    }

    /// Fetch every market the exchange lists, keyed by unified symbol.
    async fn load_markets(&self) -> Result<RawMarkets, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(ExchangeError::Network("reset".into()).is_network());
        assert!(ExchangeError::RequestTimeout("slow".into()).is_network());
        assert!(ExchangeError::RateLimited("429".into()).is_network());
        assert!(ExchangeError::ExchangeNotAvailable("502".into()).is_network());

        assert!(!ExchangeError::Authentication("bad key".into()).is_network());
        assert!(!ExchangeError::Maintenance("down".into()).is_network());
        assert!(!ExchangeError::BadResponse("html".into()).is_network());
        assert!(!ExchangeError::Exchange("rejected".into()).is_network());
    }

    #[test]
    fn test_display_is_upstream_text() {
        let err = ExchangeError::Network("binance GET https://api.binance.com failed".into());
        assert_eq!(err.to_string(), "binance GET https://api.binance.com failed");
    }
}
