use marketd_core::{ConfigError, ExchangeError};
use tonic::Status;

/// Request-level failures of a market load.
///
/// Each variant maps to exactly one gRPC status code. Per-entry transform
/// failures are not represented here; they never fail a request.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Bad input; not retryable.
    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),
    /// The exchange has no market-loading capability; not retryable.
    #[error("Exchange {0} does not support market loading")]
    UnsupportedOperation(String),
    /// Transient connectivity failure; callers may retry with backoff.
    #[error("{0}")]
    Network(ExchangeError),
    /// Reported by the exchange (credentials, maintenance, ...).
    #[error("{0}")]
    ExchangeReported(ExchangeError),
    /// Anything unexpected. The detail is logged, never sent to the caller.
    #[error("{0}")]
    Internal(String),
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnsupportedExchange(id) => LoadError::UnsupportedExchange(id),
            other => LoadError::Internal(other.to_string()),
        }
    }
}

impl From<ExchangeError> for LoadError {
    fn from(err: ExchangeError) -> Self {
        if err.is_network() {
            LoadError::Network(err)
        } else {
            LoadError::ExchangeReported(err)
        }
    }
}

impl From<LoadError> for Status {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::UnsupportedExchange(_) => Status::invalid_argument(err.to_string()),
            LoadError::UnsupportedOperation(_) => Status::unimplemented(err.to_string()),
            LoadError::Network(e) => Status::unavailable(e.to_string()),
            LoadError::ExchangeReported(e) => Status::failed_precondition(e.to_string()),
            LoadError::Internal(_) => Status::internal("internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_mapping() {
        let status = Status::from(LoadError::UnsupportedExchange("nope".into()));
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "Unsupported exchange: nope");

        let status = Status::from(LoadError::UnsupportedOperation("kraken".into()));
        assert_eq!(status.code(), Code::Unimplemented);
        assert_eq!(status.message(), "Exchange kraken does not support market loading");

        let status = Status::from(LoadError::Network(ExchangeError::RequestTimeout(
            "binance GET https://api.binance.com/api/v3/exchangeInfo request timed out".into(),
        )));
        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.message().contains("request timed out"));

        let status = Status::from(LoadError::ExchangeReported(ExchangeError::Authentication(
            "binance {\"code\":-2015}".into(),
        )));
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(status.message(), "binance {\"code\":-2015}");
    }

    #[test]
    fn test_internal_detail_is_not_leaked() {
        let status = Status::from(LoadError::Internal("index out of bounds at foo.rs:12".into()));
        assert_eq!(status.code(), Code::Internal);
        assert!(!status.message().contains("foo.rs"));
    }

    #[test]
    fn test_exchange_error_classification() {
        assert!(matches!(
            LoadError::from(ExchangeError::RateLimited("429".into())),
            LoadError::Network(_)
        ));
        assert!(matches!(
            LoadError::from(ExchangeError::Maintenance("down".into())),
            LoadError::ExchangeReported(_)
        ));
        assert!(matches!(
            LoadError::from(ConfigError::UnsupportedExchange("x".into())),
            LoadError::UnsupportedExchange(_)
        ));
    }
}
