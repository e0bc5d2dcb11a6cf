//! Shared HTTP plumbing for the REST connectors.

use marketd_core::{ClientOptions, ClientOverrides, ExchangeError};
use parking_lot::{Mutex, RwLock};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Longest slice of a non-JSON error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// A decoded upstream response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP session for one exchange client.
///
/// Holds the client options, enforces the minimum spacing between requests
/// when rate limiting is enabled, and turns transport failures into
/// [`ExchangeError`]s.
pub struct RestTransport {
    exchange: &'static str,
    http: HttpClient,
    /// Minimum time between two requests.
    rate_limit: Duration,
    options: RwLock<ClientOptions>,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    last_response: Mutex<Option<String>>,
}

impl RestTransport {
    pub fn new(exchange: &'static str, rate_limit: Duration, options: ClientOptions) -> Self {
        let http = HttpClient::builder()
            .timeout(options.timeout)
            .user_agent(concat!("marketd/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!(exchange, error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            exchange,
            http,
            rate_limit,
            options: RwLock::new(options),
            last_request: tokio::sync::Mutex::new(None),
            last_response: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> &'static str {
        self.exchange
    }

    pub fn options(&self) -> ClientOptions {
        self.options.read().clone()
    }

    pub fn apply_overrides(&self, overrides: ClientOverrides) {
        self.options.write().merge(overrides);
    }

    pub fn last_response(&self) -> Option<String> {
        self.last_response.lock().clone()
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// Non-success statuses with a JSON body are returned as-is so the
    /// connector can read exchange-specific error codes; non-JSON bodies are
    /// classified here.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<HttpReply, ExchangeError> {
        let options = self.options();
        self.throttle(options.enable_rate_limit).await;

        if options.verbose {
            debug!(exchange = self.exchange, %url, "GET");
        }

        let mut request = self.http.get(url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(url, &err))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error(url, &err))?;

        if options.verbose {
            debug!(exchange = self.exchange, status, body = %text, "Response");
        }
        if options.keep_last_response {
            *self.last_response.lock() = Some(text.clone());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(HttpReply { status, body }),
            Err(_) if (200..300).contains(&status) => Err(ExchangeError::BadResponse(format!(
                "{} GET {} returned a body that is not JSON",
                self.exchange, url
            ))),
            Err(_) => Err(status_error(self.exchange, status, &text)),
        }
    }

    async fn throttle(&self, enabled: bool) {
        if !enabled || self.rate_limit.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.rate_limit {
                sleep(self.rate_limit - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn transport_error(&self, url: &str, err: &reqwest::Error) -> ExchangeError {
        if err.is_timeout() {
            ExchangeError::RequestTimeout(format!(
                "{} GET {} request timed out ({} ms)",
                self.exchange,
                url,
                self.options.read().timeout.as_millis()
            ))
        } else {
            ExchangeError::Network(format!("{} GET {} {}", self.exchange, url, err))
        }
    }
}

/// Classify a non-success HTTP status.
pub fn status_error(exchange: &str, status: u16, body: &str) -> ExchangeError {
    let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let detail = format!("{exchange} {status} {body}");
    match status {
        401 => ExchangeError::Authentication(detail),
        403 => ExchangeError::PermissionDenied(detail),
        408 => ExchangeError::RequestTimeout(detail),
        418 | 429 => ExchangeError::RateLimited(detail),
        503 if body.to_ascii_lowercase().contains("maintenance") => {
            ExchangeError::Maintenance(detail)
        }
        500..=599 => ExchangeError::ExchangeNotAvailable(detail),
        _ => ExchangeError::Exchange(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error("binance", 401, ""),
            ExchangeError::Authentication(_)
        ));
        assert!(matches!(
            status_error("binance", 403, "<html>blocked</html>"),
            ExchangeError::PermissionDenied(_)
        ));
        assert!(matches!(
            status_error("binance", 429, ""),
            ExchangeError::RateLimited(_)
        ));
        assert!(matches!(
            status_error("binance", 418, ""),
            ExchangeError::RateLimited(_)
        ));
        assert!(matches!(
            status_error("bybit", 503, "System under Maintenance"),
            ExchangeError::Maintenance(_)
        ));
        assert!(matches!(
            status_error("bybit", 502, "Bad Gateway"),
            ExchangeError::ExchangeNotAvailable(_)
        ));
        assert!(matches!(
            status_error("bybit", 400, "nope"),
            ExchangeError::Exchange(_)
        ));
    }

    #[test]
    fn test_status_error_truncates_body() {
        let body = "x".repeat(10_000);
        let err = status_error("binance", 500, &body);
        assert!(err.to_string().len() < 300);
        assert!(err.to_string().starts_with("binance 500 "));
    }

    #[tokio::test]
    async fn test_throttle_spaces_requests() {
        let transport = RestTransport::new(
            "binance",
            Duration::from_millis(50),
            ClientOptions::default(),
        );
        let start = Instant::now();
        transport.throttle(true).await;
        transport.throttle(true).await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_throttle_disabled() {
        let transport =
            RestTransport::new("binance", Duration::from_secs(5), ClientOptions::default());
        let start = Instant::now();
        transport.throttle(false).await;
        transport.throttle(false).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_overrides_are_merged() {
        let transport = RestTransport::new("bybit", Duration::ZERO, ClientOptions::default());
        transport.apply_overrides(marketd_core::ClientOverrides {
            credentials: None,
            sandbox: Some(true),
        });
        assert!(transport.options().sandbox);
        assert!(transport.last_response().is_none());
    }
}
