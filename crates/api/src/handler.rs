//! The `LoadMarkets` request pipeline.
//!
//! resolve client -> check capability -> load -> transform each entry -> respond.
//! Request-level failures end the pipeline with a [`LoadError`]. A market
//! entry that fails to transform is logged, counted, and skipped.

use futures_util::FutureExt;
use marketd_core::{MarketRecord, RawMarkets};
use marketd_exchanges::ExchangeClientRegistry;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::LoadError;
use crate::proto::{MarketInfo, MarketResponse};

/// Per-request transform counts, reported once in the completion log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessedCounters {
    pub processed: usize,
    pub errors: usize,
}

/// A successful load: the wire response plus its transform counts.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub response: MarketResponse,
    pub counters: ProcessedCounters,
}

/// Serves market-load requests against a shared client registry.
pub struct MarketLoadHandler {
    registry: Arc<ExchangeClientRegistry>,
}

impl MarketLoadHandler {
    pub fn new(registry: Arc<ExchangeClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExchangeClientRegistry> {
        &self.registry
    }

    /// Load and normalize the markets of `exchange_id`.
    ///
    /// A panic anywhere in the pipeline becomes [`LoadError::Internal`] with
    /// no partial response.
    pub async fn load_markets(&self, exchange_id: &str) -> Result<LoadOutcome, LoadError> {
        match AssertUnwindSafe(self.run(exchange_id)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_detail(panic.as_ref());
                error!(exchange = %exchange_id, error = %detail, "Unexpected error");
                Err(LoadError::Internal(detail))
            }
        }
    }

    async fn run(&self, exchange_id: &str) -> Result<LoadOutcome, LoadError> {
        info!(exchange = %exchange_id, "Received request");

        let client = self.registry.get(exchange_id).map_err(|err| {
            error!(exchange = %exchange_id, error = %err, "Invalid exchange");
            LoadError::from(err)
        })?;

        if !client.supports_market_loading() {
            let err = LoadError::UnsupportedOperation(exchange_id.to_string());
            error!(exchange = %exchange_id, "{}", err);
            return Err(err);
        }

        let markets = client.load_markets().await.map_err(|err| {
            let err = LoadError::from(err);
            match &err {
                LoadError::Network(e) => {
                    error!(exchange = %exchange_id, error = %e, "Network error while loading markets")
                }
                _ => {
                    error!(exchange = %exchange_id, error = %err, "Exchange error while loading markets")
                }
            }
            err
        })?;

        let (response, counters) = transform_markets(exchange_id, &markets);
        info!(
            exchange = %exchange_id,
            processed = counters.processed,
            errors = counters.errors,
            "Successfully processed {} markets ({} errors) for {}",
            counters.processed,
            counters.errors,
            exchange_id
        );

        Ok(LoadOutcome { response, counters })
    }
}

/// Convert every raw entry that normalizes cleanly; skip and count the rest.
pub fn transform_markets(
    exchange_id: &str,
    markets: &RawMarkets,
) -> (MarketResponse, ProcessedCounters) {
    let mut response = MarketResponse::default();
    let mut counters = ProcessedCounters::default();

    for (symbol, raw) in markets {
        match MarketRecord::from_raw(raw) {
            Ok(record) => {
                response
                    .markets
                    .insert(symbol.clone(), MarketInfo::from(&record));
                counters.processed += 1;
            }
            Err(err) => {
                counters.errors += 1;
                error!(exchange = %exchange_id, symbol = %symbol, error = %err, "Error processing market");
            }
        }
    }

    (response, counters)
}

impl From<&MarketRecord> for MarketInfo {
    fn from(record: &MarketRecord) -> Self {
        MarketInfo {
            id: record.id.clone(),
            symbol: record.symbol.clone(),
            base: record.base.clone(),
            quote: record.quote.clone(),
            active: record.active,
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
