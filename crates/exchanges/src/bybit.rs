//! Bybit spot connector (v5 API).

use async_trait::async_trait;
use marketd_core::*;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::rest::{status_error, RestTransport};

pub const BYBIT: &str = "bybit";

const RATE_LIMIT: Duration = Duration::from_millis(20);

/// Upper bound on cursor pages followed for one load.
const MAX_PAGES: usize = 20;

/// Bybit REST client.
pub struct BybitClient {
    transport: RestTransport,
}

impl BybitClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            transport: RestTransport::new(BYBIT, RATE_LIMIT, options),
        }
    }

    fn base_url(sandbox: bool) -> &'static str {
        if sandbox {
            "https://api-testnet.bybit.com"
        } else {
            "https://api.bybit.com"
        }
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn id(&self) -> &str {
        BYBIT
    }

    fn options(&self) -> ClientOptions {
        self.transport.options()
    }

    fn supports_market_loading(&self) -> bool {
        true
    }

    fn apply_overrides(&self, overrides: ClientOverrides) {
        self.transport.apply_overrides(overrides);
    }

    fn last_response(&self) -> Option<String> {
        self.transport.last_response()
    }

    async fn load_markets(&self) -> Result<RawMarkets, ExchangeError> {
        let options = self.transport.options();
        let headers: Vec<(&'static str, String)> = options
            .credentials
            .iter()
            .map(|c| ("X-BAPI-API-KEY", c.api_key.clone()))
            .collect();

        let base_url = Self::base_url(options.sandbox);
        let headers = &headers;

        collect_pages(|cursor| async move {
            let mut url = format!("{base_url}/v5/market/instruments-info?category=spot");
            if let Some(cursor) = &cursor {
                url.push_str("&cursor=");
                url.push_str(cursor);
            }

            let reply = self.transport.get_json(&url, headers).await?;
            if !reply.is_success() {
                return Err(status_error(BYBIT, reply.status, &reply.body.to_string()));
            }
            Ok(reply.body)
        })
        .await
    }
}

/// Follow `nextPageCursor` until the last page.
///
/// A listing that is still paginating after [`MAX_PAGES`] pages is an error,
/// never a truncated result.
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<RawMarkets, ExchangeError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Value, ExchangeError>>,
{
    let mut markets = RawMarkets::new();
    let mut cursor: Option<String> = None;

    for page in 0..MAX_PAGES {
        let body = fetch(cursor.take()).await?;
        cursor = parse_instruments_page(&body, &mut markets)?;
        debug!(exchange = BYBIT, page, markets = markets.len(), "Loaded instruments page");
        if cursor.is_none() {
            return Ok(markets);
        }
    }

    Err(ExchangeError::BadResponse(format!(
        "{BYBIT} instruments-info still paginating after {MAX_PAGES} pages"
    )))
}

/// Map a Bybit `retCode`/`retMsg` pair.
fn api_error(code: i64, body: &Value) -> ExchangeError {
    let detail = format!("{BYBIT} {body}");
    match code {
        10003 | 10004 | 33004 => ExchangeError::Authentication(detail),
        10005 | 10009 | 10010 => ExchangeError::PermissionDenied(detail),
        10006 | 10018 => ExchangeError::RateLimited(detail),
        10000 | 10016 => ExchangeError::ExchangeNotAvailable(detail),
        _ => ExchangeError::Exchange(detail),
    }
}

/// Append one `instruments-info` page to `markets`; returns the next cursor.
pub fn parse_instruments_page(
    body: &Value,
    markets: &mut RawMarkets,
) -> Result<Option<String>, ExchangeError> {
    let code = body.get("retCode").and_then(Value::as_i64).ok_or_else(|| {
        ExchangeError::BadResponse(format!("{BYBIT} instruments-info response has no retCode"))
    })?;
    if code != 0 {
        return Err(api_error(code, body));
    }

    let result = body.get("result");
    let list = result
        .and_then(|r| r.get("list"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ExchangeError::BadResponse(format!("{BYBIT} instruments-info response has no list"))
        })?;

    for entry in list {
        let Some(id) = entry.get("symbol").and_then(Value::as_str) else {
            warn!(exchange = BYBIT, "Skipping instrument without a symbol");
            continue;
        };
        let base = entry.get("baseCoin").and_then(Value::as_str);
        let quote = entry.get("quoteCoin").and_then(Value::as_str);
        let symbol = match (base, quote) {
            (Some(base), Some(quote)) => format!("{base}/{quote}"),
            _ => id.to_string(),
        };

        let lot = entry.get("lotSizeFilter");
        let field = |name: &str| {
            lot.and_then(|l| l.get(name))
                .cloned()
                .unwrap_or(Value::Null)
        };

        let mut unified = Map::new();
        unified.insert("id".into(), json!(id));
        unified.insert("symbol".into(), json!(symbol));
        if let Some(base) = base {
            unified.insert("base".into(), json!(base));
        }
        if let Some(quote) = quote {
            unified.insert("quote".into(), json!(quote));
        }
        unified.insert(
            "active".into(),
            json!(entry.get("status").and_then(Value::as_str) == Some("Trading")),
        );
        unified.insert("type".into(), json!("spot"));
        unified.insert(
            "limits".into(),
            json!({
                "amount": { "min": field("minOrderQty"), "max": field("maxOrderQty") },
                "price": { "min": Value::Null, "max": Value::Null },
                "cost": { "min": field("minOrderAmt"), "max": field("maxOrderAmt") },
            }),
        );

        markets.insert(symbol, Value::Object(unified));
    }

    let cursor = result
        .and_then(|r| r.get("nextPageCursor"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(cursor)
}
