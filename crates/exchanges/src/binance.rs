//! Binance connectors: spot (`binance`) and USD-M futures (`binanceusdm`).

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use marketd_core::*;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::rest::{status_error, RestTransport};

pub const BINANCE: &str = "binance";
pub const BINANCE_USDM: &str = "binanceusdm";

/// Binance asks for no more than 20 weighted requests per second.
const RATE_LIMIT: Duration = Duration::from_millis(50);

/// The two Binance venues with distinct REST hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceVenue {
    Spot,
    UsdM,
}

impl BinanceVenue {
    pub fn exchange_id(self) -> &'static str {
        match self {
            BinanceVenue::Spot => BINANCE,
            BinanceVenue::UsdM => BINANCE_USDM,
        }
    }

    fn base_url(self, sandbox: bool) -> &'static str {
        match (self, sandbox) {
            (BinanceVenue::Spot, false) => "https://api.binance.com",
            (BinanceVenue::Spot, true) => "https://testnet.binance.vision",
            (BinanceVenue::UsdM, false) => "https://fapi.binance.com",
            (BinanceVenue::UsdM, true) => "https://testnet.binancefuture.com",
        }
    }

    fn exchange_info_path(self) -> &'static str {
        match self {
            BinanceVenue::Spot => "/api/v3/exchangeInfo",
            BinanceVenue::UsdM => "/fapi/v1/exchangeInfo",
        }
    }
}

/// Binance REST client.
pub struct BinanceClient {
    venue: BinanceVenue,
    transport: RestTransport,
}

impl BinanceClient {
    pub fn new(venue: BinanceVenue, options: ClientOptions) -> Self {
        Self {
            venue,
            transport: RestTransport::new(venue.exchange_id(), RATE_LIMIT, options),
        }
    }

    pub fn spot(options: ClientOptions) -> Self {
        Self::new(BinanceVenue::Spot, options)
    }

    pub fn usdm(options: ClientOptions) -> Self {
        Self::new(BinanceVenue::UsdM, options)
    }

    pub fn venue(&self) -> BinanceVenue {
        self.venue
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &str {
        self.venue.exchange_id()
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
        let url = format!(
            "{}{}",
            self.venue.base_url(options.sandbox),
            self.venue.exchange_info_path()
        );
        let headers: Vec<(&'static str, String)> = options
            .credentials
            .iter()
            .map(|c| ("X-MBX-APIKEY", c.api_key.clone()))
            .collect();

        let reply = self.transport.get_json(&url, &headers).await?;
        if !reply.is_success() {
            return Err(api_error(self.venue.exchange_id(), reply.status, &reply.body));
        }

        let markets = parse_exchange_info(self.venue, &reply.body)?;
        debug!(exchange = self.id(), markets = markets.len(), "Loaded exchange info");
        Ok(markets)
    }
}

/// Map a Binance error payload (`{"code": -2015, "msg": "..."}`).
fn api_error(exchange: &str, status: u16, body: &Value) -> ExchangeError {
    let detail = format!("{exchange} {body}");
    match body.get("code").and_then(Value::as_i64) {
        Some(-2014 | -2015 | -1022 | -2008) => ExchangeError::Authentication(detail),
        Some(-1002) => ExchangeError::PermissionDenied(detail),
        Some(-1003 | -1015) => ExchangeError::RateLimited(detail),
        Some(-1001 | -1006 | -1007) => ExchangeError::ExchangeNotAvailable(detail),
        Some(-1016) => ExchangeError::Maintenance(detail),
        _ => status_error(exchange, status, &body.to_string()),
    }
}

/// Build unified market entries from an `exchangeInfo` payload.
///
/// Entries missing `baseAsset`/`quoteAsset` are passed through keyed by their
/// native id so they are counted as malformed downstream rather than lost.
pub fn parse_exchange_info(venue: BinanceVenue, body: &Value) -> Result<RawMarkets, ExchangeError> {
    let symbols = body
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ExchangeError::BadResponse(format!(
                "{} exchangeInfo response has no symbols array",
                venue.exchange_id()
            ))
        })?;

    let mut markets = RawMarkets::new();
    for entry in symbols {
        let Some(id) = entry.get("symbol").and_then(Value::as_str) else {
            warn!(exchange = venue.exchange_id(), "Skipping exchangeInfo entry without a symbol");
            continue;
        };

        let base = entry.get("baseAsset").and_then(Value::as_str);
        let quote = entry.get("quoteAsset").and_then(Value::as_str);
        let market_type = market_type(venue, entry);

        let symbol = match (base, quote) {
            (Some(base), Some(quote)) => unified_symbol(venue, entry, base, quote, market_type),
            _ => id.to_string(),
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
            json!(entry.get("status").and_then(Value::as_str) == Some("TRADING")),
        );
        unified.insert("type".into(), json!(market_type));
        unified.insert("limits".into(), limits(entry));

        markets.insert(symbol, Value::Object(unified));
    }

    Ok(markets)
}

fn market_type(venue: BinanceVenue, entry: &Value) -> &'static str {
    match venue {
        BinanceVenue::Spot => "spot",
        BinanceVenue::UsdM => match entry.get("contractType").and_then(Value::as_str) {
            Some("PERPETUAL") | None => "swap",
            Some(_) => "future",
        },
    }
}

fn unified_symbol(
    venue: BinanceVenue,
    entry: &Value,
    base: &str,
    quote: &str,
    market_type: &str,
) -> String {
    if venue == BinanceVenue::Spot {
        return format!("{base}/{quote}");
    }

    let settle = entry
        .get("marginAsset")
        .and_then(Value::as_str)
        .unwrap_or(quote);
    let mut symbol = format!("{base}/{quote}:{settle}");

    if market_type == "future" {
        let expiry = entry
            .get("deliveryDate")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        if let Some(expiry) = expiry {
            symbol.push('-');
            symbol.push_str(&expiry.format("%y%m%d").to_string());
        }
    }
    symbol
}

/// Read amount/price/cost ranges out of the symbol filters.
fn limits(entry: &Value) -> Value {
    let mut amount = json!({});
    let mut price = json!({});
    let mut cost = json!({});

    let filters = entry
        .get("filters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for filter in filters {
        let field = |name: &str| filter.get(name).cloned().unwrap_or(Value::Null);
        match filter.get("filterType").and_then(Value::as_str) {
            Some("LOT_SIZE") => amount = json!({ "min": field("minQty"), "max": field("maxQty") }),
            Some("PRICE_FILTER") => {
                price = json!({ "min": field("minPrice"), "max": field("maxPrice") })
            }
            // Spot reports minNotional/maxNotional, USD-M reports notional.
            Some("NOTIONAL") => {
                cost = json!({ "min": field("minNotional"), "max": field("maxNotional") })
            }
            Some("MIN_NOTIONAL") => {
                let min = filter
                    .get("minNotional")
                    .or_else(|| filter.get("notional"))
                    .cloned()
                    .unwrap_or(Value::Null);
                cost = json!({ "min": min, "max": Value::Null });
            }
            _ => {}
        }
    }

    json!({ "amount": amount, "price": price, "cost": cost })
}
