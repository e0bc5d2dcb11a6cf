use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::traits::TransformError;

// ---------------------------------------------------------------------------
// Raw connector output
// ---------------------------------------------------------------------------

/// Markets as reported by an exchange connector, keyed by unified symbol.
///
/// Entries stay loosely typed here: a connector passes through whatever the
/// exchange sent, and validation happens per entry when a [`MarketRecord`]
/// is built from it.
pub type RawMarkets = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// An inclusive numeric range; either bound may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinMax {
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub min: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub max: Option<Decimal>,
}

impl MinMax {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Order size limits for a market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketLimits {
    /// Base-asset quantity range.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub amount: MinMax,
    /// Price range.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub price: MinMax,
    /// Notional (amount * price) range.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub cost: MinMax,
}

/// One exchange-reported trading pair in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Exchange-native symbol key (e.g. "BTCUSDT").
    pub id: String,
    /// Normalized symbol (e.g. "BTC/USDT").
    pub symbol: String,
    pub base: String,
    pub quote: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub active: bool,
    /// "spot", "swap", "future", ...
    #[serde(
        rename = "type",
        default = "default_market_type",
        deserialize_with = "deserialize_market_type"
    )]
    pub market_type: String,
    /// Unreadable limits are treated as absent.
    #[serde(default, deserialize_with = "deserialize_lenient_limits")]
    pub limits: Option<MarketLimits>,
}

impl MarketRecord {
    /// Build a record from one raw connector entry.
    ///
    /// `id`, `symbol`, `base` and `quote` are required strings and `active`
    /// must be a boolean when present; only these can reject an entry. A
    /// missing or null `active` reads as `false`. A `type` that is not a
    /// string reads as `"spot"`, and unreadable `limits` read as `None`.
    /// Unknown fields are ignored.
    pub fn from_raw(raw: &Value) -> Result<Self, TransformError> {
        if !raw.is_object() {
            return Err(TransformError::NotAnObject(json_kind(raw)));
        }
        Ok(MarketRecord::deserialize(raw)?)
    }
}

pub const DEFAULT_MARKET_TYPE: &str = "spot";

fn default_market_type() -> String {
    DEFAULT_MARKET_TYPE.to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Decimal parsing
// ---------------------------------------------------------------------------

/// Parse a decimal from plain ("0.001") or scientific ("1e-8") notation.
pub fn parse_decimal(text: &str) -> Result<Decimal, rust_decimal::Error> {
    let text = text.trim();
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text))
}

fn deserialize_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => parse_decimal(&n.to_string())
            .map(Some)
            .map_err(D::Error::custom),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_decimal(&s).map(Some).map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!(
            "invalid type: {}, expected a decimal number",
            json_kind(&other)
        ))),
    }
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_market_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(market_type) => Ok(market_type),
        _ => Ok(default_market_type()),
    }
}

fn deserialize_lenient_limits<'de, D>(deserializer: D) -> Result<Option<MarketLimits>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => Ok(MarketLimits::deserialize(value).ok()),
    }
}
