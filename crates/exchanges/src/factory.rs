//! Exchange client factory.
//!
//! Maps an exchange identifier to a constructor. Lookups are exact,
//! case-sensitive, and never touch the network.

use marketd_core::{ClientOptions, ExchangeClient};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::binance::{BinanceClient, BINANCE, BINANCE_USDM};
use crate::bybit::{BybitClient, BYBIT};

/// Builds a client for one exchange from the given options.
pub type ClientConstructor = Arc<dyn Fn(ClientOptions) -> Arc<dyn ExchangeClient> + Send + Sync>;

/// Catalog of supported exchanges.
#[derive(Clone, Default)]
pub struct ExchangeClientFactory {
    constructors: HashMap<String, ClientConstructor>,
}

impl ExchangeClientFactory {
    /// A factory that knows no exchanges.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The connectors shipped with marketd.
    pub fn builtin() -> Self {
        Self::empty()
            .with_exchange(BINANCE, |options| -> Arc<dyn ExchangeClient> {
                Arc::new(BinanceClient::spot(options))
            })
            .with_exchange(BINANCE_USDM, |options| -> Arc<dyn ExchangeClient> {
                Arc::new(BinanceClient::usdm(options))
            })
            .with_exchange(BYBIT, |options| -> Arc<dyn ExchangeClient> {
                Arc::new(BybitClient::new(options))
            })
    }

    /// Register (or replace) the constructor for `id`.
    pub fn with_exchange<F>(mut self, id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(ClientOptions) -> Arc<dyn ExchangeClient> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Arc::new(constructor));
        self
    }

    /// Look up the constructor for `id`.
    pub fn resolve(&self, id: &str) -> Option<ClientConstructor> {
        self.constructors.get(id).cloned()
    }

    /// Supported identifiers, sorted.
    pub fn exchanges(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for ExchangeClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeClientFactory")
            .field("exchanges", &self.exchanges())
            .finish()
    }
}
