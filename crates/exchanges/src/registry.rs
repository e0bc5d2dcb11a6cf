//! Long-lived exchange clients, one per identifier.

use marketd_core::{ClientOptions, ConfigError, ExchangeClient};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::factory::ExchangeClientFactory;

/// Owns one initialized client per exchange identifier.
///
/// Clients are created on first use with the registry's default options and
/// kept until the registry is dropped. There is no eviction and no refresh:
/// later option changes must be applied to the cached client itself.
pub struct ExchangeClientRegistry {
    factory: ExchangeClientFactory,
    defaults: ClientOptions,
    clients: RwLock<HashMap<String, Arc<dyn ExchangeClient>>>,
}

impl ExchangeClientRegistry {
    /// Registry constructing clients with [`ClientOptions::default`].
    pub fn new(factory: ExchangeClientFactory) -> Self {
        Self::with_options(factory, ClientOptions::default())
    }

    pub fn with_options(factory: ExchangeClientFactory, defaults: ClientOptions) -> Self {
        Self {
            factory,
            defaults,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Return the client for `id`, constructing it on first use.
    ///
    /// Concurrent first calls for the same identifier construct exactly one
    /// client: the miss path re-checks under the write lock before building.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ExchangeClient>, ConfigError> {
        if let Some(client) = self.clients.read().get(id) {
            return Ok(Arc::clone(client));
        }

        let mut clients = self.clients.write();
        if let Some(client) = clients.get(id) {
            return Ok(Arc::clone(client));
        }

        let constructor = self
            .factory
            .resolve(id)
            .ok_or_else(|| ConfigError::UnsupportedExchange(id.to_string()))?;
        let client = constructor(self.defaults.clone());
        clients.insert(id.to_string(), Arc::clone(&client));
        info!(exchange = %id, cached = clients.len(), "Created exchange client");

        Ok(client)
    }

    pub fn factory(&self) -> &ExchangeClientFactory {
        &self.factory
    }

    pub fn defaults(&self) -> &ClientOptions {
        &self.defaults
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Identifiers with a live client, sorted.
    pub fn cached_exchanges(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
