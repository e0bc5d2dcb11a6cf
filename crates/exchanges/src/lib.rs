//! Exchange clients for marketd.
//!
//! Direct REST integration with exchanges, plus the factory that maps an
//! exchange identifier to a connector and the registry that keeps one client
//! per identifier alive for the life of the process.

pub mod binance;
pub mod bybit;
pub mod factory;
pub mod registry;
pub mod rest;

pub use factory::{ClientConstructor, ExchangeClientFactory};
pub use registry::ExchangeClientRegistry;
