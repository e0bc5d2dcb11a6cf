pub mod error;
pub mod handler;
pub mod routes;
pub mod server;
pub mod service;
pub mod state;

/// Generated protobuf messages and gRPC stubs for `market.MarketService`.
pub mod proto {
    tonic::include_proto!("market");
}

pub use error::LoadError;
pub use handler::{LoadOutcome, MarketLoadHandler, ProcessedCounters};
pub use server::{shutdown_signal, MarketServer, ServerConfig, ShutdownOutcome};
pub use state::AppState;

use marketd_exchanges::ExchangeClientRegistry;
use std::sync::Arc;

/// Bind the configured port and serve until SIGINT/SIGTERM.
pub async fn start_server(
    config: ServerConfig,
    registry: Arc<ExchangeClientRegistry>,
) -> anyhow::Result<ShutdownOutcome> {
    let server = MarketServer::new(config, registry);
    let listener = server.bind().await?;
    server.serve(listener, shutdown_signal()).await
}
