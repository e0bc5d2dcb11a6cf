use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::LoadError;
use crate::proto::market_service_server::MarketService;
use crate::proto::{MarketRequest, MarketResponse};
use crate::state::AppState;

/// tonic binding for `market.MarketService`.
///
/// Each call waits for a worker permit, then runs the handler until it
/// finishes or the server is terminated.
#[derive(Clone)]
pub struct MarketGrpcService {
    state: Arc<AppState>,
}

impl MarketGrpcService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl MarketService for MarketGrpcService {
    async fn load_markets(
        &self,
        request: Request<MarketRequest>,
    ) -> Result<Response<MarketResponse>, Status> {
        let exchange = request.into_inner().exchange;
        let span = info_span!("load_markets", request_id = %Uuid::new_v4(), exchange = %exchange);

        async move {
            let _permit = self
                .state
                .workers
                .acquire()
                .await
                .map_err(|_| Status::from(LoadError::Internal("worker pool closed".into())))?;

            tokio::select! {
                result = self.state.handler.load_markets(&exchange) => result
                    .map(|outcome| Response::new(outcome.response))
                    .map_err(Status::from),
                _ = self.state.terminated() => {
                    warn!("Request abandoned, server terminated");
                    Err(Status::unavailable("server is shutting down"))
                }
            }
        }
        .instrument(span)
        .await
    }
}
