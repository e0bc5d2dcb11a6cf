use chrono::{DateTime, Utc};
use marketd_exchanges::ExchangeClientRegistry;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::handler::MarketLoadHandler;

/// Shared state for the gRPC service and the admin routes.
pub struct AppState {
    pub registry: Arc<ExchangeClientRegistry>,
    pub handler: MarketLoadHandler,
    /// Worker pool: one permit per concurrently running request.
    pub workers: Arc<Semaphore>,
    pub max_workers: usize,
    pub started_at: DateTime<Utc>,
    terminate: watch::Sender<bool>,
}

impl AppState {
    pub fn new(registry: Arc<ExchangeClientRegistry>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (terminate, _) = watch::channel(false);
        Self {
            handler: MarketLoadHandler::new(Arc::clone(&registry)),
            registry,
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            started_at: Utc::now(),
            terminate,
        }
    }

    /// Requests currently holding a worker.
    pub fn busy_workers(&self) -> usize {
        self.max_workers
            .saturating_sub(self.workers.available_permits())
    }

    /// Abandon every in-flight request.
    pub fn terminate(&self) {
        self.terminate.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminate.borrow()
    }

    /// Resolves once [`AppState::terminate`] has been called.
    pub async fn terminated(&self) {
        let mut rx = self.terminate.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }
}
