//! gRPC server lifecycle: bind, serve, graceful shutdown.

use anyhow::Context;
use marketd_exchanges::ExchangeClientRegistry;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info, warn};

use crate::proto::market_service_server::MarketServiceServer;
use crate::routes;
use crate::service::MarketGrpcService;
use crate::state::AppState;

const MIB: usize = 1024 * 1024;

/// Server transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests handled concurrently; further requests wait for a free worker.
    pub max_workers: usize,
    pub max_receive_message_size: usize,
    pub max_send_message_size: usize,
    /// Interval between HTTP/2 keep-alive pings.
    pub keepalive_time_ms: u64,
    /// How long to wait for a ping ack before closing the connection.
    pub keepalive_timeout_ms: u64,
    /// 0 = unlimited.
    pub max_pings_without_data: u32,
    pub keepalive_permit_without_calls: bool,
    /// Time in-flight requests get to finish after a stop signal.
    pub shutdown_grace_period_ms: u64,
    /// Bind address for the admin HTTP endpoints; disabled when unset.
    pub admin_bind: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "[::]".to_string(),
            port: 50051,
            max_workers: 10,
            max_receive_message_size: 100 * MIB,
            max_send_message_size: 100 * MIB,
            keepalive_time_ms: 30_000,
            keepalive_timeout_ms: 10_000,
            max_pings_without_data: 0,
            keepalive_permit_without_calls: true,
            shutdown_grace_period_ms: 5_000,
            admin_bind: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive_time(&self) -> Duration {
        Duration::from_millis(self.keepalive_time_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }
}

/// How [`MarketServer::serve`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the grace period.
    Graceful,
    /// The grace period elapsed and remaining requests were terminated.
    Forced,
}

/// The market gRPC server.
pub struct MarketServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl MarketServer {
    pub fn new(config: ServerConfig, registry: Arc<ExchangeClientRegistry>) -> Self {
        let state = Arc::new(AppState::new(registry, config.max_workers));
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// The tonic service with message-size ceilings applied.
    pub fn grpc_service(&self) -> MarketServiceServer<MarketGrpcService> {
        MarketServiceServer::new(MarketGrpcService::new(self.state()))
            .max_decoding_message_size(self.config.max_receive_message_size)
            .max_encoding_message_size(self.config.max_send_message_size)
    }

    /// Bind the configured host and port.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// On shutdown no new connections are accepted and in-flight requests get
    /// the configured grace period; whatever is still running after that is
    /// terminated.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<ShutdownOutcome>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        self.warn_unenforced_options();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let router = Server::builder()
            .http2_keepalive_interval(Some(self.config.keepalive_time()))
            .http2_keepalive_timeout(Some(self.config.keepalive_timeout()))
            .add_service(self.grpc_service());
        let mut grpc = tokio::spawn(router.serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            async move {
                let _ = stop_rx.await;
            },
        ));

        let admin = match &self.config.admin_bind {
            Some(bind) => Some(self.spawn_admin(bind).await?),
            None => None,
        };

        info!(%addr, max_workers = self.state.max_workers, "Server started on {}", addr);

        let grace = self.config.shutdown_grace_period();
        tokio::select! {
            _ = shutdown => {
                info!("Received shutdown signal, stopping server gracefully...");
            }
            result = &mut grpc => {
                error!("gRPC server exited without a shutdown signal");
                if let Some(admin) = admin {
                    admin.stop(grace).await;
                }
                result??;
                return Ok(ShutdownOutcome::Graceful);
            }
        }

        info!(grace_ms = self.config.shutdown_grace_period_ms, "Stopping server...");
        let _ = stop_tx.send(());

        let outcome = match tokio::time::timeout(grace, &mut grpc).await {
            Ok(result) => {
                result??;
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    in_flight = self.state.busy_workers(),
                    "Grace period elapsed, terminating in-flight requests"
                );
                self.state.terminate();
                grpc.abort();
                ShutdownOutcome::Forced
            }
        };

        if let Some(admin) = admin {
            admin.stop(grace).await;
        }

        info!(?outcome, "Server stopped");
        Ok(outcome)
    }

    async fn spawn_admin(&self, bind: &str) -> anyhow::Result<AdminServer> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind admin endpoint {bind}"))?;
        let addr = listener.local_addr()?;
        let app = routes::build_router(self.state());

        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        info!(%addr, "Admin HTTP server listening on {}", addr);
        Ok(AdminServer { stop, task })
    }

    fn warn_unenforced_options(&self) {
        if self.config.max_pings_without_data != 0 {
            warn!(
                max_pings_without_data = self.config.max_pings_without_data,
                "max_pings_without_data is not enforced by the HTTP/2 server; pings are unlimited"
            );
        }
        if !self.config.keepalive_permit_without_calls {
            warn!("keepalive_permit_without_calls=false is not enforced; idle pings are accepted");
        }
    }
}

struct AdminServer {
    stop: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl AdminServer {
    async fn stop(self, grace: Duration) {
        let _ = self.stop.send(());
        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => error!(error = %err, "Admin HTTP server failed"),
            Ok(Err(err)) => error!(error = %err, "Admin HTTP server task failed"),
            Err(_) => task.abort(),
        }
    }
}

/// Resolves on SIGINT (ctrl-c) or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
