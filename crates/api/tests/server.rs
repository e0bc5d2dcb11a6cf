use async_trait::async_trait;
use marketd_api::proto::market_service_client::MarketServiceClient;
use marketd_api::proto::{MarketInfo, MarketRequest};
use marketd_api::{AppState, MarketServer, ServerConfig, ShutdownOutcome};
use marketd_core::{ClientOptions, ClientOverrides, ExchangeClient, ExchangeError, RawMarkets};
use marketd_exchanges::{ExchangeClientFactory, ExchangeClientRegistry};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tonic::Code;

// ---------------------------------------------------------------------------
// Stub exchange
// ---------------------------------------------------------------------------

struct StubExchange {
    delay: Duration,
    markets: RawMarkets,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubExchange {
    fn new(delay: Duration) -> Self {
        let mut markets = RawMarkets::new();
        markets.insert(
            "BTC/USDT".into(),
            json!({
                "id": "BTCUSDT",
                "symbol": "BTC/USDT",
                "base": "BTC",
                "quote": "USDT",
                "active": true,
            }),
        );
        Self {
            delay,
            markets,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExchangeClient for StubExchange {
    fn id(&self) -> &str {
        "binance"
    }

    fn options(&self) -> ClientOptions {
        ClientOptions::default()
    }

    fn supports_market_loading(&self) -> bool {
        true
    }

    fn apply_overrides(&self, _overrides: ClientOverrides) {}

    async fn load_markets(&self) -> Result<RawMarkets, ExchangeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.markets.clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    addr: SocketAddr,
    state: Arc<AppState>,
    stop: oneshot::Sender<()>,
    server: JoinHandle<anyhow::Result<ShutdownOutcome>>,
}

impl Harness {
    async fn start(stub: Arc<StubExchange>, config: ServerConfig) -> Self {
        let factory = ExchangeClientFactory::empty().with_exchange(
            "binance",
            move |_options| -> Arc<dyn ExchangeClient> { stub.clone() },
        );
        let registry = Arc::new(ExchangeClientRegistry::new(factory));
        let server = MarketServer::new(config, registry);
        let state = server.state();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(server.serve(listener, async move {
            let _ = stop_rx.await;
        }));

        Self {
            addr,
            state,
            stop,
            server,
        }
    }

    async fn client(&self) -> MarketServiceClient<Channel> {
        MarketServiceClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    async fn wait_for_busy_workers(&self, count: usize) {
        for _ in 0..200 {
            if self.state.busy_workers() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("requests never reached the handler");
    }

    async fn shutdown(self) -> ShutdownOutcome {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(10), self.server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap()
    }
}

fn request(exchange: &str) -> MarketRequest {
    MarketRequest {
        exchange: exchange.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_load_markets_round_trip() {
    let harness = Harness::start(
        Arc::new(StubExchange::new(Duration::ZERO)),
        ServerConfig::default(),
    )
    .await;
    let mut client = harness.client().await;

    let response = client.load_markets(request("binance")).await.unwrap().into_inner();

    assert_eq!(response.markets.len(), 1);
    assert_eq!(
        response.markets["BTC/USDT"],
        MarketInfo {
            id: "BTCUSDT".into(),
            symbol: "BTC/USDT".into(),
            base: "BTC".into(),
            quote: "USDT".into(),
            active: true,
        }
    );

    assert_eq!(harness.shutdown().await, ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn test_unsupported_exchange_over_the_wire() {
    let harness = Harness::start(
        Arc::new(StubExchange::new(Duration::ZERO)),
        ServerConfig::default(),
    )
    .await;
    let mut client = harness.client().await;

    let status = client.load_markets(request("mtgox")).await.unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "Unsupported exchange: mtgox");
    assert!(harness.state.registry.is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_graceful_shutdown_lets_in_flight_requests_finish() {
    let harness = Harness::start(
        Arc::new(StubExchange::new(Duration::from_millis(300))),
        ServerConfig::default(),
    )
    .await;
    let addr = harness.addr;
    let mut client = harness.client().await;

    let in_flight = tokio::spawn(async move { client.load_markets(request("binance")).await });
    harness.wait_for_busy_workers(1).await;

    let outcome = harness.shutdown().await;
    let response = in_flight.await.unwrap().unwrap().into_inner();

    assert_eq!(outcome, ShutdownOutcome::Graceful);
    assert_eq!(response.markets.len(), 1);
    assert!(MarketServiceClient::connect(format!("http://{addr}"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_shutdown_terminates_requests_after_grace_period() {
    let config = ServerConfig {
        shutdown_grace_period_ms: 200,
        ..Default::default()
    };
    let harness = Harness::start(Arc::new(StubExchange::new(Duration::from_secs(30))), config).await;
    let mut client = harness.client().await;

    let in_flight = tokio::spawn(async move { client.load_markets(request("binance")).await });
    harness.wait_for_busy_workers(1).await;

    let started = std::time::Instant::now();
    let outcome = harness.shutdown().await;

    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(5));

    let result = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("in-flight request was not terminated")
        .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let stub = Arc::new(StubExchange::new(Duration::from_millis(100)));
    let config = ServerConfig {
        max_workers: 2,
        ..Default::default()
    };
    let harness = Harness::start(Arc::clone(&stub), config).await;
    let client = harness.client().await;

    let calls: Vec<_> = (0..6)
        .map(|_| {
            let mut client = client.clone();
            tokio::spawn(async move { client.load_markets(request("binance")).await })
        })
        .collect();
    for call in calls {
        let response = call.await.unwrap().unwrap().into_inner();
        assert_eq!(response.markets.len(), 1);
    }

    let peak = stub.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");

    harness.shutdown().await;
}
