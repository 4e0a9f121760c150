//! # raffle-relay: Alphabot raffle auto-entry
//!
//! `raffle-relay` enters a group of participants into Alphabot raffles the moment they open.
//! Participants enrol once by handing over their own Alphabot API key; from then on, every
//! `raffle:active` webhook Alphabot sends is fanned out into one registration call per participant,
//! made with that participant's key.
//!
//! ## Request Flow
//!
//! ```text
//! POST /webhook/alphabot
//!   ├─ WebhookVerifier      parse body, check HMAC over "{event}\n{timestamp}"  (400 / 401)
//!   └─ FanoutOrchestrator
//!        ├─ CredentialStore::list_all()        snapshot of enrolled participants
//!        ├─ RaffleApi::register() × N          bounded concurrency, 429 → wait + one retry
//!        └─ NotificationSink::send() × N       background, failures only logged
//! ```
//!
//! The webhook answers `200 {"status":"success"}` once the fan-out finishes or `fanout.timeout`
//! elapses, whichever is first; a slow run keeps going in the background and is awaited on
//! shutdown. Per-participant failures never change the response.
//!
//! The chat-facing side (setting keys, manual joins, status) lives in [`commands`] as a
//! transport-agnostic service sharing the same store and API client.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use raffle_relay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = raffle_relay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     raffle_relay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod alphabot;
pub mod api;
pub mod commands;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod notifications;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::alphabot::{AlphabotClient, RaffleApi};
use crate::commands::CommandService;
use crate::fanout::FanoutOrchestrator;
use crate::notifications::NotificationSink;
use crate::openapi::ApiDoc;
use crate::storage::{CredentialStore, JsonFileStore};
use crate::webhooks::WebhookVerifier;

pub use config::Config;

/// Shared state for request handlers.
///
/// Everything here is constructed once in [`Application::new`] and passed down explicitly.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CredentialStore>,
    pub verifier: WebhookVerifier,
    pub orchestrator: FanoutOrchestrator,
    pub commands: CommandService,
}

/// Build the HTTP router.
pub fn build_router(state: &AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/webhook/alphabot", post(api::handlers::webhooks::alphabot_webhook))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_sink(config, None).await
    }

    /// Like [`Application::new`], but with an externally supplied notification sink (e.g. a chat
    /// bot that already holds a gateway connection). `None` picks the sink from configuration.
    pub async fn new_with_sink(config: Config, sink: Option<Arc<dyn NotificationSink>>) -> anyhow::Result<Self> {
        info!(
            storage = %config.storage.path.display(),
            alphabot = %config.alphabot.base_url,
            max_concurrency = config.fanout.max_concurrency,
            fanout_timeout = ?config.fanout.timeout,
            "Starting raffle relay"
        );

        let store: Arc<dyn CredentialStore> = Arc::new(
            JsonFileStore::open(&config.storage.path)
                .await
                .with_context(|| format!("Failed to open credential store at {}", config.storage.path.display()))?,
        );
        let api: Arc<dyn RaffleApi> = Arc::new(AlphabotClient::new(&config.alphabot).context("Failed to create Alphabot client")?);
        let sink = match sink {
            Some(sink) => sink,
            None => notifications::create_sink(&config.notifications).context("Failed to create notification sink")?,
        };

        let verifier = WebhookVerifier::new(config.webhook.secret.clone());
        if verifier.is_bypassed() {
            warn!("No webhook secret configured: webhook verification is DISABLED. Do not run like this in production.");
        }

        let orchestrator = FanoutOrchestrator::new(store.clone(), api.clone(), sink, &config.fanout);
        let commands = CommandService::new(store.clone(), api);

        let app_state = AppState::builder()
            .config(config.clone())
            .store(store)
            .verifier(verifier)
            .orchestrator(orchestrator)
            .commands(commands)
            .build();

        let router = build_router(&app_state);

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Handle for waiting on background fan-outs.
    pub fn orchestrator(&self) -> FanoutOrchestrator {
        self.app_state.orchestrator.clone()
    }

    /// The participant command surface, for a chat front end running in the same process.
    pub fn commands(&self) -> CommandService {
        self.app_state.commands.clone()
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Raffle relay listening on http://{}, webhook at http://localhost:{}/webhook/alphabot",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Fan-outs that outlived their webhook response are still registering people
        info!("Waiting for background fan-outs...");
        self.app_state.orchestrator.shutdown().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
