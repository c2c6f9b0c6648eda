//! Foldgate server binary.
//!
//! Wires the orchestrator together against the in-memory store and cache,
//! starts the side-effect worker and the reconciler, and serves the HTTP
//! API until interrupted.

mod routes;

use clap::Parser;
use foldgate::cache::{JobCache, MemoryCache};
use foldgate::config::Settings;
use foldgate::dispatch::DispatchController;
use foldgate::lifecycle::LifecycleManager;
use foldgate::provider::HttpComputeProvider;
use foldgate::reconciler::PollingReconciler;
use foldgate::service::{JobService, NullResultArchive, SideEffectWorker};
use foldgate::store::MemoryJobStore;
use foldgate::webhook::WebhookProcessor;
use routes::AppState;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "foldgate-server")]
#[command(about = "Molecular prediction job orchestrator", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8600")]
    listen: SocketAddr,

    /// Base URL of the compute provider API
    #[arg(long, default_value = "http://localhost:8700")]
    provider_url: String,

    /// Bearer token for provider calls
    #[arg(long, env = "FOLDGATE_PROVIDER_TOKEN", default_value = "")]
    provider_token: String,

    /// Shared HMAC secret for completion webhooks
    #[arg(long, env = "FOLDGATE_WEBHOOK_SECRET")]
    webhook_secret: String,

    /// Global ceiling on concurrent provider calls
    #[arg(long, default_value = "32")]
    global_concurrency: usize,

    /// Per-batch ceiling on concurrent child dispatches
    #[arg(long, default_value = "5")]
    batch_concurrency: usize,

    /// Seconds between reconciler sweeps
    #[arg(long, default_value = "60")]
    reconcile_interval_secs: u64,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.provider.base_url = self.provider_url.clone();
        settings.provider.api_token = self.provider_token.clone();
        settings.webhook.secret = self.webhook_secret.clone();
        settings.dispatch.global_concurrency = self.global_concurrency;
        settings.dispatch.batch_concurrency = self.batch_concurrency;
        settings.reconciler.tick_interval = Duration::from_secs(self.reconcile_interval_secs);
        settings
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,foldgate=debug".into()),
        )
        .init();

    let args = Args::parse();
    if args.webhook_secret.is_empty() {
        eprintln!("Error: webhook secret must not be empty");
        process::exit(1);
    }
    let settings = args.settings();
    let shutdown = CancellationToken::new();

    let store = Arc::new(MemoryJobStore::new());
    let cache = Arc::new(JobCache::with_ttls(
        Arc::new(MemoryCache::new()),
        settings.cache.detail_ttl,
        settings.cache.batch_ttl,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), cache.clone()));

    let provider = match HttpComputeProvider::new(settings.provider.to_config()) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!(error = %e, "Could not build provider client");
            process::exit(1);
        }
    };

    let dispatcher = Arc::new(DispatchController::new(
        provider.clone(),
        lifecycle.clone(),
        settings.dispatch.to_config(),
        shutdown.clone(),
    ));

    let (effects, effect_worker) =
        SideEffectWorker::new(Arc::new(NullResultArchive), provider.clone());
    let effect_handle = tokio::spawn(effect_worker.run(shutdown.clone()));

    let reconciler = PollingReconciler::new(
        store.clone(),
        lifecycle.clone(),
        provider.clone(),
        settings.reconciler.to_config(),
    );
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let service = Arc::new(JobService::new(
        store,
        cache,
        lifecycle.clone(),
        dispatcher,
        effects.clone(),
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        settings.webhook.secret.as_bytes().to_vec(),
        settings.webhook.freshness_window,
        lifecycle,
        effects,
    ));

    let app = routes::router(AppState { service, webhooks });

    let listener = match tokio::net::TcpListener::bind(args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "Could not bind listener");
            process::exit(1);
        }
    };
    info!(addr = %args.listen, "Foldgate server listening");

    let server_shutdown = shutdown.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, shutting down");
                    server_shutdown.cancel();
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    if let Err(e) = serve_result {
        error!(error = %e, "Server exited with error");
    }

    shutdown.cancel();
    let _ = reconciler_handle.await;
    let _ = effect_handle.await;
    info!("Shutdown complete");
}
