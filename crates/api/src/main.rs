use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use emoscope_pipeline::registry::JobRegistry;
use emoscope_pipeline::script::{script_collaborators, ScriptRunner};
use emoscope_pipeline::service::AnalysisService;
use emoscope_pipeline::stages::StageContext;
use emoscope_pipeline::store::LocalArtifactStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emoscope_api::background;
use emoscope_api::config::ServerConfig;
use emoscope_api::router::build_app_router;
use emoscope_api::state::AppState;

/// How long the runtime waits for leftover blocking work once the server and
/// worker pool have shut down.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "emoscope_api=debug,emoscope_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Runtime ---
    // Built by hand so shutdown is bounded: stage bodies abandoned by the
    // worker pool still occupy blocking threads and must not hold the
    // process open.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");
    runtime.block_on(serve(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    tracing::info!("Graceful shutdown complete");
}

/// Run the server until a shutdown signal, then drain background work.
async fn serve(config: ServerConfig) {
    // Fired when the worker pool abandons running jobs; kills worker scripts.
    let abandon = CancellationToken::new();

    // --- Job registry and collaborators ---
    let registry = Arc::new(JobRegistry::with_log_capacity(config.job_log_capacity));
    let store = Arc::new(LocalArtifactStore::new(
        config.artifact_root.clone(),
        config.artifact_base_url.clone(),
    ));
    let runner = Arc::new(
        ScriptRunner::new(
            config.worker_program.clone(),
            config.worker_scripts_dir.clone(),
            config.model_artifacts_dir.clone(),
        )
        .with_shutdown(abandon.clone()),
    );
    tracing::info!(
        artifact_root = %config.artifact_root.display(),
        scripts_dir = %config.worker_scripts_dir.display(),
        "Artifact store and worker scripts configured"
    );

    // --- Analysis service ---
    let ctx = StageContext::new(Arc::clone(&registry), store, script_collaborators(runner));
    let service = Arc::new(
        AnalysisService::new(ctx, config.worker_slots, config.data_page_size)
            .with_abandon_token(abandon),
    );
    tracing::info!(worker_slots = config.worker_slots, "Worker pool started");

    // --- Job retention sweeper ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(background::job_retention::run(
        Arc::clone(&service),
        Duration::from_secs(config.job_retention_secs),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        service: Arc::clone(&service),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention sweeper stopped");

    let abandoned = service
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    if abandoned > 0 {
        tracing::warn!(abandoned, "Running jobs abandoned at shutdown");
    }
    tracing::info!("Worker pool drained");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
