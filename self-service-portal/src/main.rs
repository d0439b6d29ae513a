use dotenvy::dotenv;
use self_service_portal::config::get_configuration;
use self_service_portal::startup::build_router;
use self_service_portal::workers::BackgroundJobs;
use self_service_portal::AppState;
use service_core::observability::logging::init_tracing;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "self-service-portal",
        &configuration.observability.log_level,
        configuration.observability.otlp_endpoint.as_deref(),
    )?;

    self_service_portal::services::metrics::init_metrics()?;

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let grace = configuration.server.shutdown_grace();
    let sweep_interval = configuration.verification.sweep_interval();
    let poll_interval = configuration.verification.poll_interval();

    let state = AppState::from_settings(configuration)
        .map_err(|e| anyhow::anyhow!("Failed to initialise application state: {}", e))?;

    let jobs = BackgroundJobs::start(state.verification.clone(), sweep_interval, poll_interval);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting self-service-portal on {}", address);

    let stop_accepting = CancellationToken::new();
    let mut server = tokio::spawn({
        let stop_accepting = stop_accepting.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop_accepting.cancelled().await })
                .await
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            stop_accepting.cancel();
            match tokio::time::timeout(grace, &mut server).await {
                Ok(Ok(Ok(()))) => info!("In-flight requests drained"),
                Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
                Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
                Err(_) => {
                    tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, aborting open requests");
                    server.abort();
                }
            }
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => info!("Server stopped"),
                Ok(Err(e)) => tracing::error!("Server error: {}", e),
                Err(e) => tracing::error!("Server task failed: {}", e),
            }
        }
    }

    jobs.shutdown().await;
    info!("self-service-portal stopped");

    Ok(())
}
