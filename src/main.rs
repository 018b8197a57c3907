//! WizardLive Broadcast - local control bridge
//!
//! Drives a WizardCam device over its REST controller and publishes the
//! broadcast session to a local HTTP/SSE surface.

use wizardlive_broadcast::{api, backend, bus, config, credentials, device, session};

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wizardlive_broadcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting WizardLive Broadcast v{} ({})",
        env!("WLB_VERSION"),
        env!("WLB_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    tracing::info!("Configuration loaded, port: {}", config.port);

    let bus = bus::create_bus();

    // Device controller
    let device = device::DeviceClient::new(&config.device)?;
    tracing::info!("Device controller at {}", device.base_url());
    let stream_urls = device.stream_candidates();
    let orchestrator = device::Orchestrator::new(Arc::new(device));

    // Backend + stored credentials
    let backend = Arc::new(backend::BackendClient::new(&config.backend)?);
    tracing::info!("Backend at {}", backend.base_url());

    let data_dir = config::get_data_dir();
    let credentials = Arc::new(credentials::Credentials::new(
        credentials::SessionStore::new(&data_dir),
    ));
    if credentials.restore().await {
        tracing::info!("Signed in from remembered session");
    }

    // Broadcast session with its refresh loop
    let session = session::BroadcastSession::new(
        orchestrator,
        backend.clone(),
        credentials.clone(),
        bus.clone(),
        &config.session,
    );
    let refresh_loop = session.spawn();

    let state = api::AppState::new(
        session.clone(),
        backend,
        credentials,
        bus,
        stream_urls,
    );

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Closing broadcast session...");
    session.close();
    if let Err(e) = refresh_loop.await {
        tracing::warn!("Refresh loop ended abnormally: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
