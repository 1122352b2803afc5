use blogpush_core::github::GitHubClient;
use blogpush_core::publish::Publisher;
use blogpush_server::{
    app,
    config::Config,
    cors_layer,
    handlers::ApiState,
    image_source::RelayImageSource,
    relay::UploadRelay,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "blogpush_server=debug,blogpush_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting blogpush server v{}", env!("CARGO_PKG_VERSION"));
    info!("Upload directory: {:?}", config.upload_dir);
    info!("CORS origins: {:?}", config.cors_origins);
    if !config.has_fallback_token() {
        warn!("GITHUB_PAT not set: requests without a bearer token will be refused");
    }

    let relay = match UploadRelay::new(&config.upload_dir, config.upload_ttl).await {
        Ok(relay) => Arc::new(relay),
        Err(e) => {
            error!("Failed to create upload directory: {}", e);
            std::process::exit(1);
        }
    };
    match relay.sweep().await {
        Ok(0) => {}
        Ok(n) => info!("Removed {} expired uploads left by a previous run", n),
        Err(e) => warn!("Failed to sweep upload directory: {}", e),
    }

    let publisher = Publisher::new(
        Arc::new(GitHubClient::new(config.github_api_url.clone())),
        Arc::new(RelayImageSource::new(relay.clone())),
        config.publisher_config(),
    );
    let state = ApiState {
        publisher,
        relay: relay.clone(),
        max_upload_bytes: config.max_upload_bytes,
    };
    let router = app(state, cors_layer(&config.cors_origins));

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    relay.shutdown().await;
    info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

    info!("Shutdown signal received");
}
