use foliovault::application::handlers::{router, AppState};
use foliovault::config::AppConfig;
use foliovault::crypto::SecretCipher;
use foliovault::exchange::binance_client::BinanceClient;
use foliovault::persistence::{init_database, repository::ApiKeyRepository};
use foliovault::rate_limit::RateLimitStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foliovault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!("FolioVault exchange gateway starting...");

    let cipher = Arc::new(SecretCipher::from_base64(&config.encryption_key_b64)?);

    let pool = init_database(&config.database_url).await?;
    let keys = Arc::new(ApiKeyRepository::new(pool));

    let binance = Arc::new(if config.use_testnet {
        info!("Using Binance testnet");
        BinanceClient::new_testnet()
    } else {
        BinanceClient::new()
    });

    let rate_limits = Arc::new(RateLimitStore::new());
    let sweeper = rate_limits.spawn_sweeper(Duration::from_secs(config.sweep_interval_secs));

    let state = AppState {
        rate_limits,
        keys,
        cipher,
        binance,
    };
    let app = router(state);

    let addr = config.bind_addr;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shutting down gracefully...");
    sweeper.shutdown();

    Ok(())
}
