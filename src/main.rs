use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use flight_proxy::auth::CredentialManager;
use flight_proxy::config::Config;
use flight_proxy::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = if config.debug {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Flight proxy starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    if !config.has_client_identity() {
        tracing::warn!(
            "VAMSYS_CLIENT_ID / VAMSYS_CLIENT_SECRET not set - token refresh will fail until they are configured"
        );
    }

    // Initialize credential manager
    tracing::info!("Initializing vAMSYS token...");
    let credentials = Arc::new(CredentialManager::from_config(&config)?);

    if credentials.initialize().await {
        tracing::info!("✅ Token initialized successfully");
    } else {
        tracing::warn!("⚠️  Token initialization failed");
        tracing::warn!("Server will start; the background refresh keeps retrying");
    }

    // An empty store always counts as due, so this also retries a failed start
    credentials
        .start_background_refresh(Duration::from_secs(config.token_check_interval))
        .await;
    tracing::info!("✅ Background token refresh started");

    let state = AppState {
        credentials: credentials.clone(),
        debug: config.debug,
    };

    let app = build_app(state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    credentials.stop_background_refresh().await;
    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: AppState) -> axum::Router {
    use axum::Router;

    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::token_routes(state))
        .fallback(routes::not_found_handler)
        .layer(TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                ✈️  Flight Proxy - Rust Edition            ║
║                                                           ║
║        vAMSYS flight data proxy with managed OAuth        ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:        {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:         http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Token file:     {}", config.token_file.display());
    println!(
        "  Token check:    every {:.1} hours",
        config.token_check_interval as f64 / 3600.0
    );
    println!("  Debug:          {}", config.debug);
    println!("  Log Level:      {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
