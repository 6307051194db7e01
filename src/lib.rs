// Rail Wars game server

pub mod config;
pub mod db;
pub mod errors;
pub mod game;
pub mod models;
pub mod observer;
pub mod protocol;
pub mod server;
pub mod state;

use tokio::net::TcpListener;
use tokio::signal;

use config::ServerConfig;
use state::AppState;

/// Start the TCP game server.
pub async fn start_server() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");

    let addr = format!("{}:{}", state.config.addr, state.config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    tracing::info!(
        "Serving on {}",
        listener.local_addr().expect("listener has an address")
    );

    tokio::select! {
        _ = server::serve(state.clone(), listener) => {}
        _ = shutdown_signal() => {}
    }

    // Stop all games so replays are flushed before the process exits.
    state.games.stop_all().await;
}

/// Handle graceful shutdown on SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, shutting down");
        },
        _ = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        },
    }
}
