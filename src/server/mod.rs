//! TCP bootstrap: accept connections and hand each one to a session task.

pub mod session;

use tokio::net::TcpListener;

use crate::state::AppState;

/// Runs the accept loop forever. Shutdown is arranged by the caller
/// racing this future against the signal handler.
pub async fn serve(state: AppState, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(session::handle_connection(state.clone(), stream, peer));
            }
            Err(err) => {
                tracing::warn!(%err, "failed to accept connection");
            }
        }
    }
}
