//! Local HTTP server implementing the module store API.
//!
//! Provides REST endpoints for:
//! - Fetching a module with its content
//! - Appending keyed entries to a memory module
//! - Creating and listing modules
//!
//! Everything is held in memory; restarting the server starts from an empty store.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{ModuleRecord, ModuleStoreState, StoreError};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5001;

/// Boxed error returned by the server entry points.
pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<ModuleStoreState>, port: u16) -> Result<(), ServerError> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<ModuleStoreState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Module store listening on http://{}", addr);

    serve(listener, state, shutdown_signal).await
}

/// Serve the module store on an already bound listener.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<ModuleStoreState>,
    shutdown_signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
