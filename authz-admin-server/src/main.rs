mod api;
mod config;
mod errors;
mod openapi;
mod state;
mod store;
#[cfg(test)]
mod test_utils;

use crate::config::Settings;
use crate::state::{AppState, StartupError};
use axum::{middleware, Router};
use log::{error, info};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

/// Anything that stops the admin server before or while it serves
#[derive(Debug, Error)]
enum ServeError {
    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
    info!("Admin server stopped");
}

async fn run() -> Result<(), ServeError> {
    let settings = Settings::new()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let app = create_app(AppState::new(settings)?).await;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    info!("Serving the authorization admin API on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServeError::Serve)
}

/// Builds the router: HAL resources, health probes and the API reference
pub async fn create_app(state: AppState) -> Router {
    let (docs, api_doc) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi()).split_for_parts();

    Router::new()
        .merge(api::router())
        .merge(docs)
        .merge(Scalar::with_url("/scalar", api_doc))
        .layer(middleware::from_fn(api::allow_any_origin))
        .with_state(state)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted, draining connections"),
            _ = terminate.recv() => info!("Terminated, draining connections"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Interrupted, draining connections");
    }
}
