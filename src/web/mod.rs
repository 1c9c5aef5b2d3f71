//! HTTP server module.
//!
//! Accepts image uploads and exposes the panel options over a small JSON API,
//! using Axum.

pub mod routes;

use crate::image_proc::ImageProcessor;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Server error: {0}")]
    ServerError(String),
}

/// Web server configuration
pub struct WebServer {
    processor: Arc<ImageProcessor>,
    max_upload_bytes: usize,
}

impl WebServer {
    /// Create a new web server
    pub fn new(processor: Arc<ImageProcessor>, max_upload_bytes: usize) -> Self {
        Self {
            processor,
            max_upload_bytes,
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let state = AppState {
            processor: Arc::clone(&self.processor),
            options: self.processor.options(),
        };

        Router::new()
            .route("/use", post(routes::use_image))
            .route("/set/{name}", patch(routes::set_option))
            .route("/options", get(routes::list_options))
            .route("/get/{name}", get(routes::get_option))
            .route("/health", get(routes::health))
            .layer(DefaultBodyLimit::max(self.max_upload_bytes))
            .with_state(state)
    }

    /// Run the web server with graceful shutdown
    pub async fn run_with_shutdown(
        &self,
        addr: SocketAddr,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), WebError> {
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Web server listening on http://{}", addr);

        let mut shutdown = shutdown;
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Web server shutting down gracefully");
            })
            .await
            .map_err(|e| WebError::ServerError(e.to_string()))
    }
}
