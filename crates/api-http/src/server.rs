//! HTTP server assembly and lifecycle.

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::validate_request::ValidateRequestHeaderLayer;

use stsv_core::Datastore;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::{api, html};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub datastore: Arc<Datastore>,
}

/// The STSV state backend server: protocol adapter under `/api/`, the
/// browsing UI under `/html/`.
pub struct StateServer {
    config: ServerConfig,
    datastore: Arc<Datastore>,
}

impl StateServer {
    pub fn new(config: ServerConfig, datastore: Datastore) -> Self {
        Self {
            config,
            datastore: Arc::new(datastore),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the axum router (useful for testing without a socket).
    pub fn router(&self) -> Router {
        let state = AppState {
            datastore: self.datastore.clone(),
        };
        let router = Router::new()
            .route("/api/", any(api::handle_empty))
            .route("/api/*name", any(api::handle))
            .route("/html/", get(html::index))
            .route("/html/view/*name", get(html::view))
            .with_state(state);
        match &self.config.basic_auth {
            Some(auth) => router.layer(ValidateRequestHeaderLayer::basic(
                &auth.username,
                &auth.password,
            )),
            None => router,
        }
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn serve(self) -> ServerResult<()> {
        let addr = self.config.bind_addr;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("state server listening on {addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
