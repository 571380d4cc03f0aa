use std::sync::Arc;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};

pub mod auth;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod upstream;

use mcp::server::ProtocolServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<ProtocolServer>,
}

impl AppState {
    pub fn new(server: ProtocolServer) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", any(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn(auth::establish_request_context));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
