//! HTTP service description.
//!
//! # Responsibilities
//! - Pair a request router with its validated service config
//! - Wire up middleware (tracing, request timeout, body limit, request ID)
//! - Provide the stock `/health` route
//!
//! Binding and serving belong to the lifecycle controller, not to this module.

use axum::{http::StatusCode, routing::get, Router};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::validate_service_config;
use crate::config::{ConfigError, ServiceConfig};
use crate::http::request::RequestIdLayers;

/// What to serve and where: a router plus the config it is served with.
#[derive(Clone)]
pub struct ServiceHandle {
    config: ServiceConfig,
    router: Router,
}

impl ServiceHandle {
    /// Validate `config` and wrap `router` in the standard middleware stack.
    pub fn new(config: ServiceConfig, router: Router) -> Result<Self, ConfigError> {
        validate_service_config(&config).map_err(ConfigError::Validation)?;
        let router = Self::build_router(&config, router);
        Ok(Self { config, router })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, router: Router) -> Router {
        router
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(RequestIdLayers::new())
            .layer(TraceLayer::new_for_http())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// A clone of the fully layered router, ready to serve.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Router answering `GET /health` with 200 "ok".
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
