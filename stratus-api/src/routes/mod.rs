//! REST API Routes Module
//!
//! - `/api/v1/users`: user CRUD (tenant-scoped, timed request logging)
//! - `/api/v1/ws`: realtime notification stream
//! - `/health`, `/metrics`: operational endpoints, no tenant required
//!
//! Request logging is chosen per route group when the router is composed,
//! through [`RouteLogging`].

pub mod health;
pub mod user;

use std::sync::Arc;

use axum::{middleware::from_fn, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::correlation_id;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, request_logging};
use crate::ws::ws_handler;

pub use health::create_router as health_router;
pub use user::create_router as user_router;

/// Request logging applied to a route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLogging {
    /// Span, latency metrics and a completion log line per request.
    Timed,
    Plain,
}

impl RouteLogging {
    pub fn apply(self, router: Router) -> Router {
        match self {
            RouteLogging::Timed => router.layer(from_fn(request_logging)),
            RouteLogging::Plain => router,
        }
    }
}

/// Build the `/api/v1` routes.
pub fn api_routes(state: &AppState) -> Router {
    let users = user::create_router(Arc::new(user::UserState {
        store: Arc::clone(&state.store),
        cache: Arc::clone(&state.cache),
        recorder: Arc::clone(&state.recorder),
        clock: Arc::clone(&state.clock),
    }));

    let realtime = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(Arc::clone(&state.notifier));

    Router::new()
        .nest("/users", RouteLogging::Timed.apply(users))
        .merge(RouteLogging::Plain.apply(realtime))
}

/// Build the full application router.
pub fn create_api_router(state: &AppState) -> Router {
    let health = health::create_router(Arc::new(health::HealthState::new(
        Arc::clone(&state.store),
        Arc::clone(&state.cache),
    )));

    let metrics = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::clone(&state.cache));

    Router::new()
        .nest("/api/v1", api_routes(state))
        .merge(RouteLogging::Plain.apply(health))
        .merge(RouteLogging::Plain.apply(metrics))
        .layer(from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
}
