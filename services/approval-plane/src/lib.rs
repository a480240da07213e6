//! Approval Plane
//!
//! Human-in-the-loop gate for the announcement pipeline: a persistent
//! ticket store with atomic PENDING -> APPROVED/REJECTED transitions and
//! the HTTP API the approval UI consumes.

pub mod db;
pub mod handlers;
pub mod models;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use db::Db;
pub use models::*;
pub use store::{MemoryTicketStore, PgTicketStore, ResolveOutcome, StoreError, TicketStore};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }
}

/// Build the API router
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/pending", get(handlers::list_pending))
        .route("/approve", post(handlers::approve))
        .route("/history", get(handlers::history))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
