//! mixtape-merge library interface
//!
//! Exposes the merge pipeline and the HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod deadline;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod session;
pub mod source;
pub mod transcode;

pub use crate::error::{ApiError, ApiResult, MergeError, MergeResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mixtape_common::events::EventBus;
use orchestrator::{Orchestrator, OutputSink};
use session::SessionStore;
use source::ResourceLedger;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<SessionStore>,
    /// Receives finished outputs of jobs started over HTTP
    pub sink: Arc<dyn OutputSink>,
    pub event_bus: EventBus,
    pub ledger: Arc<ResourceLedger>,
    /// Directory served at `/outbox`
    pub outbox_dir: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        sink: Arc<dyn OutputSink>,
        ledger: Arc<ResourceLedger>,
        outbox_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store: Arc::clone(orchestrator.store()),
            event_bus: orchestrator.event_bus().clone(),
            orchestrator,
            sink,
            ledger,
            outbox_dir: outbox_dir.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let outbox = ServeDir::new(&state.outbox_dir);

    Router::new()
        .merge(api::session_routes())
        .merge(api::merge_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .nest_service("/outbox", outbox)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
