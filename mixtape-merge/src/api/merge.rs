//! POST /sessions/:owner_id/merge - start a merge and stream its events (SSE)
//!
//! Precondition failures (`INSUFFICIENT_ITEMS`, `ALREADY_IN_PROGRESS`) are
//! returned as plain JSON errors before the stream opens. Once streaming, the
//! job runs to completion even if the client disconnects.

use crate::{error::ApiResult, models::OwnerId, AppState};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

pub async fn start_merge(
    State(state): State<AppState>,
    Path(owner_id): Path<OwnerId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let run = state
        .orchestrator
        .run_merge(owner_id, state.sink.clone())?;
    let job_id = run.job_id;
    let mut events = run.events;

    info!(owner_id, job_id = %job_id, "Merge stream opened");

    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            let event_type = event.event_type();
            match serde_json::to_string(&event) {
                Ok(json) => {
                    debug!(job_id = %job_id, event = event_type, "SSE: job event");
                    yield Ok(Event::default().event(event_type).data(json));
                }
                Err(e) => warn!("SSE: Failed to serialize job event {}: {}", event_type, e),
            }
        }
        debug!(job_id = %job_id, "SSE: job stream finished");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

/// Build merge routes
pub fn merge_routes() -> Router<AppState> {
    Router::new().route("/sessions/:owner_id/merge", post(start_merge))
}
