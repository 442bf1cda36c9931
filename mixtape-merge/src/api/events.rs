//! GET /events - service events over SSE
//!
//! `?owner_id=N` narrows the stream to one owner's sessions and jobs.

use crate::{models::OwnerId, AppState};
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub owner_id: Option<OwnerId>,
}

pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(owner_id = ?filter.owner_id, "Event stream subscriber connected");

    let mut rx = state.event_bus.subscribe();
    let owner = filter.owner_id;

    let stream = async_stream::stream! {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream subscriber lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!("Event bus closed, ending stream");
                    break;
                }
            };

            if owner.is_some_and(|id| !event.concerns_owner(id)) {
                continue;
            }

            let name = event.event_type().to_string();
            match Event::default().event(&name).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!(event = %name, error = %e, "Dropping unserializable event"),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
