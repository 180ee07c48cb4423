//! Server-Sent Events relay of session lifecycle events

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::web::AppState;

/// Subscribe to `started`, `running`, `stopped` and `failed` events
#[utoipa::path(
    get,
    path = "/events",
    tag = "streams",
    responses((status = 200, description = "SSE stream of session events", content_type = "text/event-stream")),
    security(("bearer" = []))
)]
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Event stream subscriber connected");
    let receiver = state.supervisor.subscribe();

    let stream = BroadcastStream::new(receiver)
        // Lagged subscribers just miss events
        .filter_map(|result| async move { result.ok() })
        .filter_map(|event| async move {
            Event::default()
                .event(event.kind.as_str())
                .json_data(&event)
                .ok()
                .map(Ok)
        })
        .take_until(state.shutdown.cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
