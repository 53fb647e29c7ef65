use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use polld_core::PollSignal;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events: SSE stream with one `done` or `cancelled` event per
/// finished poll cycle. Events carry no payload.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.poller.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        msg.ok().map(|signal| {
            let name = match signal {
                PollSignal::Done(_) => "done",
                PollSignal::Cancelled(_) => "cancelled",
            };
            Ok::<Event, Infallible>(Event::default().event(name).data(""))
        })
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
