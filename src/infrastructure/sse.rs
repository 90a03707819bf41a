// Server-sent event streaming of alert notifications
use crate::domain::alert::AlertEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Alerts addressed to `user_id`, until the broadcast channel closes or
/// `cancel` fires.
///
/// A slow subscriber that lags behind skips the dropped events and keeps
/// streaming.
pub fn user_alerts(
    mut rx: broadcast::Receiver<AlertEvent>,
    user_id: String,
    cancel: CancellationToken,
) -> impl Stream<Item = AlertEvent> + Send {
    async_stream::stream! {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                received = rx.recv() => Some(received),
            };
            let Some(received) = received else {
                tracing::debug!(user_id = %user_id, "Notification stream closed on shutdown");
                break;
            };
            match received {
                Ok(event) if event.user_id == user_id => yield event,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped, "Notification subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Wrap a receiver into an SSE response with keep-alive comments.
pub fn sse_from_receiver(
    rx: broadcast::Receiver<AlertEvent>,
    user_id: String,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    tracing::info!(user_id = %user_id, "Notification stream opened");
    let stream = user_alerts(rx, user_id, cancel).map(|event| Ok(to_sse_event(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &AlertEvent) -> Event {
    let base = Event::default().event("alert").id(event.id.to_string());
    match base.json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!("Failed to encode alert {}: {}", event.id, e);
            Event::default().event("error").data(event.message.clone())
        }
    }
}
