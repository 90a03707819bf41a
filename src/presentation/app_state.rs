// Application state for HTTP handlers
use crate::application::ingest_service::IngestService;
use crate::infrastructure::dispatcher::BroadcastDispatcher;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub ingest_service: IngestService,
    /// Source for the notification SSE stream.
    pub notifications: BroadcastDispatcher,
    /// Fires on server shutdown and ends open notification streams.
    pub shutdown: CancellationToken,
}
