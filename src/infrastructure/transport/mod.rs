pub mod a2a;
pub mod flow;

use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use futures::Stream;

use crate::domain::services::UiFlows;

#[derive(Clone)]
pub struct AppState {
    pub flows: Arc<UiFlows>,
    pub tasks: Arc<a2a::TaskStore>,
    pub agent_card: Arc<a2a::AgentCard>,
}

impl AppState {
    pub fn new(flows: UiFlows, agent_card: a2a::AgentCard) -> AppState {
        return AppState {
            flows: Arc::new(flows),
            tasks: Arc::new(a2a::TaskStore::default()),
            agent_card: Arc::new(agent_card),
        };
    }
}

pub fn router(state: AppState) -> Router {
    return Router::new()
        .route("/startSession", post(flow::start_session))
        .route("/generateUi", post(flow::generate_ui))
        .route("/health", get(flow::health))
        .route("/.well-known/agent-card.json", get(a2a::agent_card))
        .route("/a2a", post(a2a::handle))
        .with_state(state);
}

/// Wraps a stream of events into an SSE response with periodic keep-alives.
pub fn event_stream<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, axum::Error>> + Send + 'static,
{
    return Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();
}
