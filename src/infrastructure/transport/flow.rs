#[cfg(test)]
#[path = "flow_test.rs"]
mod tests;

use anyhow::Result;
use async_stream::stream;
use axum::body::Bytes;
use axum::extract::Query;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;

use super::event_stream;
use super::AppState;
use crate::domain::models::ErrorKind;
use crate::domain::models::FlowError;
use crate::domain::models::GenerateUiRequest;
use crate::domain::models::GenerationResponse;
use crate::domain::models::ProtocolMessage;
use crate::domain::models::StartSessionRequest;
use crate::domain::services::FlowEvent;

#[derive(Debug, Deserialize)]
struct FlowEnvelope {
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    stream: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(err: &anyhow::Error) -> ErrorBody {
        return ErrorBody {
            status: ErrorKind::classify(err).to_string(),
            message: err.to_string(),
        };
    }
}

/// One SSE frame of a streamed `generateUi` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum FlowFrame {
    Message(ProtocolMessage),
    Result(GenerationResponse),
    Error(ErrorBody),
}

fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => return StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => return StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => return StatusCode::BAD_GATEWAY,
    }
}

pub fn error_response(err: &anyhow::Error) -> Response {
    let body = ErrorBody::from_error(err);
    tracing::warn!(status = body.status, reason = body.message, "Flow request failed");

    return (
        status_code(ErrorKind::classify(err)),
        Json(json!({ "error": body })),
    )
        .into_response();
}

fn parse_envelope(body: &[u8]) -> Result<Value> {
    let envelope = serde_json::from_slice::<FlowEnvelope>(body)
        .map_err(|err| return FlowError::Validation(format!("Invalid request body: {err}")))?;

    return Ok(envelope.data);
}

fn has_value(data: &Value, key: &str) -> bool {
    return data.get(key).map(|e| return !e.is_null()).unwrap_or(false);
}

fn parse_generate_request(data: Value) -> Result<GenerateUiRequest> {
    if !has_value(&data, "sessionId") && !has_value(&data, "catalog") {
        return Err(FlowError::MissingCatalog.into());
    }

    let request = serde_json::from_value::<GenerateUiRequest>(data)
        .map_err(|err| return FlowError::Validation(format!("Invalid request: {err}")))?;

    return Ok(request);
}

fn wants_stream(headers: &HeaderMap, params: &StreamParams) -> bool {
    if params.stream.as_deref() == Some("true") {
        return true;
    }

    return headers
        .get(header::ACCEPT)
        .and_then(|e| return e.to_str().ok())
        .map(|e| return e.contains("text/event-stream"))
        .unwrap_or(false);
}

pub async fn health() -> Json<Value> {
    return Json(json!({ "status": "ok" }));
}

pub async fn start_session(State(state): State<AppState>, body: Bytes) -> Response {
    let res = parse_envelope(&body).and_then(|data| {
        let request = serde_json::from_value::<StartSessionRequest>(data)
            .map_err(|err| return FlowError::Validation(format!("Invalid request: {err}")))?;
        return state.flows.start_session(request);
    });

    match res {
        Ok(session_id) => return Json(json!({ "result": session_id })).into_response(),
        Err(err) => return error_response(&err),
    }
}

pub async fn generate_ui(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_envelope(&body).and_then(parse_generate_request) {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };

    if !wants_stream(&headers, &params) {
        match state.flows.generate_all(request).await {
            Ok((messages, response)) => {
                return Json(json!({
                    "result": { "messages": messages, "response": response }
                }))
                .into_response();
            }
            Err(err) => return error_response(&err),
        }
    }

    let mut events = match state.flows.generate(request).await {
        Ok(events) => events,
        Err(err) => return error_response(&err),
    };

    let stream = stream! {
        while let Some(event) = events.next().await {
            match event {
                Ok(FlowEvent::Message(message)) => {
                    yield Event::default().json_data(FlowFrame::Message(message));
                }
                Ok(FlowEvent::Complete(response)) => {
                    yield Event::default().json_data(FlowFrame::Result(response));
                }
                Err(err) => {
                    let body = ErrorBody::from_error(&err);
                    tracing::warn!(status = body.status, reason = body.message, "Flow stream failed");
                    yield Event::default().json_data(FlowFrame::Error(body));
                    return;
                }
            }
        }
    };

    return event_stream(stream);
}
