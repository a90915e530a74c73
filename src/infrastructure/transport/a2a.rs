#[cfg(test)]
#[path = "a2a_test.rs"]
mod tests;

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_stream::stream;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::Event;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use dashmap::DashMap;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;
use uuid::Uuid;

use super::event_stream;
use super::AppState;
use crate::domain::models::CatalogSource;
use crate::domain::models::ErrorKind;
use crate::domain::models::FlowError;
use crate::domain::models::GenerateUiRequest;
use crate::domain::models::ProtocolMessage;
use crate::domain::models::ProtocolName;
use crate::domain::services::FlowEvent;

const JSONRPC_VERSION: &str = "2.0";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const TASK_NOT_FOUND: i32 = -32001;

const MAX_TASKS: usize = 1000;

pub type Metadata = serde_json::Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
}

/// Discovery document served at `/.well-known/agent-card.json`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub protocol_version: String,
    pub version: String,
    pub url: String,
    pub skills: Vec<AgentSkill>,
    pub capabilities: AgentCapabilities,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
}

impl AgentCard {
    /// Card advertising the protocol flavor the server streams.
    pub fn new(url: &str, protocol: ProtocolName) -> AgentCard {
        let modes = vec!["text/plain".to_string(), "application/json".to_string()];
        let label = match protocol {
            ProtocolName::A2ui => "A2UI",
            ProtocolName::Gulf => "GULF",
        };

        return AgentCard {
            name: format!("{label} Genkit Server"),
            description: format!("An agent that generates UIs using the {label} protocol."),
            protocol_version: "0.3.0".to_string(),
            version: "1.0.0".to_string(),
            url: url.to_string(),
            skills: vec![AgentSkill {
                id: format!("{protocol}-chat"),
                name: format!("{label} Chat"),
                description: "Generates a UI based on a chat conversation.".to_string(),
                tags: vec!["chat".to_string()],
            }],
            capabilities: AgentCapabilities { streaming: true },
            default_input_modes: modes.clone(),
            default_output_modes: modes,
        };
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcResponse<'a, T: serde::Serialize> {
    jsonrpc: &'static str,
    id: &'a Value,
    result: T,
}

#[derive(Serialize)]
struct JsonRpcErrorResponse<'a> {
    jsonrpc: &'static str,
    id: &'a Value,
    error: JsonRpcError,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    fn new(code: i32, message: &str) -> JsonRpcError {
        return JsonRpcError {
            code,
            message: message.to_string(),
        };
    }

    fn from_error(err: &anyhow::Error) -> JsonRpcError {
        let code = match ErrorKind::classify(err) {
            ErrorKind::InvalidArgument | ErrorKind::NotFound => INVALID_PARAMS,
            ErrorKind::Unavailable => INTERNAL_ERROR,
        };

        return JsonRpcError::new(code, &err.to_string());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A2aRole {
    User,
    Agent,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum A2aPart {
    Text { text: String },
    Data { data: Value },
    File { file: FileContent },
}

fn message_kind() -> String {
    return "message".to_string();
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aMessage {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub message_id: String,
    pub role: A2aRole,
    pub parts: Vec<A2aPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl A2aMessage {
    fn agent(parts: Vec<A2aPart>, context_id: &str, task_id: Option<&str>) -> A2aMessage {
        return A2aMessage {
            kind: message_kind(),
            message_id: Uuid::new_v4().to_string(),
            role: A2aRole::Agent,
            parts,
            context_id: Some(context_id.to_string()),
            task_id: task_id.map(|e| return e.to_string()),
            metadata: None,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MessageSendParams {
    pub message: A2aMessage,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct TaskIdParams {
    id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<A2aMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub kind: &'static str,
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    pub history: Vec<A2aMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    pub kind: &'static str,
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Result payload of a single `message/stream` event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Task(Task),
    StatusUpdate(TaskStatusUpdateEvent),
}

/// Events recorded per streamed task, replayed on `tasks/resubscribe`. Only
/// the most recently started tasks are kept.
pub struct TaskStore {
    tasks: DashMap<String, Vec<StreamEvent>>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for TaskStore {
    fn default() -> TaskStore {
        return TaskStore::with_capacity(MAX_TASKS);
    }
}

impl TaskStore {
    pub fn with_capacity(capacity: usize) -> TaskStore {
        return TaskStore {
            tasks: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
        };
    }

    /// Registers a task with its first event, evicting the oldest tasks past
    /// the capacity.
    pub fn start(&self, task_id: &str, event: StreamEvent) {
        self.tasks.insert(task_id.to_string(), vec![event]);

        let mut order = self.order.lock().unwrap_or_else(|e| return e.into_inner());
        order.push_back(task_id.to_string());
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                tracing::debug!(task_id = evicted, "Evicting A2A task");
                self.tasks.remove(&evicted);
            }
        }
    }

    /// Appends to a started task. Events of evicted tasks are dropped.
    pub fn record(&self, task_id: &str, event: StreamEvent) {
        if let Some(mut events) = self.tasks.get_mut(task_id) {
            events.push(event);
        }
    }

    pub fn events(&self, task_id: &str) -> Option<Vec<StreamEvent>> {
        return self.tasks.get(task_id).map(|e| return e.value().clone());
    }
}

struct TaskIds {
    task_id: String,
    context_id: String,
}

impl TaskIds {
    fn submitted(&self, message: A2aMessage) -> StreamEvent {
        return StreamEvent::Task(Task {
            kind: "task",
            id: self.task_id.to_string(),
            context_id: self.context_id.to_string(),
            status: TaskStatus {
                state: TaskState::Submitted,
                message: None,
            },
            history: vec![message],
        });
    }

    fn update(&self, state: TaskState, parts: Vec<A2aPart>, is_final: bool) -> StreamEvent {
        let message = if parts.is_empty() {
            None
        } else {
            Some(A2aMessage::agent(
                parts,
                &self.context_id,
                Some(&self.task_id),
            ))
        };

        return StreamEvent::StatusUpdate(TaskStatusUpdateEvent {
            kind: "status-update",
            task_id: self.task_id.to_string(),
            context_id: self.context_id.to_string(),
            status: TaskStatus { state, message },
            is_final,
        });
    }

    fn from_flow_event(&self, event: Result<FlowEvent>) -> StreamEvent {
        let res = event.and_then(|event| match event {
            FlowEvent::Message(message) => {
                return Ok(self.update(TaskState::Working, vec![data_part(&message)?], false));
            }
            FlowEvent::Complete(_) => return Ok(self.update(TaskState::Completed, vec![], true)),
        });

        match res {
            Ok(update) => return update,
            Err(err) => {
                tracing::warn!(task_id = self.task_id, error = ?err, "A2A task failed");
                return self.update(
                    TaskState::Failed,
                    vec![A2aPart::Text {
                        text: err.to_string(),
                    }],
                    true,
                );
            }
        }
    }
}

fn data_part(message: &ProtocolMessage) -> Result<A2aPart> {
    return Ok(A2aPart::Data {
        data: serde_json::to_value(message)?,
    });
}

fn to_client_part(part: &A2aPart) -> Value {
    match part {
        A2aPart::Text { text } => return json!({ "type": "text", "text": text }),
        A2aPart::Data { data } => return data.clone(),
        A2aPart::File { file } => {
            let mut image = json!({ "type": "image" });
            if let Some(uri) = &file.uri {
                image["url"] = json!(uri);
            }
            if let Some(bytes) = &file.bytes {
                image["base64"] = json!(bytes);
            }
            if let Some(mime_type) = &file.mime_type {
                image["mimeType"] = json!(mime_type);
            }
            return image;
        }
    }
}

fn metadata_value<'a>(params: &'a MessageSendParams, key: &str) -> Option<&'a Value> {
    return [params.metadata.as_ref(), params.message.metadata.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|e| return e.get(key).filter(|value| return !value.is_null()));
}

/// Binds an A2A message to a single-turn user conversation. The catalog comes
/// from a `sessionId` or `catalog` metadata entry.
pub fn to_generate_request(params: &MessageSendParams) -> Result<GenerateUiRequest> {
    let source = if let Some(session_id) = metadata_value(params, "sessionId") {
        match session_id.as_str() {
            Some(session_id) => CatalogSource::Session {
                session_id: session_id.to_string(),
            },
            None => {
                return Err(FlowError::Validation(
                    "metadata.sessionId: Expected string".to_string(),
                )
                .into());
            }
        }
    } else if let Some(catalog) = metadata_value(params, "catalog") {
        CatalogSource::Inline {
            catalog: catalog.clone(),
        }
    } else {
        return Err(FlowError::MissingCatalog.into());
    };

    let parts = params
        .message
        .parts
        .iter()
        .map(to_client_part)
        .collect::<Vec<Value>>();

    return Ok(GenerateUiRequest {
        source,
        conversation: json!([{ "role": "user", "parts": parts }]),
    });
}

fn reply<T: serde::Serialize>(id: &Value, result: T) -> Response {
    return Json(JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result,
    })
    .into_response();
}

fn error_reply(id: &Value, error: JsonRpcError) -> Response {
    tracing::warn!(code = error.code, reason = error.message, "A2A request failed");

    return Json(JsonRpcErrorResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        error,
    })
    .into_response();
}

fn event(id: &Value, result: &StreamEvent) -> Result<Event, axum::Error> {
    return Event::default().json_data(JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION,
        id,
        result,
    });
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, JsonRpcError> {
    return serde_json::from_value::<T>(params.clone()).map_err(|err| {
        return JsonRpcError::new(INVALID_PARAMS, &format!("Invalid params: {err}"));
    });
}

pub async fn agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    return Json(state.agent_card.as_ref().clone());
}

pub async fn handle(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<JsonRpcRequest>(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_reply(
                &Value::Null,
                JsonRpcError::new(PARSE_ERROR, &format!("Parse error: {err}")),
            );
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return error_reply(
            &request.id,
            JsonRpcError::new(INVALID_REQUEST, "Invalid Request: jsonrpc must be \"2.0\""),
        );
    }

    tracing::debug!(method = request.method, "A2A request");
    match request.method.as_str() {
        "message/send" => return send_message(&state, request).await,
        "message/stream" => return stream_message(&state, request).await,
        "tasks/resubscribe" => return resubscribe(&state, request),
        method => {
            return error_reply(
                &request.id,
                JsonRpcError::new(METHOD_NOT_FOUND, &format!("Method not found: {method}")),
            );
        }
    }
}

async fn run_to_message(state: &AppState, params: &MessageSendParams) -> Result<A2aMessage> {
    let request = to_generate_request(params)?;
    let (messages, _) = state.flows.generate_all(request).await?;
    let parts = messages
        .iter()
        .map(data_part)
        .collect::<Result<Vec<A2aPart>>>()?;

    let context_id = params
        .message
        .context_id
        .clone()
        .unwrap_or_else(|| return Uuid::new_v4().to_string());

    return Ok(A2aMessage::agent(parts, &context_id, None));
}

async fn send_message(state: &AppState, request: JsonRpcRequest) -> Response {
    let params = match parse_params::<MessageSendParams>(&request.params) {
        Ok(params) => params,
        Err(err) => return error_reply(&request.id, err),
    };

    match run_to_message(state, &params).await {
        Ok(message) => return reply(&request.id, message),
        Err(err) => return error_reply(&request.id, JsonRpcError::from_error(&err)),
    }
}

async fn stream_message(state: &AppState, request: JsonRpcRequest) -> Response {
    let params = match parse_params::<MessageSendParams>(&request.params) {
        Ok(params) => params,
        Err(err) => return error_reply(&request.id, err),
    };

    let generate = match to_generate_request(&params) {
        Ok(generate) => generate,
        Err(err) => return error_reply(&request.id, JsonRpcError::from_error(&err)),
    };

    let mut events = match state.flows.generate(generate).await {
        Ok(events) => events,
        Err(err) => return error_reply(&request.id, JsonRpcError::from_error(&err)),
    };

    let ids = TaskIds {
        task_id: Uuid::new_v4().to_string(),
        context_id: params
            .message
            .context_id
            .clone()
            .unwrap_or_else(|| return Uuid::new_v4().to_string()),
    };
    tracing::info!(task_id = ids.task_id, "Streaming A2A task");

    let tasks = state.tasks.clone();
    let id = request.id;
    let stream = stream! {
        let submitted = ids.submitted(params.message);
        tasks.start(&ids.task_id, submitted.clone());
        yield event(&id, &submitted);

        while let Some(flow_event) = events.next().await {
            let update = ids.from_flow_event(flow_event);
            tasks.record(&ids.task_id, update.clone());
            yield event(&id, &update);

            if let StreamEvent::StatusUpdate(TaskStatusUpdateEvent { is_final: true, .. }) = update {
                return;
            }
        }
    };

    return event_stream(stream);
}

fn resubscribe(state: &AppState, request: JsonRpcRequest) -> Response {
    let params = match parse_params::<TaskIdParams>(&request.params) {
        Ok(params) => params,
        Err(err) => return error_reply(&request.id, err),
    };

    let events = match state.tasks.events(&params.id) {
        Some(events) => events,
        None => {
            return error_reply(
                &request.id,
                JsonRpcError::new(TASK_NOT_FOUND, "Task not found"),
            );
        }
    };

    tracing::info!(task_id = params.id, events = events.len(), "Replaying A2A task");
    let id = request.id;
    let stream = stream! {
        for recorded in events.iter() {
            yield event(&id, recorded);
        }
    };

    return event_stream(stream);
}
