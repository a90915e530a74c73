use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use serde_json::json;
use serde_json::Value;
use test_utils::catalog_fixture;
use test_utils::sse_data;
use tower::ServiceExt;

use super::to_generate_request;
use super::AgentCard;
use super::MessageSendParams;
use super::TaskIds;
use super::TaskState;
use super::TaskStore;
use crate::domain::models::CatalogSource;
use crate::domain::models::GenerationChunk;
use crate::domain::models::ProtocolName;
use crate::domain::models::ToolRequest;
use crate::domain::services::FlowSettings;
use crate::domain::services::SessionStore;
use crate::domain::services::UiFlows;
use crate::infrastructure::backends::scripted::Failure;
use crate::infrastructure::backends::scripted::ScriptedBackend;
use crate::infrastructure::transport::router;
use crate::infrastructure::transport::AppState;

fn app(backend: ScriptedBackend) -> Router {
    return app_with_sessions(backend, Arc::new(SessionStore::default()));
}

fn app_with_sessions(backend: ScriptedBackend, sessions: Arc<SessionStore>) -> Router {
    let flows = UiFlows::new(Box::new(backend), sessions, FlowSettings::default());
    return router(AppState::new(
        flows,
        AgentCard::new("http://localhost:10002/a2a", ProtocolName::A2ui),
    ));
}

fn surface_backend() -> ScriptedBackend {
    return ScriptedBackend::new(vec![GenerationChunk {
        text: None,
        tool_requests: vec![ToolRequest::new(
            "updateSurface",
            json!({
                "surfaceId": "s1",
                "definition": { "root": "w1", "components": [{ "id": "w1", "component": {} }] }
            }),
        )],
    }]);
}

fn user_message(metadata: Value) -> Value {
    return json!({
        "kind": "message",
        "messageId": "m1",
        "role": "user",
        "contextId": "ctx-1",
        "parts": [{ "kind": "text", "text": "Show me a form" }],
        "metadata": metadata
    });
}

fn rpc(method: &str, params: Value) -> Request<Body> {
    return Request::builder()
        .method("POST")
        .uri("/a2a")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 7, "method": method, "params": params }).to_string(),
        ))
        .unwrap();
}

async fn send(app: Router, req: Request<Body>) -> Result<String> {
    let res = app.oneshot(req).await?;
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await?;

    return Ok(String::from_utf8(bytes.to_vec())?);
}

async fn send_json(app: Router, req: Request<Body>) -> Result<Value> {
    return Ok(serde_json::from_str(&send(app, req).await?)?);
}

#[tokio::test]
async fn it_serves_the_agent_card() -> Result<()> {
    let req = Request::builder()
        .uri("/.well-known/agent-card.json")
        .body(Body::empty())
        .unwrap();
    let card = send_json(app(ScriptedBackend::new(vec![])), req).await?;

    assert_eq!(card["name"], "A2UI Genkit Server");
    assert_eq!(card["protocolVersion"], "0.3.0");
    assert_eq!(card["url"], "http://localhost:10002/a2a");
    assert_eq!(card["capabilities"], json!({ "streaming": true }));
    assert_eq!(card["skills"][0]["id"], "a2ui-chat");
    assert_eq!(card["skills"][0]["tags"], json!(["chat"]));
    assert_eq!(card["defaultInputModes"][0], "text/plain");

    return Ok(());
}

#[test]
fn it_advertises_the_configured_protocol() -> Result<()> {
    let card = serde_json::to_value(AgentCard::new(
        "http://localhost:10002/a2a",
        ProtocolName::Gulf,
    ))?;

    assert_eq!(card["name"], "GULF Genkit Server");
    assert_eq!(
        card["description"],
        "An agent that generates UIs using the GULF protocol."
    );
    assert_eq!(card["skills"][0]["id"], "gulf-chat");
    assert_eq!(card["skills"][0]["name"], "GULF Chat");

    return Ok(());
}

#[test]
fn it_evicts_the_oldest_tasks_past_capacity() {
    let store = TaskStore::with_capacity(2);
    for task_id in ["t1", "t2", "t3"] {
        let ids = TaskIds {
            task_id: task_id.to_string(),
            context_id: "ctx-1".to_string(),
        };
        store.start(task_id, ids.update(TaskState::Working, vec![], false));
        store.record(task_id, ids.update(TaskState::Completed, vec![], true));
    }

    assert!(store.events("t1").is_none());
    assert_eq!(store.events("t2").map(|e| return e.len()), Some(2));
    assert_eq!(store.events("t3").map(|e| return e.len()), Some(2));

    let evicted = TaskIds {
        task_id: "t1".to_string(),
        context_id: "ctx-1".to_string(),
    };
    store.record("t1", evicted.update(TaskState::Completed, vec![], true));
    assert!(store.events("t1").is_none());
}

#[test]
fn it_binds_message_parts_to_a_user_conversation() -> Result<()> {
    let params = serde_json::from_value::<MessageSendParams>(json!({
        "message": {
            "messageId": "m1",
            "role": "user",
            "parts": [
                { "kind": "text", "text": "Hello" },
                { "kind": "data", "data": { "type": "uiEvent", "event": { "surfaceId": "s1" } } },
                { "kind": "file", "file": { "uri": "https://example.com/cat.png", "mimeType": "image/png" } },
                { "kind": "file", "file": { "bytes": "aGVsbG8=", "mimeType": "image/png" } }
            ],
            "metadata": { "catalog": { "from": "message" } }
        },
        "metadata": { "sessionId": "abc" }
    }))?;

    let request = to_generate_request(&params)?;
    assert_eq!(
        request.source,
        CatalogSource::Session {
            session_id: "abc".to_string()
        }
    );
    assert_eq!(
        request.conversation,
        json!([{
            "role": "user",
            "parts": [
                { "type": "text", "text": "Hello" },
                { "type": "uiEvent", "event": { "surfaceId": "s1" } },
                { "type": "image", "url": "https://example.com/cat.png", "mimeType": "image/png" },
                { "type": "image", "base64": "aGVsbG8=", "mimeType": "image/png" }
            ]
        }])
    );

    return Ok(());
}

#[test]
fn it_falls_back_to_message_metadata_for_the_catalog() -> Result<()> {
    let params = serde_json::from_value::<MessageSendParams>(json!({
        "message": user_message(json!({ "catalog": catalog_fixture() }))
    }))?;

    let request = to_generate_request(&params)?;
    assert_eq!(
        request.source,
        CatalogSource::Inline {
            catalog: catalog_fixture()
        }
    );

    return Ok(());
}

#[tokio::test]
async fn it_sends_a_message_and_returns_data_parts() -> Result<()> {
    let body = send_json(
        app(surface_backend()),
        rpc(
            "message/send",
            json!({ "message": user_message(json!({ "catalog": catalog_fixture() })) }),
        ),
    )
    .await?;

    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 7);
    let result = &body["result"];
    assert_eq!(result["kind"], "message");
    assert_eq!(result["role"], "agent");
    assert_eq!(result["contextId"], "ctx-1");
    assert_eq!(result["parts"][0]["kind"], "data");
    assert_eq!(result["parts"][0]["data"]["surfaceUpdate"]["surfaceId"], "s1");
    assert_eq!(result["parts"][1]["data"]["beginRendering"]["root"], "w1");

    return Ok(());
}

#[tokio::test]
async fn it_sends_a_message_against_a_session() -> Result<()> {
    let sessions = Arc::new(SessionStore::default());
    let session_id = sessions.start(catalog_fixture());

    let body = send_json(
        app_with_sessions(surface_backend(), sessions),
        rpc(
            "message/send",
            json!({
                "message": user_message(Value::Null),
                "metadata": { "sessionId": session_id }
            }),
        ),
    )
    .await?;

    assert_eq!(body["result"]["parts"].as_array().unwrap().len(), 2);

    return Ok(());
}

#[tokio::test]
async fn it_maps_flow_errors_to_json_rpc_codes() -> Result<()> {
    let body = send_json(
        app(ScriptedBackend::new(vec![])),
        rpc("message/send", json!({ "message": user_message(Value::Null) })),
    )
    .await?;
    assert_eq!(
        body["error"],
        json!({ "code": -32602, "message": "No catalog provided in the request." })
    );

    let body = send_json(
        app(ScriptedBackend::new(vec![])),
        rpc(
            "message/send",
            json!({ "message": user_message(json!({ "sessionId": "missing" })) }),
        ),
    )
    .await?;
    assert_eq!(
        body["error"],
        json!({ "code": -32602, "message": "Invalid session ID: missing" })
    );

    let body = send_json(
        app(ScriptedBackend::failing(Failure::OnStart, vec![])),
        rpc(
            "message/send",
            json!({ "message": user_message(json!({ "catalog": catalog_fixture() })) }),
        ),
    )
    .await?;
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(
        body["error"]["message"],
        "Failed to make completion request to Gemini, 503"
    );

    return Ok(());
}

#[tokio::test]
async fn it_rejects_unknown_methods_and_bad_params() -> Result<()> {
    let body = send_json(app(ScriptedBackend::new(vec![])), rpc("tasks/cancel", json!({}))).await?;
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 7);

    let body = send_json(
        app(ScriptedBackend::new(vec![])),
        rpc("message/send", json!({ "message": "hello" })),
    )
    .await?;
    assert_eq!(body["error"]["code"], -32602);

    let req = Request::builder()
        .method("POST")
        .uri("/a2a")
        .body(Body::from("{not json"))
        .unwrap();
    let body = send_json(app(ScriptedBackend::new(vec![])), req).await?;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    return Ok(());
}

#[tokio::test]
async fn it_streams_task_updates_and_replays_them() -> Result<()> {
    let app = app(surface_backend());
    let body = send(
        app.clone(),
        rpc(
            "message/stream",
            json!({ "message": user_message(json!({ "catalog": catalog_fixture() })) }),
        ),
    )
    .await?;

    let events = sse_data(&body);
    let states = events
        .iter()
        .map(|e| {
            return e["result"]["status"]["state"]
                .as_str()
                .unwrap_or_default()
                .to_string();
        })
        .collect::<Vec<String>>();
    assert_eq!(states, vec!["submitted", "working", "working", "completed"]);

    let task = &events[0]["result"];
    assert_eq!(task["kind"], "task");
    assert_eq!(task["contextId"], "ctx-1");
    assert_eq!(task["history"][0]["messageId"], "m1");

    let working = &events[1]["result"];
    assert_eq!(working["kind"], "status-update");
    assert_eq!(working["final"], false);
    assert_eq!(
        working["status"]["message"]["parts"][0]["data"]["surfaceUpdate"]["surfaceId"],
        "s1"
    );
    assert_eq!(events[3]["result"]["final"], true);
    assert!(events.iter().all(|e| return e["id"] == 7));

    let task_id = task["id"].as_str().unwrap();
    let replayed = send(app, rpc("tasks/resubscribe", json!({ "id": task_id }))).await?;
    assert_eq!(sse_data(&replayed), events);

    return Ok(());
}

#[tokio::test]
async fn it_fails_the_task_when_the_stream_breaks() -> Result<()> {
    let body = send(
        app(ScriptedBackend::failing(Failure::AfterChunks, vec![])),
        rpc(
            "message/stream",
            json!({ "message": user_message(json!({ "catalog": catalog_fixture() })) }),
        ),
    )
    .await?;

    let events = sse_data(&body);
    let last = &events.last().unwrap()["result"];
    assert_eq!(last["status"]["state"], "failed");
    assert_eq!(last["final"], true);
    assert_eq!(
        last["status"]["message"]["parts"][0],
        json!({ "kind": "text", "text": "Gemini stream was interrupted" })
    );

    return Ok(());
}

#[tokio::test]
async fn it_reports_unknown_tasks_on_resubscribe() -> Result<()> {
    let body = send_json(
        app(ScriptedBackend::new(vec![])),
        rpc("tasks/resubscribe", json!({ "id": "missing" })),
    )
    .await?;

    assert_eq!(
        body["error"],
        json!({ "code": -32001, "message": "Task not found" })
    );

    return Ok(());
}
