use anyhow::Result;
use futures::StreamExt;
use serde_json::json;
use test_utils::gemini_event;
use test_utils::gemini_sse_body;

use super::to_completion_request;
use super::Gemini;
use crate::domain::models::Backend;
use crate::domain::models::GenerationChunk;
use crate::domain::models::GenerationMessage;
use crate::domain::models::GenerationPart;
use crate::domain::models::GenerationRequest;
use crate::domain::models::ProtocolName;
use crate::domain::models::Role;
use crate::domain::models::ToolRequest;
use crate::domain::services::ToolRegistry;

const STREAM_PATH: &str = "/v1beta/models/model-1:streamGenerateContent?alt=sse&key=abc";

impl Gemini {
    fn with_url(url: String) -> Gemini {
        return Gemini {
            url,
            token: "abc".to_string(),
            model: "model-1".to_string(),
            timeout: "200".to_string(),
        };
    }
}

fn request() -> GenerationRequest {
    return GenerationRequest {
        system: "You are an expert UI generation agent.".to_string(),
        messages: vec![GenerationMessage {
            role: Role::User,
            content: vec![GenerationPart::Text("Show me a form".to_string())],
        }],
        tools: ToolRegistry::for_protocol(ProtocolName::A2ui).specs().to_vec(),
        temperature: Some(0.3),
    };
}

#[tokio::test]
async fn it_successfully_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1beta/models/model-1?key=abc")
        .with_status(200)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_ok());
    mock.assert_async().await;
}

#[tokio::test]
async fn it_fails_health_checks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1beta/models/model-1?key=abc")
        .with_status(500)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.health_check().await;

    assert!(res.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn it_fails_health_checks_without_a_token() {
    let backend = Gemini {
        token: "".to_string(),
        ..Gemini::with_url("http://localhost:1".to_string())
    };
    let res = backend.health_check().await;

    assert_eq!(res.unwrap_err().to_string(), "Gemini token is not defined");
}

#[test]
fn it_builds_completion_requests() {
    let req = to_completion_request(&GenerationRequest {
        system: "prompt".to_string(),
        messages: vec![
            GenerationMessage {
                role: Role::System,
                content: vec![GenerationPart::Text("Be brief.".to_string())],
            },
            GenerationMessage {
                role: Role::User,
                content: vec![
                    GenerationPart::Text("Look".to_string()),
                    GenerationPart::Media {
                        url: "data:image/png;base64,aGVsbG8=".to_string(),
                        content_type: Some("image/png".to_string()),
                    },
                    GenerationPart::Media {
                        url: "https://example.com/cat.png".to_string(),
                        content_type: None,
                    },
                ],
            },
            GenerationMessage {
                role: Role::Model,
                content: vec![GenerationPart::ToolRequest(ToolRequest::new(
                    "deleteSurface",
                    json!({ "surfaceId": "s1" }),
                ))],
            },
        ],
        tools: vec![],
        temperature: Some(0.5),
    });

    assert_eq!(
        serde_json::to_value(&req).unwrap(),
        json!({
            "systemInstruction": { "parts": [{ "text": "prompt" }, { "text": "Be brief." }] },
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        { "text": "Look" },
                        { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } },
                        { "fileData": { "fileUri": "https://example.com/cat.png" } }
                    ]
                },
                {
                    "role": "model",
                    "parts": [{ "functionCall": { "name": "deleteSurface", "args": { "surfaceId": "s1" } } }]
                }
            ],
            "tools": [],
            "generationConfig": { "temperature": 0.5 }
        })
    );
}

#[test]
fn it_declares_tools_as_json_schema() {
    let req = to_completion_request(&request());
    let value = serde_json::to_value(&req).unwrap();
    let declarations = value["tools"][0]["functionDeclarations"].as_array().unwrap();

    assert_eq!(declarations.len(), 4);
    assert_eq!(declarations[0]["name"], json!("updateSurface"));
    assert_eq!(
        declarations[0]["parametersJsonSchema"]["required"],
        json!(["surfaceId", "definition"])
    );
}

#[tokio::test]
async fn it_streams_text_and_tool_calls() -> Result<()> {
    let body = gemini_sse_body(&[
        gemini_event(json!([{ "text": "Building " }]), None),
        gemini_event(json!([{ "text": "thinking...", "thought": true }]), None),
        gemini_event(json!([{ "text": "done" }]), Some("STOP")),
    ]);

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", STREAM_PATH)
        .match_body(mockito::Matcher::PartialJson(json!({
            "generationConfig": { "temperature": 0.3 },
            "contents": [{ "role": "user", "parts": [{ "text": "Show me a form" }] }]
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let stream = backend.generate_stream(request()).await?;
    let chunks = stream
        .chunks
        .collect::<Vec<Result<GenerationChunk>>>()
        .await
        .into_iter()
        .collect::<Result<Vec<GenerationChunk>>>()?;
    let response = stream.response.await?;

    mock.assert_async().await;

    assert_eq!(
        chunks,
        vec![
            GenerationChunk {
                text: Some("Building ".to_string()),
                tool_requests: vec![],
            },
            GenerationChunk {
                text: Some("done".to_string()),
                tool_requests: vec![],
            },
        ]
    );
    assert_eq!(response.text, "Building done");
    assert!(response.tool_requests.is_empty());
    assert_eq!(response.finish_reason, Some("STOP".to_string()));

    return Ok(());
}

#[tokio::test]
async fn it_answers_tool_calls_and_keeps_generating() -> Result<()> {
    let first_turn = gemini_sse_body(&[
        gemini_event(json!([{ "text": "Building " }]), None),
        gemini_event(
            json!([{ "functionCall": { "name": "deleteSurface", "args": { "surfaceId": "s1" } } }]),
            Some("STOP"),
        ),
    ]);
    let second_turn = gemini_sse_body(&[gemini_event(json!([{ "text": "Done." }]), Some("STOP"))]);

    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", STREAM_PATH)
        .match_body(mockito::Matcher::PartialJson(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "Show me a form" }] }]
        })))
        .with_status(200)
        .with_body(first_turn)
        .create_async()
        .await;
    let second = server
        .mock("POST", STREAM_PATH)
        .match_body(mockito::Matcher::PartialJson(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "Show me a form" }] },
                {
                    "role": "model",
                    "parts": [
                        { "text": "Building " },
                        { "functionCall": { "name": "deleteSurface", "args": { "surfaceId": "s1" } } }
                    ]
                },
                {
                    "role": "user",
                    "parts": [{
                        "functionResponse": { "name": "deleteSurface", "response": { "status": "deleted" } }
                    }]
                }
            ]
        })))
        .with_status(200)
        .with_body(second_turn)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let stream = backend.generate_stream(request()).await?;
    let chunks = stream
        .chunks
        .collect::<Vec<Result<GenerationChunk>>>()
        .await
        .into_iter()
        .collect::<Result<Vec<GenerationChunk>>>()?;
    let response = stream.response.await?;

    first.assert_async().await;
    second.assert_async().await;

    assert_eq!(
        chunks,
        vec![
            GenerationChunk {
                text: Some("Building ".to_string()),
                tool_requests: vec![],
            },
            GenerationChunk {
                text: None,
                tool_requests: vec![ToolRequest::new(
                    "deleteSurface",
                    json!({ "surfaceId": "s1" })
                )],
            },
            GenerationChunk {
                text: Some("Done.".to_string()),
                tool_requests: vec![],
            },
        ]
    );
    assert_eq!(response.text, "Building Done.");
    assert_eq!(response.tool_requests.len(), 1);
    assert_eq!(response.finish_reason, Some("STOP".to_string()));

    return Ok(());
}

#[tokio::test]
async fn it_stops_after_the_maximum_number_of_tool_turns() -> Result<()> {
    let body = gemini_sse_body(&[gemini_event(
        json!([{ "functionCall": { "name": "launchRocket", "args": {} } }]),
        Some("STOP"),
    )]);

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_body(body)
        .expect(super::MAX_TOOL_TURNS)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let stream = backend.generate_stream(request()).await?;
    let chunks = stream
        .chunks
        .collect::<Vec<Result<GenerationChunk>>>()
        .await;
    let response = stream.response.await?;

    mock.assert_async().await;
    assert_eq!(chunks.len(), super::MAX_TOOL_TURNS);
    assert_eq!(response.tool_requests.len(), super::MAX_TOOL_TURNS);

    return Ok(());
}

#[tokio::test]
async fn it_fails_before_streaming_on_error_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", STREAM_PATH)
        .with_status(429)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let res = backend.generate_stream(request()).await;

    mock.assert_async().await;
    assert_eq!(
        res.err().unwrap().to_string(),
        "Failed to make completion request to Gemini, 429"
    );
}

#[tokio::test]
async fn it_ends_the_stream_on_error_events() -> Result<()> {
    let body = gemini_sse_body(&[
        gemini_event(json!([{ "text": "Hi" }]), None),
        json!({ "error": { "code": 500, "message": "Internal error", "status": "INTERNAL" } }),
    ]);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", STREAM_PATH)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let backend = Gemini::with_url(server.url());
    let stream = backend.generate_stream(request()).await?;
    let chunks = stream
        .chunks
        .collect::<Vec<Result<GenerationChunk>>>()
        .await;

    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].is_ok());
    assert_eq!(
        chunks[1].as_ref().unwrap_err().to_string(),
        "Gemini returned an error, 500: Internal error"
    );
    assert!(stream.response.await.is_err());

    return Ok(());
}
