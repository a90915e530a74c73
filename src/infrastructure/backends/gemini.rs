#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use futures::FutureExt;
use futures::StreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::GenerationChunk;
use crate::domain::models::GenerationMessage;
use crate::domain::models::GenerationPart;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResponse;
use crate::domain::models::GenerationStream;
use crate::domain::models::Role;
use crate::domain::models::ToolRequest;
use crate::domain::models::ToolSpec;

const MAX_TOOL_TURNS: usize = 8;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    file_uri: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters_json_schema: Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

fn parse_data_url(url: &str) -> Option<Blob> {
    let (mime_type, data) = url.strip_prefix("data:")?.split_once(";base64,")?;
    return Some(Blob {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    });
}

fn to_content_part(part: &GenerationPart) -> ContentPart {
    match part {
        GenerationPart::Text(text) => {
            return ContentPart {
                text: Some(text.to_string()),
                ..ContentPart::default()
            };
        }
        GenerationPart::Media { url, content_type } => {
            if let Some(blob) = parse_data_url(url) {
                return ContentPart {
                    inline_data: Some(blob),
                    ..ContentPart::default()
                };
            }
            return ContentPart {
                file_data: Some(FileData {
                    mime_type: content_type.clone(),
                    file_uri: url.to_string(),
                }),
                ..ContentPart::default()
            };
        }
        GenerationPart::ToolRequest(request) => return function_call_part(request),
    }
}

fn to_content(message: &GenerationMessage) -> Content {
    let role = match message.role {
        Role::Model => "model",
        _ => "user",
    };

    return Content {
        role: Some(role.to_string()),
        parts: message.content.iter().map(to_content_part).collect(),
    };
}

/// System role messages have no slot in `contents` and are folded into the
/// system instruction after the prompt.
fn to_completion_request(request: &GenerationRequest) -> CompletionRequest {
    let mut system_parts = vec![ContentPart {
        text: Some(request.system.to_string()),
        ..ContentPart::default()
    }];
    let mut contents: Vec<Content> = vec![];

    for message in request.messages.iter() {
        if message.role == Role::System {
            system_parts.extend(message.content.iter().map(to_content_part));
            continue;
        }
        contents.push(to_content(message));
    }

    let function_declarations = request
        .tools
        .iter()
        .map(|tool| {
            return FunctionDeclaration {
                name: tool.name.to_string(),
                description: tool.description.to_string(),
                parameters_json_schema: tool.input_schema.clone(),
            };
        })
        .collect::<Vec<FunctionDeclaration>>();

    let mut tools = vec![];
    if !function_declarations.is_empty() {
        tools.push(Tool {
            function_declarations,
        });
    }

    return CompletionRequest {
        system_instruction: Content {
            role: None,
            parts: system_parts,
        },
        contents,
        tools,
        generation_config: GenerationConfig {
            temperature: request.temperature,
        },
    };
}

fn function_call_part(request: &ToolRequest) -> ContentPart {
    return ContentPart {
        function_call: Some(FunctionCall {
            name: request.name.to_string(),
            args: request.input.clone(),
        }),
        ..ContentPart::default()
    };
}

/// The model's side of a finished tool turn followed by the acknowledgement
/// of every call it made.
fn tool_turn(turn: &GenerationResponse, tools: &[ToolSpec]) -> Vec<Content> {
    let mut calls = vec![];
    if !turn.text.is_empty() {
        calls.push(ContentPart {
            text: Some(turn.text.to_string()),
            ..ContentPart::default()
        });
    }
    calls.extend(turn.tool_requests.iter().map(function_call_part));

    let responses = turn
        .tool_requests
        .iter()
        .map(|request| {
            let response = match tools.iter().find(|e| return e.name.to_string() == request.name) {
                Some(spec) => spec.acknowledge(&request.input),
                None => json!({ "status": "error", "message": format!("Unknown tool '{}'", request.name) }),
            };
            return ContentPart {
                function_response: Some(FunctionResponse {
                    name: request.name.to_string(),
                    response,
                }),
                ..ContentPart::default()
            };
        })
        .collect::<Vec<ContentPart>>();

    return vec![
        Content {
            role: Some("model".to_string()),
            parts: calls,
        },
        Content {
            role: Some("user".to_string()),
            parts: responses,
        },
    ];
}

fn to_chunk(candidate: &Candidate) -> GenerationChunk {
    let mut chunk = GenerationChunk::default();
    let parts = match &candidate.content {
        Some(content) => &content.parts,
        None => return chunk,
    };

    for part in parts.iter() {
        if part.thought.unwrap_or(false) {
            continue;
        }
        if let Some(text) = &part.text {
            chunk.text = Some(chunk.text.unwrap_or_default() + text);
        }
        if let Some(call) = &part.function_call {
            chunk
                .tool_requests
                .push(ToolRequest::new(&call.name, call.args.clone()));
        }
    }

    return chunk;
}

async fn read_events(
    res: reqwest::Response,
    tx: &mpsc::UnboundedSender<Result<GenerationChunk>>,
) -> Result<GenerationResponse> {
    let stream = res.bytes_stream().map_err(convert_err);
    let mut lines_reader = StreamReader::new(stream).lines();

    let mut response = GenerationResponse::default();
    while let Some(line) = lines_reader.next_line().await? {
        let cleaned_line = line.trim();
        let data = match cleaned_line.strip_prefix("data:") {
            Some(data) => data.trim(),
            None => continue,
        };

        let event: GenerateContentResponse = serde_json::from_str(data)?;
        if let Some(err) = event.error {
            tracing::error!(
                code = err.code,
                reason = err.message,
                "Gemini returned an error while streaming"
            );
            bail!(format!("Gemini returned an error, {}: {}", err.code, err.message));
        }

        let candidate = match event.candidates.first() {
            Some(candidate) => candidate,
            None => continue,
        };
        if candidate.finish_reason.is_some() {
            response.finish_reason = candidate.finish_reason.clone();
        }

        let chunk = to_chunk(candidate);
        if chunk.is_empty() {
            continue;
        }

        response.append(&chunk);
        if tx.send(Ok(chunk)).is_err() {
            tracing::debug!("Generation stream was dropped, closing Gemini connection");
            bail!("Generation stream was dropped");
        }
    }

    return Ok(response);
}

async fn post_completion(
    client: &reqwest::Client,
    url: &str,
    req: &CompletionRequest,
) -> Result<reqwest::Response> {
    let res = client.post(url).json(req).send().await?;

    if !res.status().is_success() {
        tracing::error!(
            status = res.status().as_u16(),
            "Failed to make completion request to Gemini"
        );
        bail!(format!(
            "Failed to make completion request to Gemini, {}",
            res.status().as_u16()
        ));
    }

    return Ok(res);
}

/// Streams model turns until one ends without tool calls. Each tool call is
/// answered with its stub acknowledgement before the next turn is requested.
async fn run_turns(
    client: reqwest::Client,
    url: String,
    mut req: CompletionRequest,
    mut res: reqwest::Response,
    tools: Vec<ToolSpec>,
    tx: &mpsc::UnboundedSender<Result<GenerationChunk>>,
) -> Result<GenerationResponse> {
    let mut response = GenerationResponse::default();
    let mut turns = 1;

    loop {
        let turn = read_events(res, tx).await?;
        if turn.tool_requests.is_empty() {
            response.merge(turn);
            return Ok(response);
        }

        if turns >= MAX_TOOL_TURNS {
            tracing::warn!(turns = turns, "Model kept calling tools, ending generation");
            response.merge(turn);
            return Ok(response);
        }

        tracing::debug!(turn = turns, calls = turn.tool_requests.len(), "Returning tool responses to Gemini");
        req.contents.extend(tool_turn(&turn, &tools));
        response.merge(turn);

        res = post_completion(&client, &url, &req).await?;
        turns += 1;
    }
}

pub struct Gemini {
    url: String,
    token: String,
    model: String,
    timeout: String,
}

impl Default for Gemini {
    fn default() -> Gemini {
        return Gemini {
            url: Config::get(ConfigKey::GeminiURL),
            token: Config::get(ConfigKey::GeminiToken),
            model: Config::get(ConfigKey::Model),
            timeout: Config::get(ConfigKey::BackendHealthCheckTimeout),
        };
    }
}

#[async_trait]
impl Backend for Gemini {
    fn name(&self) -> BackendName {
        return BackendName::Gemini;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Gemini URL is not defined");
        }
        if self.token.is_empty() {
            bail!("Gemini token is not defined");
        }

        let url = format!(
            "{url}/v1beta/models/{model}?key={key}",
            url = self.url,
            model = self.model,
            key = self.token
        );

        let res = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "Gemini is not reachable");
                bail!("Gemini is not reachable");
            }
        };

        if status >= 400 {
            tracing::error!(status = status, "Gemini health check failed");
            bail!("Gemini health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        let req = to_completion_request(&request);
        let url = format!(
            "{url}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={key}",
            url = self.url,
            model = self.model,
            key = self.token,
        );

        let client = reqwest::Client::new();
        let res = post_completion(&client, &url, &req).await?;

        let (tx, rx) = mpsc::unbounded_channel::<Result<GenerationChunk>>();
        let (done_tx, done_rx) = oneshot::channel::<Result<GenerationResponse>>();

        tokio::spawn(async move {
            let res = run_turns(client, url, req, res, request.tools, &tx).await;
            if let Err(err) = &res {
                if tx.send(Err(anyhow!(err.to_string()))).is_err() {
                    tracing::debug!("Generation stream was dropped before the error was read");
                }
            }
            if done_tx.send(res).is_err() {
                tracing::debug!("Final Gemini response was not awaited");
            }
        });

        let response = async move {
            match done_rx.await {
                Ok(res) => return res,
                Err(_) => bail!("Gemini stream ended without a final response"),
            }
        };

        return Ok(GenerationStream {
            chunks: UnboundedReceiverStream::new(rx).boxed(),
            response: response.boxed(),
        });
    }
}
