use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Role;
use super::ToolRequest;
use super::ToolSpec;

/// Content handed to the model, in the shape the generation API consumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationPart {
    Text(String),
    Media {
        url: String,
        #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// A tool call the model made in an earlier turn, replayed as history.
    ToolRequest(ToolRequest),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationMessage {
    pub role: Role,
    pub content: Vec<GenerationPart>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub messages: Vec<GenerationMessage>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
}

impl GenerationChunk {
    pub fn is_empty(&self) -> bool {
        return self.text.is_none() && self.tool_requests.is_empty();
    }
}

/// Aggregate of everything the model produced during one call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub text: String,
    pub tool_requests: Vec<ToolRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl GenerationResponse {
    pub fn append(&mut self, chunk: &GenerationChunk) {
        if let Some(text) = &chunk.text {
            self.text += text;
        }
        self.tool_requests
            .extend(chunk.tool_requests.iter().cloned());
    }

    /// Folds a later model turn of the same call into this response.
    pub fn merge(&mut self, turn: GenerationResponse) {
        self.text += &turn.text;
        self.tool_requests.extend(turn.tool_requests);
        if turn.finish_reason.is_some() {
            self.finish_reason = turn.finish_reason;
        }
    }
}

/// Live output of a model call: chunks as they arrive, then the aggregate
/// once the chunk stream has completed.
pub struct GenerationStream {
    pub chunks: BoxStream<'static, Result<GenerationChunk>>,
    pub response: BoxFuture<'static, Result<GenerationResponse>>,
}
