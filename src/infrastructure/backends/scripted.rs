use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream;
use futures::FutureExt;
use futures::StreamExt;

use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::GenerationChunk;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResponse;
use crate::domain::models::GenerationStream;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    None,
    OnStart,
    AfterChunks,
}

/// Backend that replays a fixed list of chunks and records every request.
pub struct ScriptedBackend {
    chunks: Vec<GenerationChunk>,
    failure: Failure,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedBackend {
    pub fn new(chunks: Vec<GenerationChunk>) -> ScriptedBackend {
        return ScriptedBackend {
            chunks,
            failure: Failure::None,
            requests: Arc::new(Mutex::new(vec![])),
        };
    }

    pub fn failing(failure: Failure, chunks: Vec<GenerationChunk>) -> ScriptedBackend {
        return ScriptedBackend {
            failure,
            ..ScriptedBackend::new(chunks)
        };
    }

    pub fn requests(&self) -> Arc<Mutex<Vec<GenerationRequest>>> {
        return self.requests.clone();
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> BackendName {
        return BackendName::Gemini;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        self.requests.lock().unwrap().push(request);

        if self.failure == Failure::OnStart {
            bail!("Failed to make completion request to Gemini, 503");
        }

        let mut response = GenerationResponse::default();
        for chunk in self.chunks.iter() {
            response.append(chunk);
        }
        response.finish_reason = Some("STOP".to_string());

        let mut items = self
            .chunks
            .iter()
            .cloned()
            .map(|e| return Ok(e))
            .collect::<Vec<Result<GenerationChunk>>>();

        if self.failure == Failure::AfterChunks {
            items.push(Err(anyhow::anyhow!("Gemini stream was interrupted")));
        }

        return Ok(GenerationStream {
            chunks: stream::iter(items).boxed(),
            response: async move { return Ok(response) }.boxed(),
        });
    }
}
