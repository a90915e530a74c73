#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

use super::GenerationRequest;
use super::GenerationStream;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendName {
    Gemini,
}

impl BackendName {
    pub fn parse(text: String) -> Option<BackendName> {
        return BackendName::iter().find(|e| return e.to_string() == text);
    }
}

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    /// Used at startup to verify all configurations are available to work with
    /// the backend.
    async fn health_check(&self) -> Result<()>;

    /// Starts a generation call with tool calling enabled. Errors raised while
    /// contacting the model are returned before any chunk is produced.
    ///
    /// Chunks are yielded as the model streams them. The aggregate response
    /// resolves once the chunk stream has been drained. Dropping the stream
    /// releases the connection to the model.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<GenerationStream>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;
