#[cfg(test)]
#[path = "flows_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ensure_catalog;
use crate::domain::models::parse_conversation;
use crate::domain::models::BackendBox;
use crate::domain::models::CatalogSource;
use crate::domain::models::FlowError;
use crate::domain::models::GenerateUiRequest;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResponse;
use crate::domain::models::GenerationStream;
use crate::domain::models::ProtocolMessage;
use crate::domain::models::ProtocolName;
use crate::domain::models::StartSessionRequest;
use crate::domain::models::UnknownPartPolicy;
use crate::domain::services::build_system_prompt;
use crate::domain::services::ProtocolInstructions;
use crate::domain::services::SessionStore;
use crate::domain::services::ToolRegistry;
use crate::domain::services::ToolRelay;
use crate::domain::services::Transformer;

#[derive(Clone, Debug, PartialEq)]
pub enum FlowEvent {
    Message(ProtocolMessage),
    /// Terminal value of a run, yielded after every message.
    Complete(GenerationResponse),
}

pub type FlowStream = BoxStream<'static, Result<FlowEvent>>;

#[derive(Clone, Debug, PartialEq)]
pub struct FlowSettings {
    pub protocol: ProtocolName,
    pub unknown_parts: UnknownPartPolicy,
    pub fallback_surface: bool,
    pub temperature: Option<f32>,
}

impl Default for FlowSettings {
    fn default() -> FlowSettings {
        return FlowSettings {
            protocol: ProtocolName::A2ui,
            unknown_parts: UnknownPartPolicy::Reject,
            fallback_surface: true,
            temperature: Some(0.3),
        };
    }
}

impl FlowSettings {
    pub fn from_config() -> Result<FlowSettings> {
        let protocol_str = Config::get(ConfigKey::Protocol);
        let protocol = match ProtocolName::parse(&protocol_str) {
            Some(protocol) => protocol,
            None => bail!(format!("Unknown protocol '{protocol_str}'")),
        };

        let unknown_parts_str = Config::get(ConfigKey::UnknownParts);
        let unknown_parts = match UnknownPartPolicy::parse(&unknown_parts_str) {
            Some(policy) => policy,
            None => bail!(format!("Unknown part policy '{unknown_parts_str}'")),
        };

        let temperature_str = Config::get(ConfigKey::Temperature);
        let temperature = if temperature_str.is_empty() {
            None
        } else {
            Some(temperature_str.parse::<f32>()?)
        };

        return Ok(FlowSettings {
            protocol,
            unknown_parts,
            fallback_surface: Config::get(ConfigKey::FallbackSurface).parse::<bool>()?,
            temperature,
        });
    }
}

/// Drives generation runs for both transports.
pub struct UiFlows {
    backend: BackendBox,
    sessions: Arc<SessionStore>,
    settings: FlowSettings,
}

impl UiFlows {
    pub fn new(backend: BackendBox, sessions: Arc<SessionStore>, settings: FlowSettings) -> UiFlows {
        return UiFlows {
            backend,
            sessions,
            settings,
        };
    }

    pub fn settings(&self) -> &FlowSettings {
        return &self.settings;
    }

    pub fn sessions(&self) -> &SessionStore {
        return &self.sessions;
    }

    pub fn start_session(&self, request: StartSessionRequest) -> Result<String> {
        ensure_catalog(&request.catalog)?;
        tracing::debug!(
            protocol_version = request.protocol_version,
            "Starting session"
        );

        return Ok(self.sessions.start(request.catalog));
    }

    pub fn resolve_catalog(&self, source: &CatalogSource) -> Result<Value> {
        match source {
            CatalogSource::Session { session_id } => match self.sessions.get(session_id) {
                Some(session) => return Ok(session.catalog),
                None => {
                    tracing::error!(session_id = session_id, "Invalid session ID");
                    return Err(FlowError::InvalidSession(session_id.to_string()).into());
                }
            },
            CatalogSource::Inline { catalog } => {
                if catalog.is_null() {
                    tracing::error!("No catalog provided in the request.");
                    return Err(FlowError::MissingCatalog.into());
                }
                ensure_catalog(catalog)?;
                return Ok(catalog.clone());
            }
        }
    }

    /// Starts a run. Validation, session and model connection errors are
    /// returned here, before any message is streamed. Errors raised while the
    /// model is streaming end the returned stream.
    pub async fn generate(&self, request: GenerateUiRequest) -> Result<FlowStream> {
        let catalog = self.resolve_catalog(&request.source)?;
        let system = build_system_prompt(
            &catalog,
            &ProtocolInstructions::for_protocol(self.settings.protocol),
        )?;

        let conversation = parse_conversation(
            &request.conversation,
            self.settings.protocol,
            self.settings.unknown_parts,
        )?;
        let messages = Transformer::new(self.settings.protocol).transform(&conversation)?;
        tracing::debug!(messages = messages.len(), "Starting generation for conversation");

        let generation = self
            .backend
            .generate_stream(GenerationRequest {
                system,
                messages,
                tools: ToolRegistry::for_protocol(self.settings.protocol)
                    .specs()
                    .to_vec(),
                temperature: self.settings.temperature,
            })
            .await;

        let GenerationStream {
            mut chunks,
            response,
        } = match generation {
            Ok(generation) => generation,
            Err(err) => {
                tracing::error!(error = ?err, backend = %self.backend.name(), "Failed to start generation");
                return Err(err);
            }
        };

        let mut relay = ToolRelay::new(self.settings.protocol, self.settings.fallback_surface);
        let stream = stream! {
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::error!(error = ?err, "Generation failed while streaming");
                        yield Err(err);
                        return;
                    }
                };

                tracing::debug!(chunk = ?chunk, "Chunk from model");
                for message in relay.relay_chunk(&chunk) {
                    yield Ok(FlowEvent::Message(message));
                }
            }

            let response = match response.await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(error = ?err, "Generation failed to complete");
                    yield Err(err);
                    return;
                }
            };

            for message in relay.finish(&response) {
                yield Ok(FlowEvent::Message(message));
            }
            yield Ok(FlowEvent::Complete(response));
        };

        return Ok(Box::pin(stream));
    }

    /// Runs a generation to completion, collecting every streamed message.
    pub async fn generate_all(
        &self,
        request: GenerateUiRequest,
    ) -> Result<(Vec<ProtocolMessage>, GenerationResponse)> {
        let mut stream = self.generate(request).await?;
        let mut messages = vec![];

        while let Some(event) = stream.next().await {
            match event? {
                FlowEvent::Message(message) => messages.push(message),
                FlowEvent::Complete(response) => return Ok((messages, response)),
            }
        }

        bail!("Generation ended without a final response")
    }
}
