#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

use serde_json::json;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::BeginRendering;
use crate::domain::models::ComponentUpdate;
use crate::domain::models::DataModelUpdate;
use crate::domain::models::DeleteSurface;
use crate::domain::models::GenerationChunk;
use crate::domain::models::GenerationResponse;
use crate::domain::models::ProtocolMessage;
use crate::domain::models::ProtocolName;
use crate::domain::models::SurfaceUpdate;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolRequest;
use crate::domain::services::ToolRegistry;

const FALLBACK_ROOT_ID: &str = "root";
const FALLBACK_TEXT_ID: &str = "text-message";

fn fallback_components(text: &str) -> Vec<Value> {
    return vec![
        json!({
            "id": FALLBACK_ROOT_ID,
            "component": { "Column": { "children": { "explicitList": [FALLBACK_TEXT_ID] } } },
        }),
        json!({
            "id": FALLBACK_TEXT_ID,
            "component": { "Text": { "text": { "literalString": text } } },
        }),
    ];
}

/// Translates the model's tool calls of one generation run into protocol
/// messages.
///
/// A run has two phases. `relay` is fed every tool request in the order the
/// model streamed them. `finish` is called once with the aggregate response
/// and decides whether trailing free text becomes a fallback surface. The
/// only state carried between the phases is whether a structural tool was
/// seen.
pub struct ToolRelay {
    registry: ToolRegistry,
    fallback_surface: bool,
    structural_tool_seen: bool,
    begin_rendering_calls: usize,
}

impl ToolRelay {
    pub fn new(protocol: ProtocolName, fallback_surface: bool) -> ToolRelay {
        return ToolRelay {
            registry: ToolRegistry::for_protocol(protocol),
            fallback_surface,
            structural_tool_seen: false,
            begin_rendering_calls: 0,
        };
    }

    pub fn structural_tool_seen(&self) -> bool {
        return self.structural_tool_seen;
    }

    pub fn relay_chunk(&mut self, chunk: &GenerationChunk) -> Vec<ProtocolMessage> {
        return chunk
            .tool_requests
            .iter()
            .flat_map(|request| return self.relay(request))
            .collect();
    }

    pub fn relay(&mut self, request: &ToolRequest) -> Vec<ProtocolMessage> {
        let call = match ToolCall::parse(request, &self.registry.names()) {
            Ok(call) => call,
            Err(err) => {
                tracing::warn!(tool = request.name, error = ?err, "Dropping malformed tool call");
                return vec![];
            }
        };

        if let ToolCall::Unknown { name, .. } = &call {
            tracing::warn!(tool = name, "Dropping call to an unregistered tool");
            return vec![];
        }

        if let Err(err) = call.require_protocol_keys(self.registry.protocol()) {
            tracing::warn!(tool = request.name, error = ?err, "Dropping incomplete tool call");
            return vec![];
        }

        self.structural_tool_seen = true;

        match call {
            ToolCall::UpdateSurface(input) => {
                tracing::info!(surface_id = input.surface_id, "Sending surfaceUpdate and beginRendering");
                return vec![
                    ProtocolMessage::SurfaceUpdate(SurfaceUpdate {
                        surface_id: input.surface_id.to_string(),
                        components: input.definition.components,
                    }),
                    ProtocolMessage::BeginRendering(BeginRendering {
                        surface_id: Some(input.surface_id),
                        root: input.definition.root,
                    }),
                ];
            }
            ToolCall::ComponentUpdate(input) => {
                tracing::info!(components = input.components.len(), "Sending componentUpdate");
                return vec![ProtocolMessage::ComponentUpdate(ComponentUpdate {
                    components: input.components,
                })];
            }
            ToolCall::DeleteSurface(input) => {
                tracing::info!(surface_id = input.surface_id, "Sending deleteSurface");
                return vec![ProtocolMessage::DeleteSurface(DeleteSurface {
                    surface_id: input.surface_id,
                })];
            }
            ToolCall::DataModelUpdate(input) => {
                tracing::info!(path = input.path.as_deref().unwrap_or("root"), "Sending dataModelUpdate");
                return vec![ProtocolMessage::DataModelUpdate(DataModelUpdate {
                    surface_id: input.surface_id,
                    path: input.path,
                    contents: input.contents,
                })];
            }
            ToolCall::BeginRendering(input) => {
                self.begin_rendering_calls += 1;
                if self.begin_rendering_calls > 1 {
                    tracing::warn!(
                        calls = self.begin_rendering_calls,
                        root = input.root,
                        "Model called beginRendering more than once, forwarding anyway"
                    );
                }
                return vec![ProtocolMessage::BeginRendering(BeginRendering {
                    surface_id: input.surface_id,
                    root: input.root,
                })];
            }
            ToolCall::Unknown { .. } => return vec![],
        }
    }

    /// Turns trailing free text into a renderable surface when the model never
    /// produced one. Text after a structural tool call is dropped.
    pub fn finish(&self, response: &GenerationResponse) -> Vec<ProtocolMessage> {
        if response.text.is_empty() {
            return vec![];
        }

        if self.structural_tool_seen {
            tracing::info!("Skipping final text response, a UI was already emitted");
            return vec![];
        }

        if !self.fallback_surface {
            tracing::info!("No tool call was made, forwarding the final text response");
            return vec![ProtocolMessage::Text(response.text.to_string())];
        }

        tracing::info!("No tool call was made, generating a text UI for the final response");
        let components = fallback_components(&response.text);
        match self.registry.protocol() {
            ProtocolName::A2ui => {
                let surface_id = format!("text-response-{}", Uuid::new_v4());
                return vec![
                    ProtocolMessage::SurfaceUpdate(SurfaceUpdate {
                        surface_id: surface_id.to_string(),
                        components,
                    }),
                    ProtocolMessage::BeginRendering(BeginRendering {
                        surface_id: Some(surface_id),
                        root: FALLBACK_ROOT_ID.to_string(),
                    }),
                ];
            }
            ProtocolName::Gulf => {
                return vec![
                    ProtocolMessage::ComponentUpdate(ComponentUpdate { components }),
                    ProtocolMessage::BeginRendering(BeginRendering {
                        surface_id: None,
                        root: FALLBACK_ROOT_ID.to_string(),
                    }),
                ];
            }
        }
    }
}
