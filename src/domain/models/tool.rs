#[cfg(test)]
#[path = "tool_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::json;
use serde_json::Value;
use strum::EnumIter;
use strum::IntoEnumIterator;

use super::ProtocolName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum ToolName {
    UpdateSurface,
    ComponentUpdate,
    DeleteSurface,
    DataModelUpdate,
    BeginRendering,
}

impl ToolName {
    pub fn parse(text: &str) -> Option<ToolName> {
        return ToolName::iter().find(|e| return e.to_string() == text);
    }
}

/// Declaration handed to the model. Only shapes its structured output.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl ToolSpec {
    /// Stub execution of a call to this tool. Always succeeds and never
    /// mutates state. The model only sees the status.
    pub fn acknowledge(&self, input: &Value) -> Value {
        tracing::debug!(tool = %self.name, input = %input, "Acknowledging tool call");

        let status = match self.name {
            ToolName::UpdateSurface => "updated",
            ToolName::DeleteSurface => "deleted",
            _ => "ok",
        };

        return json!({ "status": status });
    }
}

/// A tool invocation exactly as the model produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolRequest {
    pub fn new(name: &str, input: Value) -> ToolRequest {
        return ToolRequest {
            name: name.to_string(),
            input,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDefinition {
    pub root: String,
    pub components: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSurfaceInput {
    pub surface_id: String,
    pub definition: SurfaceDefinition,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdateInput {
    pub components: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSurfaceInput {
    pub surface_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModelUpdateInput {
    #[serde(default)]
    pub surface_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub contents: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRenderingInput {
    #[serde(default)]
    pub surface_id: Option<String>,
    pub root: String,
}

/// A tool request checked against its declared top-level keys. Anything
/// nested below those keys stays as raw JSON for the renderer to validate.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCall {
    UpdateSurface(UpdateSurfaceInput),
    ComponentUpdate(ComponentUpdateInput),
    DeleteSurface(DeleteSurfaceInput),
    DataModelUpdate(DataModelUpdateInput),
    BeginRendering(BeginRenderingInput),
    Unknown { name: String, input: Value },
}

fn parse_input<T: DeserializeOwned>(request: &ToolRequest) -> Result<T> {
    return serde_json::from_value::<T>(request.input.clone())
        .with_context(|| return format!("Invalid input for tool '{}'", request.name));
}

impl ToolCall {
    /// Parses a request whose name is one of `registered`. Other names come
    /// back as `Unknown` rather than failing.
    pub fn parse(request: &ToolRequest, registered: &[ToolName]) -> Result<ToolCall> {
        let name = match ToolName::parse(&request.name) {
            Some(name) if registered.contains(&name) => name,
            _ => {
                return Ok(ToolCall::Unknown {
                    name: request.name.to_string(),
                    input: request.input.clone(),
                });
            }
        };

        let call = match name {
            ToolName::UpdateSurface => ToolCall::UpdateSurface(parse_input(request)?),
            ToolName::ComponentUpdate => ToolCall::ComponentUpdate(parse_input(request)?),
            ToolName::DeleteSurface => ToolCall::DeleteSurface(parse_input(request)?),
            ToolName::DataModelUpdate => ToolCall::DataModelUpdate(parse_input(request)?),
            ToolName::BeginRendering => ToolCall::BeginRendering(parse_input(request)?),
        };

        return Ok(call);
    }

    /// Checks the keys whose presence depends on the protocol. A2UI addresses
    /// every message to a surface, GULF has a single implicit one.
    pub fn require_protocol_keys(&self, protocol: ProtocolName) -> Result<()> {
        let surface_id = match self {
            ToolCall::DataModelUpdate(input) => {
                if input.contents.is_null() {
                    bail!("Tool 'dataModelUpdate' requires 'contents'");
                }
                input.surface_id.as_ref()
            }
            ToolCall::BeginRendering(input) => input.surface_id.as_ref(),
            _ => return Ok(()),
        };

        if protocol == ProtocolName::A2ui && surface_id.is_none() {
            bail!("Tool '{}' requires 'surfaceId' for A2UI", self.name());
        }

        return Ok(());
    }

    fn name(&self) -> String {
        match self {
            ToolCall::UpdateSurface(_) => return ToolName::UpdateSurface.to_string(),
            ToolCall::ComponentUpdate(_) => return ToolName::ComponentUpdate.to_string(),
            ToolCall::DeleteSurface(_) => return ToolName::DeleteSurface.to_string(),
            ToolCall::DataModelUpdate(_) => return ToolName::DataModelUpdate.to_string(),
            ToolCall::BeginRendering(_) => return ToolName::BeginRendering.to_string(),
            ToolCall::Unknown { name, .. } => return name.to_string(),
        }
    }
}
