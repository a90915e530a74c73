#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

/// Wire-protocol flavor streamed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProtocolName {
    A2ui,
    Gulf,
}

impl ProtocolName {
    pub fn parse(text: &str) -> Option<ProtocolName> {
        return ProtocolName::iter().find(|e| return e.to_string() == text);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceUpdate {
    pub surface_id: String,
    pub components: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub components: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginRendering {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    pub root: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSurface {
    pub surface_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModelUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub contents: Value,
}

/// A single UI mutation streamed to the client. Serializes as a one-key
/// object, e.g. `{"deleteSurface": {"surfaceId": "s1"}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolMessage {
    SurfaceUpdate(SurfaceUpdate),
    ComponentUpdate(ComponentUpdate),
    BeginRendering(BeginRendering),
    DeleteSurface(DeleteSurface),
    DataModelUpdate(DataModelUpdate),
    Text(String),
}

impl ProtocolMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::SurfaceUpdate(_) => return "surfaceUpdate",
            ProtocolMessage::ComponentUpdate(_) => return "componentUpdate",
            ProtocolMessage::BeginRendering(_) => return "beginRendering",
            ProtocolMessage::DeleteSurface(_) => return "deleteSurface",
            ProtocolMessage::DataModelUpdate(_) => return "dataModelUpdate",
            ProtocolMessage::Text(_) => return "text",
        }
    }
}
