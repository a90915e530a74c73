use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub catalog: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub protocol_version: String,
    #[serde(default)]
    pub catalog: Value,
}

/// Where a generate call gets its catalog from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogSource {
    #[serde(rename_all = "camelCase")]
    Session { session_id: String },
    Inline { catalog: Value },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateUiRequest {
    #[serde(flatten)]
    pub source: CatalogSource,
    /// Raw conversation, validated before transformation.
    #[serde(default)]
    pub conversation: Value,
}
