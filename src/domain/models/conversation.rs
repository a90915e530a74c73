#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

use super::FlowError;
use super::ProtocolName;

const KNOWN_PART_TYPES: [&str; 4] = ["text", "image", "ui", "uiEvent"];
const GULF_EVENT: &str = "gulfEvent";

fn known_part_types(protocol: ProtocolName) -> Vec<&'static str> {
    let mut types = KNOWN_PART_TYPES.to_vec();
    if protocol == ProtocolName::Gulf {
        types.push(GULF_EVENT);
    }

    return types;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
    Tool,
}

impl Role {
    pub fn parse(text: &str) -> Option<Role> {
        return Role::iter().find(|e| return e.to_string() == text);
    }
}

/// What to do with a part whose shape matches none of the known part types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnknownPartPolicy {
    /// Fail validation for the whole request.
    Reject,
    /// Keep the part as an empty text placeholder.
    Placeholder,
}

impl UnknownPartPolicy {
    pub fn parse(text: &str) -> Option<UnknownPartPolicy> {
        return UnknownPartPolicy::iter().find(|e| return e.to_string() == text);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    pub surface_id: String,
    pub widget_id: String,
    pub event_type: String,
    pub is_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub timestamp: String,
}

/// A GULF client event, carrying the action the user triggered and the
/// context the renderer resolved for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GulfEvent {
    pub action_name: String,
    #[serde(default)]
    pub resolved_context: Value,
}

/// A UI surface that was rendered earlier in the conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiDefinition {
    pub surface_id: String,
    pub root: String,
    pub components: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Url {
        url: String,
        mime_type: Option<String>,
    },
    Inline {
        base64: String,
        mime_type: String,
    },
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    return value.as_ref().filter(|e| return !e.is_empty());
}

impl ImagePart {
    /// Returns every violated constraint, empty when the part is valid.
    pub fn issues(&self) -> Vec<&'static str> {
        let has_url = non_empty(&self.url).is_some();
        let has_base64 = non_empty(&self.base64).is_some();
        let has_mime_type = non_empty(&self.mime_type).is_some();

        let mut issues = vec![];
        if has_url && has_base64 {
            issues.push("If url is provided, base64 should not be.");
        }
        if !has_url && !has_base64 {
            issues.push("Either url or base64 must be provided.");
        }
        if has_base64 && !has_mime_type {
            issues.push("If base64 is provided, mimeType must also be provided.");
        }

        return issues;
    }

    pub fn source(&self) -> Option<ImageSource> {
        if !self.issues().is_empty() {
            return None;
        }

        let mime_type = non_empty(&self.mime_type).cloned();
        if let Some(url) = non_empty(&self.url) {
            return Some(ImageSource::Url {
                url: url.to_string(),
                mime_type,
            });
        }

        return Some(ImageSource::Inline {
            base64: non_empty(&self.base64)?.to_string(),
            mime_type: mime_type?,
        });
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Part {
    Text {
        text: String,
    },
    Image(ImagePart),
    Ui {
        definition: UiDefinition,
    },
    UiEvent {
        event: UiEvent,
    },
    GulfEvent {
        #[serde(rename = "gulfEvent")]
        gulf_event: GulfEvent,
    },
    /// Placeholder for a part that matched no known shape.
    #[serde(skip)]
    Unknown(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Message {
        return Message { role, parts };
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => return "null",
        Value::Bool(_) => return "boolean",
        Value::Number(_) => return "number",
        Value::String(_) => return "string",
        Value::Array(_) => return "array",
        Value::Object(_) => return "object",
    }
}

fn parse_part(
    location: &str,
    raw: &Value,
    protocol: ProtocolName,
    policy: UnknownPartPolicy,
    issues: &mut Vec<String>,
) -> Option<Part> {
    // GULF clients send events untyped, keyed by `gulfEvent` alone.
    let mut raw = raw.clone();
    if raw.get("type").is_none() && raw.get(GULF_EVENT).is_some() {
        raw["type"] = Value::String(GULF_EVENT.to_string());
    }

    let known_types = known_part_types(protocol);
    let part_type = raw.get("type").and_then(|e| return e.as_str());
    let known = part_type
        .map(|e| return known_types.contains(&e))
        .unwrap_or(false);

    if !known {
        if policy == UnknownPartPolicy::Placeholder {
            tracing::warn!(location = location, "Replacing unrecognized part with a placeholder");
            return Some(Part::Unknown(raw));
        }

        let found = part_type.unwrap_or_else(|| return type_name(&raw));
        issues.push(format!(
            "{location}: Unrecognized part '{found}'. Expected one of: {}.",
            known_types.join(", ")
        ));
        return None;
    }

    let part = match serde_json::from_value::<Part>(raw) {
        Ok(part) => part,
        Err(err) => {
            issues.push(format!("{location}: {err}"));
            return None;
        }
    };

    if let Part::Image(image) = &part {
        let image_issues = image.issues();
        if !image_issues.is_empty() {
            for issue in image_issues {
                issues.push(format!("{location}: {issue}"));
            }
            return None;
        }
    }

    return Some(part);
}

fn parse_message(
    location: &str,
    raw: &Value,
    protocol: ProtocolName,
    policy: UnknownPartPolicy,
    issues: &mut Vec<String>,
) -> Option<Message> {
    if !raw.is_object() {
        issues.push(format!(
            "{location}: Expected object, received {}",
            type_name(raw)
        ));
        return None;
    }

    let role = match raw.get("role") {
        Some(Value::String(role)) => Role::parse(role),
        _ => None,
    };
    if role.is_none() {
        issues.push(format!(
            "{location}.role: Expected one of: user, model, system, tool."
        ));
    }

    let raw_parts = match raw.get("parts") {
        Some(Value::Array(parts)) => parts,
        other => {
            issues.push(format!(
                "{location}.parts: Expected array, received {}",
                type_name(other.unwrap_or(&Value::Null))
            ));
            return None;
        }
    };

    let parts = raw_parts
        .iter()
        .enumerate()
        .filter_map(|(idx, part)| {
            return parse_part(
                &format!("{location}.parts[{idx}]"),
                part,
                protocol,
                policy,
                issues,
            );
        })
        .collect::<Vec<Part>>();

    return Some(Message::new(role?, parts));
}

/// Validates a raw conversation payload. Every violated constraint is
/// reported, and nothing is returned unless the whole conversation is valid.
/// GULF client events are only recognized for the GULF protocol.
pub fn parse_conversation(
    raw: &Value,
    protocol: ProtocolName,
    policy: UnknownPartPolicy,
) -> Result<Vec<Message>, FlowError> {
    let raw_messages = match raw {
        Value::Array(messages) => messages,
        other => {
            return Err(FlowError::Validation(format!(
                "conversation: Expected array, received {}",
                type_name(other)
            )));
        }
    };

    let mut issues: Vec<String> = vec![];
    let messages = raw_messages
        .iter()
        .enumerate()
        .filter_map(|(idx, message)| {
            return parse_message(
                &format!("conversation[{idx}]"),
                message,
                protocol,
                policy,
                &mut issues,
            );
        })
        .collect::<Vec<Message>>();

    if !issues.is_empty() {
        return Err(FlowError::Validation(issues.join("\n")));
    }

    return Ok(messages);
}

pub fn ensure_catalog(catalog: &Value) -> Result<(), FlowError> {
    if !catalog.is_object() {
        return Err(FlowError::Validation(format!(
            "catalog: Expected object, received {}",
            type_name(catalog)
        )));
    }

    return Ok(());
}
