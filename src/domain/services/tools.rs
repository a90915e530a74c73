#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;

use serde_json::json;
use serde_json::Value;

use crate::domain::models::ProtocolName;
use crate::domain::models::ToolName;
use crate::domain::models::ToolSpec;

fn status_schema() -> Value {
    return json!({
        "type": "object",
        "properties": { "status": { "type": "string" } },
        "required": ["status"],
    });
}

fn components_schema() -> Value {
    return json!({
        "type": "array",
        "description": "A list of all the widget definitions for this UI surface.",
        "items": {
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "The unique ID for the component." },
                "component": { "type": "object", "description": "The component definition." },
            },
            "required": ["id"],
        },
    });
}

fn surface_id_schema() -> Value {
    return json!({ "type": "string", "description": "The unique ID for the UI surface." });
}

fn data_model_schema(with_surface: bool) -> Value {
    let mut properties = json!({
        "path": {
            "type": "string",
            "description": "Path of the value to update. Omit to replace the whole data model.",
        },
        "contents": { "description": "The new value at the given path." },
    });
    let mut required = vec!["contents"];
    if with_surface {
        properties["surfaceId"] = surface_id_schema();
        required.insert(0, "surfaceId");
    }

    return json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
}

fn spec(name: ToolName, description: &str, input_schema: Value) -> ToolSpec {
    return ToolSpec {
        name,
        description: description.to_string(),
        input_schema,
        output_schema: status_schema(),
    };
}

fn a2ui_specs() -> Vec<ToolSpec> {
    return vec![
        spec(
            ToolName::UpdateSurface,
            "Add or update a UI surface. The 'definition' must conform to the JSON schema provided in the system prompt.",
            json!({
                "type": "object",
                "properties": {
                    "surfaceId": surface_id_schema(),
                    "definition": {
                        "type": "object",
                        "description": "A JSON object that defines the UI surface.",
                        "properties": {
                            "root": { "type": "string", "description": "The ID of the root widget in the UI tree." },
                            "components": components_schema(),
                        },
                        "required": ["root", "components"],
                    },
                },
                "required": ["surfaceId", "definition"],
            }),
        ),
        spec(
            ToolName::DeleteSurface,
            "Delete a UI surface.",
            json!({
                "type": "object",
                "properties": { "surfaceId": surface_id_schema() },
                "required": ["surfaceId"],
            }),
        ),
        spec(
            ToolName::DataModelUpdate,
            "Set or update the state data model of a UI surface.",
            data_model_schema(true),
        ),
        spec(
            ToolName::BeginRendering,
            "Signal that the client has all necessary components and data to render the surface.",
            json!({
                "type": "object",
                "properties": {
                    "surfaceId": surface_id_schema(),
                    "root": { "type": "string", "description": "The ID of the root component." },
                },
                "required": ["surfaceId", "root"],
            }),
        ),
    ];
}

fn gulf_specs() -> Vec<ToolSpec> {
    return vec![
        spec(
            ToolName::ComponentUpdate,
            "Define one or more UI components. Components are defined in a flat list and reference each other by ID.",
            json!({
                "type": "object",
                "properties": { "components": components_schema() },
                "required": ["components"],
            }),
        ),
        spec(
            ToolName::DeleteSurface,
            "Delete a UI surface.",
            json!({
                "type": "object",
                "properties": { "surfaceId": surface_id_schema() },
                "required": ["surfaceId"],
            }),
        ),
        spec(
            ToolName::DataModelUpdate,
            "Set or update the UI's state data model. You can replace the entire data model or update a specific path.",
            data_model_schema(false),
        ),
        spec(
            ToolName::BeginRendering,
            "Signal that the client has all necessary components and data to perform the initial render.",
            json!({
                "type": "object",
                "properties": {
                    "root": { "type": "string", "description": "The ID of the root component." },
                },
                "required": ["root"],
            }),
        ),
    ];
}

/// The fixed set of tools offered to the model for one protocol. The tools
/// only constrain the model's structured output. Their effect on the client is
/// produced by the relay, never here.
pub struct ToolRegistry {
    protocol: ProtocolName,
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn for_protocol(protocol: ProtocolName) -> ToolRegistry {
        let specs = match protocol {
            ProtocolName::A2ui => a2ui_specs(),
            ProtocolName::Gulf => gulf_specs(),
        };

        return ToolRegistry { protocol, specs };
    }

    pub fn protocol(&self) -> ProtocolName {
        return self.protocol;
    }

    pub fn specs(&self) -> &[ToolSpec] {
        return &self.specs;
    }

    pub fn names(&self) -> Vec<ToolName> {
        return self.specs.iter().map(|e| return e.name).collect();
    }

    pub fn contains(&self, name: ToolName) -> bool {
        return self.specs.iter().any(|e| return e.name == name);
    }

    /// The tool that carries component definitions.
    pub fn surface_tool(&self) -> ToolName {
        match self.protocol {
            ProtocolName::A2ui => return ToolName::UpdateSurface,
            ProtocolName::Gulf => return ToolName::ComponentUpdate,
        }
    }
}
