#[cfg(test)]
#[path = "prompts_test.rs"]
mod tests;

use anyhow::Result;
use serde_json::Value;

use crate::domain::models::ProtocolName;

/// Protocol specific sections of the system prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolInstructions {
    pub goal: String,
    pub tools: String,
    pub schema_target: String,
    pub events: String,
    pub sequence: String,
    pub completion: String,
}

impl ProtocolInstructions {
    pub fn for_protocol(protocol: ProtocolName) -> ProtocolInstructions {
        match protocol {
            ProtocolName::A2ui => {
                return ProtocolInstructions {
                    goal: "Your goal is to generate a UI based on the user's request by calling tools that emit A2UI protocol messages.".to_string(),
                    tools: [
                        "You must build the UI using the following tools:",
                        "- `updateSurface`: Define the components of a UI surface. You MUST provide a 'surfaceId' and a 'definition' with a 'root' and a flat list of 'components' that reference each other by ID.",
                        "- `dataModelUpdate`: Set or update the data model of a surface.",
                        "- `beginRendering`: Signal that a surface is ready to be rendered from its root component.",
                        "- `deleteSurface`: Remove a surface that is no longer needed.",
                    ]
                    .join("\n"),
                    schema_target: "When you use the 'updateSurface' tool, the 'definition' parameter you provide MUST be a JSON object that strictly conforms to the following JSON Schema.\n- Pay very close attention to the nesting and structure of the 'component' objects within the 'components' array. Each component object MUST have a single key that is the component type (e.g., \"Heading\", \"Text\"), and the value must be an object containing the properties for that component.\n- When defining a component with dynamic children using a 'template', the 'template' property's value MUST be an object containing 'componentId' and 'dataBinding' keys.".to_string(),
                    events: UI_EVENTS_GUIDANCE.to_string(),
                    sequence: "First, define all the components. Then, provide the data. Finally, signal that the surface is ready to render. Rendering must be signalled exactly once per surface.".to_string(),
                    completion: "After you have successfully called the 'updateSurface' tool and have received a 'toolResponse' with a status of 'updated', you should consider the user's request fulfilled. Respond with a short confirmation message to the user and then stop. Do not call the tool again unless the user asks for further changes.".to_string(),
                };
            }
            ProtocolName::Gulf => {
                return ProtocolInstructions {
                    goal: "Your goal is to generate a UI based on the user's request by incrementally calling tools to emit messages that conform to the GULF (Generative UI Language Format) Protocol.".to_string(),
                    tools: [
                        "You must build the UI piece by piece using the following tools:",
                        "- `componentUpdate`: Use this to define one or more UI components. Components are defined in a flat list and reference each other by ID.",
                        "- `dataModelUpdate`: Use this to set or update the UI's state.",
                        "- `beginRendering`: You MUST call this tool once, and only once, after all initial components and data have been defined.",
                        "- `deleteSurface`: Use this to remove a surface that is no longer needed.",
                    ]
                    .join("\n"),
                    schema_target: "When you use the `componentUpdate` tool, the properties of each component you provide MUST be a JSON object that strictly conforms to the following JSON Schema:".to_string(),
                    events: format!("{UI_EVENTS_GUIDANCE}\n\n{GULF_EVENT_GUIDANCE}"),
                    sequence: "First, define all the components. Then, provide the data. Finally, call beginRendering.".to_string(),
                    completion: "After the UI has been rendered successfully, consider the user's request fulfilled and stop. Do not call the tools again unless the user asks for further changes.".to_string(),
                };
            }
        }
    }
}

const UI_EVENTS_GUIDANCE: &str = "When the user interacts with the UI, you will receive a message containing a JSON block with an array of UI events. Treat those events as the authoritative record of what the user did. Use the data from these events, especially the 'value' of the action event, to understand the current state of the UI and decide on the next step.";

const GULF_EVENT_GUIDANCE: &str = "When the user triggers an action, you will receive a message describing a GULF ClientEvent with its action name and the context the client resolved for it. Use the 'resolvedContext' to understand the user's action and decide on the next step.";

/// Renders the system prompt for a catalog. The output only depends on its
/// inputs, and catalog keys are emitted in sorted order.
pub fn build_system_prompt(catalog: &Value, instructions: &ProtocolInstructions) -> Result<String> {
    let schema = serde_json::to_string_pretty(catalog)?;

    let prompt = [
        format!("You are an expert UI generation agent. {}", instructions.goal),
        instructions.tools.to_string(),
        format!(
            "{}\n\n```json\n{schema}\n```",
            instructions.schema_target
        ),
        instructions.events.to_string(),
        instructions.sequence.to_string(),
        instructions.completion.to_string(),
    ]
    .join("\n\n");

    return Ok(prompt);
}
