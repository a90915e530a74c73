#[cfg(test)]
#[path = "transformer_test.rs"]
mod tests;

use anyhow::Result;
use serde_json::json;

use crate::domain::models::GenerationMessage;
use crate::domain::models::GenerationPart;
use crate::domain::models::GulfEvent;
use crate::domain::models::ImageSource;
use crate::domain::models::Message;
use crate::domain::models::Part;
use crate::domain::models::ProtocolName;
use crate::domain::models::ToolRequest;
use crate::domain::models::UiDefinition;
use crate::domain::models::UiEvent;

const UI_EVENTS_PREAMBLE: &str =
    "The user interacted with the UI, resulting in the following events.\n\n\n";

/// Renders the events of one message as the text the model reads back.
pub fn describe_ui_events(events: &[&UiEvent]) -> Result<String> {
    let pretty = serde_json::to_string_pretty(events)?;
    return Ok(format!("{UI_EVENTS_PREAMBLE}{pretty}\n\n"));
}

/// Renders a GULF client event as the text the model reads back.
pub fn describe_gulf_event(event: &GulfEvent) -> Result<String> {
    let context = serde_json::to_string_pretty(&event.resolved_context)?;
    return Ok(format!(
        "The user triggered the '{}' action with the following context: {context}",
        event.action_name
    ));
}

/// Maps validated client conversations into generation messages.
pub struct Transformer {
    protocol: ProtocolName,
}

impl Transformer {
    pub fn new(protocol: ProtocolName) -> Transformer {
        return Transformer { protocol };
    }

    pub fn transform(&self, messages: &[Message]) -> Result<Vec<GenerationMessage>> {
        return messages
            .iter()
            .map(|message| return self.transform_message(message))
            .collect();
    }

    fn transform_message(&self, message: &Message) -> Result<GenerationMessage> {
        let mut events: Vec<&UiEvent> = vec![];
        let mut content: Vec<GenerationPart> = vec![];

        for part in message.parts.iter() {
            match part {
                Part::UiEvent { event } => events.push(event),
                Part::GulfEvent { gulf_event } => {
                    content.push(GenerationPart::Text(describe_gulf_event(gulf_event)?));
                }
                _ => content.push(self.transform_part(part)),
            }
        }

        if !events.is_empty() {
            content.push(GenerationPart::Text(describe_ui_events(&events)?));
        }

        return Ok(GenerationMessage {
            role: message.role,
            content,
        });
    }

    fn transform_part(&self, part: &Part) -> GenerationPart {
        match part {
            Part::Text { text } => return GenerationPart::Text(text.to_string()),
            Part::Image(image) => match image.source() {
                Some(ImageSource::Url { url, mime_type }) => {
                    return GenerationPart::Media {
                        url,
                        content_type: mime_type,
                    };
                }
                Some(ImageSource::Inline { base64, mime_type }) => {
                    return GenerationPart::Media {
                        url: format!("data:{mime_type};base64,{base64}"),
                        content_type: Some(mime_type),
                    };
                }
                None => return GenerationPart::Text("".to_string()),
            },
            Part::Ui { definition } => {
                return GenerationPart::ToolRequest(self.prior_ui(definition));
            }
            // Events are rendered by the caller.
            Part::UiEvent { .. } | Part::GulfEvent { .. } | Part::Unknown(_) => {
                return GenerationPart::Text("".to_string());
            }
        }
    }

    /// Replays an earlier surface as the tool call that would have produced it.
    fn prior_ui(&self, definition: &UiDefinition) -> ToolRequest {
        match self.protocol {
            ProtocolName::A2ui => {
                return ToolRequest::new(
                    "updateSurface",
                    json!({
                        "surfaceId": definition.surface_id,
                        "definition": {
                            "root": definition.root,
                            "components": definition.components,
                        },
                    }),
                );
            }
            ProtocolName::Gulf => {
                return ToolRequest::new(
                    "componentUpdate",
                    json!({ "components": definition.components }),
                );
            }
        }
    }
}
