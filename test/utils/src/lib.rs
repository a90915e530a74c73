use serde_json::json;
use serde_json::Value;

/// A small component catalog in the shape clients send at session start.
pub fn catalog_fixture() -> Value {
    return json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Component catalog",
        "type": "object",
        "properties": {
            "Column": {
                "type": "object",
                "properties": {
                    "children": {
                        "type": "object",
                        "properties": {
                            "explicitList": { "type": "array", "items": { "type": "string" } }
                        }
                    }
                }
            },
            "Text": {
                "type": "object",
                "properties": {
                    "text": {
                        "type": "object",
                        "properties": { "literalString": { "type": "string" } }
                    }
                }
            },
            "Button": {
                "type": "object",
                "properties": {
                    "label": { "type": "string" },
                    "action": { "type": "string" }
                },
                "required": ["label"]
            }
        }
    });
}

/// Renders Gemini `streamGenerateContent?alt=sse` events as a response body.
pub fn gemini_sse_body(events: &[Value]) -> String {
    return events
        .iter()
        .map(|event| return format!("data: {event}\r\n\r\n"))
        .collect::<Vec<String>>()
        .join("");
}

/// A single streamed Gemini event carrying the given content parts.
pub fn gemini_event(parts: Value, finish_reason: Option<&str>) -> Value {
    let mut candidate = json!({
        "content": { "role": "model", "parts": parts },
        "index": 0
    });
    if let Some(reason) = finish_reason {
        candidate["finishReason"] = json!(reason);
    }

    return json!({
        "candidates": [candidate],
        "modelVersion": "gemini-2.5-pro"
    });
}

/// Parses every `data:` line of an SSE response body as JSON.
pub fn sse_data(body: &str) -> Vec<Value> {
    return body
        .lines()
        .filter_map(|line| return line.strip_prefix("data:"))
        .filter_map(|data| return serde_json::from_str::<Value>(data.trim()).ok())
        .collect();
}
