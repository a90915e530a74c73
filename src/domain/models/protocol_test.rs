use serde_json::json;

use super::BeginRendering;
use super::DataModelUpdate;
use super::DeleteSurface;
use super::ProtocolMessage;
use super::ProtocolName;
use super::SurfaceUpdate;

#[test]
fn it_parses_protocol_names() {
    assert_eq!(ProtocolName::parse("a2ui"), Some(ProtocolName::A2ui));
    assert_eq!(ProtocolName::parse("gulf"), Some(ProtocolName::Gulf));
    assert_eq!(ProtocolName::parse("A2UI"), None);
    assert_eq!(ProtocolName::A2ui.to_string(), "a2ui");
}

#[test]
fn it_serializes_messages_as_single_key_objects() {
    let update = ProtocolMessage::SurfaceUpdate(SurfaceUpdate {
        surface_id: "s1".to_string(),
        components: vec![json!({ "id": "w1", "component": { "Text": {} } })],
    });
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        json!({
            "surfaceUpdate": {
                "surfaceId": "s1",
                "components": [{ "id": "w1", "component": { "Text": {} } }]
            }
        })
    );

    let delete = ProtocolMessage::DeleteSurface(DeleteSurface {
        surface_id: "s1".to_string(),
    });
    insta::assert_snapshot!(serde_json::to_string(&delete).unwrap(), @r###"{"deleteSurface":{"surfaceId":"s1"}}"###);

    let text = ProtocolMessage::Text("Hello".to_string());
    insta::assert_snapshot!(serde_json::to_string(&text).unwrap(), @r###"{"text":"Hello"}"###);
}

#[test]
fn it_omits_absent_optional_fields() {
    let begin = ProtocolMessage::BeginRendering(BeginRendering {
        surface_id: None,
        root: "root".to_string(),
    });
    insta::assert_snapshot!(serde_json::to_string(&begin).unwrap(), @r###"{"beginRendering":{"root":"root"}}"###);

    let data = ProtocolMessage::DataModelUpdate(DataModelUpdate {
        surface_id: None,
        path: Some("user.name".to_string()),
        contents: json!("Ada"),
    });
    insta::assert_snapshot!(serde_json::to_string(&data).unwrap(), @r###"{"dataModelUpdate":{"path":"user.name","contents":"Ada"}}"###);
}

#[test]
fn it_names_message_kinds() {
    let begin = ProtocolMessage::BeginRendering(BeginRendering {
        surface_id: Some("s1".to_string()),
        root: "w1".to_string(),
    });
    assert_eq!(begin.kind(), "beginRendering");
    assert_eq!(ProtocolMessage::Text("".to_string()).kind(), "text");
}
