use serde_json::json;

use super::ToolRegistry;
use crate::domain::models::ProtocolName;
use crate::domain::models::ToolName;

#[test]
fn it_declares_four_a2ui_tools() {
    let registry = ToolRegistry::for_protocol(ProtocolName::A2ui);

    assert_eq!(
        registry.names(),
        vec![
            ToolName::UpdateSurface,
            ToolName::DeleteSurface,
            ToolName::DataModelUpdate,
            ToolName::BeginRendering,
        ]
    );
    assert_eq!(registry.surface_tool(), ToolName::UpdateSurface);
    assert!(!registry.contains(ToolName::ComponentUpdate));
}

#[test]
fn it_declares_four_gulf_tools() {
    let registry = ToolRegistry::for_protocol(ProtocolName::Gulf);

    assert_eq!(
        registry.names(),
        vec![
            ToolName::ComponentUpdate,
            ToolName::DeleteSurface,
            ToolName::DataModelUpdate,
            ToolName::BeginRendering,
        ]
    );
    assert_eq!(registry.surface_tool(), ToolName::ComponentUpdate);
    assert!(!registry.contains(ToolName::UpdateSurface));
}

#[test]
fn it_requires_top_level_keys_in_schemas() {
    let registry = ToolRegistry::for_protocol(ProtocolName::A2ui);
    let update_surface = &registry.specs()[0];

    assert_eq!(
        update_surface.input_schema["required"],
        json!(["surfaceId", "definition"])
    );
    assert_eq!(
        update_surface.input_schema["properties"]["definition"]["required"],
        json!(["root", "components"])
    );
    assert_eq!(update_surface.output_schema["required"], json!(["status"]));

    let gulf = ToolRegistry::for_protocol(ProtocolName::Gulf);
    let data_model_update = &gulf.specs()[2];
    assert_eq!(data_model_update.input_schema["required"], json!(["contents"]));
    assert!(data_model_update.input_schema["properties"]
        .get("surfaceId")
        .is_none());
}

#[test]
fn it_acknowledges_without_side_effects() {
    let registry = ToolRegistry::for_protocol(ProtocolName::A2ui);
    let [update, delete, data, begin] = registry.specs() else {
        panic!("Expected four A2UI tools");
    };
    let input = json!({ "surfaceId": "s1" });

    assert_eq!(update.acknowledge(&input), json!({ "status": "updated" }));
    assert_eq!(update.acknowledge(&input), json!({ "status": "updated" }));
    assert_eq!(delete.acknowledge(&input), json!({ "status": "deleted" }));
    assert_eq!(data.acknowledge(&json!({ "contents": {} })), json!({ "status": "ok" }));
    assert_eq!(begin.acknowledge(&input), json!({ "status": "ok" }));
}

#[test]
fn it_acknowledges_gulf_tools_with_ok() {
    let registry = ToolRegistry::for_protocol(ProtocolName::Gulf);

    for spec in registry.specs() {
        assert_eq!(spec.acknowledge(&json!({})), json!({ "status": "ok" }));
    }
}
