#![allow(dead_code)]

use ferrum_models::StructureDefinition;
use ferrum_tree::{
    EventAccumulator, FhirTreeData, RenderContext, Result, StructureDefinitionTreeDataProvider,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn structure_definition(snapshot: Vec<Value>, differential: Vec<Value>) -> StructureDefinition {
    StructureDefinition::from_value(&json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/fhir/StructureDefinition/test-profile",
        "name": "TestProfile",
        "fhirVersion": "3.0.1",
        "kind": "resource",
        "snapshot": { "element": snapshot },
        "differential": { "element": differential }
    }))
    .expect("Failed to parse test StructureDefinition")
}

/// Builds both trees of `sd`
pub fn build(
    sd: &StructureDefinition,
    events: &EventAccumulator,
) -> Result<(Arc<FhirTreeData>, FhirTreeData)> {
    let ctx = RenderContext::new(events);
    let provider = StructureDefinitionTreeDataProvider::new(sd)?;
    let snapshot = provider.snapshot_tree_data(&ctx)?;
    let differential = provider.differential_tree_data(Arc::clone(&snapshot), &ctx)?;
    Ok((snapshot, differential))
}

pub fn snapshot_only(
    sd: &StructureDefinition,
    events: &EventAccumulator,
) -> Result<Arc<FhirTreeData>> {
    let ctx = RenderContext::new(events);
    StructureDefinitionTreeDataProvider::new(sd)?.snapshot_tree_data(&ctx)
}

pub fn element(id: &str, path: &str, min: u32, max: &str) -> Value {
    json!({ "id": id, "path": path, "min": min, "max": max })
}

pub fn typed(id: &str, path: &str, min: u32, max: &str, code: &str) -> Value {
    json!({ "id": id, "path": path, "min": min, "max": max, "type": [{ "code": code }] })
}

/// `Patient` with `identifier` sliced on `system` into `NHS` and `Local`
pub fn sliced_patient_snapshot() -> Vec<Value> {
    vec![
        element("Patient", "Patient", 0, "*"),
        json!({
            "id": "Patient.identifier",
            "path": "Patient.identifier",
            "min": 0,
            "max": "*",
            "type": [{ "code": "Identifier" }],
            "slicing": {
                "discriminator": [{ "type": "value", "path": "system" }],
                "rules": "open"
            }
        }),
        typed("Patient.identifier.system", "Patient.identifier.system", 0, "1", "uri"),
        json!({
            "id": "Patient.identifier:NHS",
            "path": "Patient.identifier",
            "sliceName": "NHS",
            "min": 0,
            "max": "1",
            "type": [{ "code": "Identifier" }]
        }),
        json!({
            "id": "Patient.identifier:NHS.system",
            "path": "Patient.identifier.system",
            "min": 1,
            "max": "1",
            "type": [{ "code": "uri" }],
            "fixedUri": "nhs-number-system"
        }),
        json!({
            "id": "Patient.identifier:Local",
            "path": "Patient.identifier",
            "sliceName": "Local",
            "min": 0,
            "max": "*",
            "type": [{ "code": "Identifier" }]
        }),
        json!({
            "id": "Patient.identifier:Local.system",
            "path": "Patient.identifier.system",
            "min": 1,
            "max": "1",
            "type": [{ "code": "uri" }],
            "fixedUri": "local-system"
        }),
        typed("Patient.name", "Patient.name", 0, "*", "HumanName"),
        typed("Patient.name.family", "Patient.name.family", 0, "1", "string"),
    ]
}

/// `Questionnaire.item.item` refers back to `Questionnaire.item`
pub fn questionnaire_snapshot() -> Vec<Value> {
    vec![
        element("Questionnaire", "Questionnaire", 0, "*"),
        typed("Questionnaire.item", "Questionnaire.item", 0, "*", "BackboneElement"),
        typed("Questionnaire.item.linkId", "Questionnaire.item.linkId", 1, "1", "string"),
        json!({
            "id": "Questionnaire.item.item",
            "path": "Questionnaire.item.item",
            "min": 0,
            "max": "*",
            "contentReference": "#Questionnaire.item"
        }),
    ]
}

/// A complex extension with `Extension.extension` sliced on `url` into `a` and `b`
pub fn complex_extension_snapshot() -> Vec<Value> {
    vec![
        element("Extension", "Extension", 0, "*"),
        json!({
            "id": "Extension.extension",
            "path": "Extension.extension",
            "min": 0,
            "max": "*",
            "type": [{ "code": "Extension" }],
            "slicing": {
                "discriminator": [{ "type": "value", "path": "url" }],
                "rules": "open"
            }
        }),
        json!({
            "id": "Extension.extension:a",
            "path": "Extension.extension",
            "sliceName": "a",
            "min": 0,
            "max": "1",
            "type": [{ "code": "Extension" }]
        }),
        json!({
            "id": "Extension.extension:a.url",
            "path": "Extension.extension.url",
            "min": 1,
            "max": "1",
            "type": [{ "code": "uri" }],
            "fixedUri": "a"
        }),
        json!({
            "id": "Extension.extension:b",
            "path": "Extension.extension",
            "sliceName": "b",
            "min": 0,
            "max": "1",
            "type": [{ "code": "Extension" }]
        }),
        json!({
            "id": "Extension.extension:b.url",
            "path": "Extension.extension.url",
            "min": 1,
            "max": "1",
            "type": [{ "code": "uri" }],
            "fixedUri": "b"
        }),
        json!({
            "id": "Extension.url",
            "path": "Extension.url",
            "min": 1,
            "max": "1",
            "type": [{ "code": "uri" }],
            "fixedUri": "http://example.org/fhir/StructureDefinition/complex"
        }),
    ]
}
