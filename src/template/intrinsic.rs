//! CloudFormation intrinsic functions as JSON builders.

use serde_json::{json, Value};

/// `{"Ref": id}`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [id, attribute]}`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::ImportValue": export}`
pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// `{"Fn::Select": [index, list]}`
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// `{"Fn::GetAZs": ""}`, the zones of the deployment region.
pub fn get_azs() -> Value {
    json!({ "Fn::GetAZs": "" })
}

/// `{"Fn::Join": [separator, parts]}`
pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// `{"Fn::Base64": value}`
pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}

/// The `AWS::Partition` pseudo parameter.
pub fn partition() -> Value {
    reference("AWS::Partition")
}

/// A resource referenced by an intrinsic, if `value` is one.
///
/// Returns the target of `Ref` (pseudo parameters excluded) and `Fn::GetAtt`.
pub fn referenced_id(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    if let Some(target) = object.get("Ref").and_then(Value::as_str) {
        return (!target.starts_with("AWS::")).then_some(target);
    }
    object
        .get("Fn::GetAtt")
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .and_then(Value::as_str)
}

/// Every logical ID referenced anywhere inside `value`.
pub fn collect_references<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    if let Some(target) = referenced_id(value) {
        out.push(target);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}
