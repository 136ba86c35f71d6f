use quarry::{schema::NoResolver, JsonSchema, SchemaError, ValidationError};
use serde_json::{json, Value as Json};
use std::collections::HashMap;

fn compile(schema: Json) -> JsonSchema {
    JsonSchema::compile(&schema).unwrap_or_else(|e| panic!("failed to compile schema: {e}"))
}

fn errors(schema: &JsonSchema, instance: Json) -> Vec<ValidationError> {
    schema.validate(&instance).err().unwrap_or_default()
}

fn keywords(schema: &JsonSchema, instance: Json) -> Vec<&'static str> {
    errors(schema, instance).iter().map(|e| e.keyword).collect()
}

#[test]
fn test_boolean_schemas() {
    assert!(compile(json!(true)).is_valid(&json!({"a": 1})));
    assert!(!compile(json!(false)).is_valid(&json!(null)));
    assert!(compile(json!({})).is_valid(&json!([1, "x"])));
}

#[test]
fn test_type() {
    let schema = compile(json!({"type": "integer"}));
    assert!(schema.is_valid(&json!(3)));
    assert!(schema.is_valid(&json!(3.0)));
    assert!(!schema.is_valid(&json!(3.5)));
    assert!(!schema.is_valid(&json!("3")));

    let schema = compile(json!({"type": ["string", "null"]}));
    assert!(schema.is_valid(&json!(null)));
    assert!(schema.is_valid(&json!("x")));
    let errors = errors(&schema, json!(1));
    assert_eq!(errors[0].message, "1 is not of type string or null");
}

#[test]
fn test_enum_and_const() {
    let schema = compile(json!({"enum": [1, "a", [true]]}));
    assert!(schema.is_valid(&json!(1.0)));
    assert!(schema.is_valid(&json!([true])));
    assert_eq!(keywords(&schema, json!("b")), ["enum"]);

    let schema = compile(json!({"const": {"a": [1, 2]}}));
    assert!(schema.is_valid(&json!({"a": [1, 2]})));
    assert_eq!(keywords(&schema, json!({"a": [2, 1]})), ["const"]);
}

#[test]
fn test_object_keywords() {
    let schema = compile(json!({
        "type": "object",
        "required": ["id", "name"],
        "properties": {
            "id": {"type": "integer"},
            "name": {"type": "string"}
        },
        "patternProperties": {"^x-": {"type": "string"}},
        "additionalProperties": false
    }));
    assert!(schema.is_valid(&json!({"id": 1, "name": "a", "x-tag": "t"})));

    let errors = errors(&schema, json!({"id": "1", "x-tag": 2, "extra": true}));
    let mut found: Vec<(&str, &str)> = errors
        .iter()
        .map(|e| (e.instance_location.as_str(), e.keyword))
        .collect();
    found.sort_unstable();
    assert_eq!(
        found,
        [("", "required"), ("/extra", "false"), ("/id", "type"), ("/x-tag", "type")]
    );
}

#[test]
fn test_property_names_and_dependencies() {
    let schema = compile(json!({
        "propertyNames": {"pattern": "ignored", "enum": ["a", "b", "c"]},
        "dependencies": {
            "a": ["b"],
            "c": {"required": ["a"]}
        }
    }));
    assert!(schema.is_valid(&json!({"a": 1, "b": 2})));
    assert_eq!(keywords(&schema, json!({"z": 1})), ["propertyNames"]);
    assert_eq!(keywords(&schema, json!({"a": 1})), ["dependencies"]);
    assert_eq!(keywords(&schema, json!({"c": 1})), ["required"]);
}

#[test]
fn test_array_keywords() {
    let schema = compile(json!({"items": {"type": "number"}, "uniqueItems": true}));
    assert!(schema.is_valid(&json!([1, 2, 3])));
    assert_eq!(keywords(&schema, json!([1, "2", 1.0])), ["type", "uniqueItems"]);
    assert_eq!(errors(&schema, json!([1, "2"]))[0].instance_location, "/1");

    let schema = compile(json!({
        "items": [{"type": "string"}, {"type": "integer"}],
        "additionalItems": false
    }));
    assert!(schema.is_valid(&json!(["a", 1])));
    assert!(schema.is_valid(&json!(["a"])));
    assert_eq!(keywords(&schema, json!(["a", 1, null])), ["false"]);

    let schema = compile(json!({"contains": {"const": 5}}));
    assert!(schema.is_valid(&json!([1, 5])));
    assert_eq!(keywords(&schema, json!([])), ["contains"]);
    assert!(schema.is_valid(&json!("not an array")));
}

#[test]
fn test_combinators() {
    let schema = compile(json!({"anyOf": [{"type": "string"}, {"type": "number"}]}));
    assert!(schema.is_valid(&json!(1)));
    assert_eq!(keywords(&schema, json!(null)), ["anyOf"]);

    let schema = compile(json!({"oneOf": [{"type": "integer"}, {"type": "number"}]}));
    assert!(schema.is_valid(&json!(1.5)));
    assert_eq!(keywords(&schema, json!(1)), ["oneOf"]);

    let schema = compile(json!({"allOf": [{"type": "integer"}, {"enum": [1, 2]}]}));
    assert_eq!(keywords(&schema, json!("x")), ["type", "enum"]);

    let schema = compile(json!({"not": {"type": "null"}}));
    assert!(schema.is_valid(&json!(0)));
    assert_eq!(keywords(&schema, json!(null)), ["not"]);
}

#[test]
fn test_conditional() {
    let schema = compile(json!({
        "if": {"properties": {"kind": {"const": "circle"}}},
        "then": {"required": ["radius"]},
        "else": {"required": ["width"]}
    }));
    assert!(schema.is_valid(&json!({"kind": "circle", "radius": 1})));
    assert!(schema.is_valid(&json!({"kind": "square", "width": 1})));
    assert_eq!(keywords(&schema, json!({"kind": "circle"})), ["required"]);
    assert_eq!(errors(&schema, json!({"kind": "square"}))[0].message, "'width' is a required property");
}

#[test]
fn test_references() {
    let schema = compile(json!({
        "definitions": {
            "positive": {"type": "integer", "not": {"const": 0}},
            "pair": {"type": "array", "items": {"$ref": "#/definitions/positive"}}
        },
        "$ref": "#/definitions/pair",
        "type": "string"
    }));
    assert!(schema.is_valid(&json!([1, 2])));
    assert_eq!(keywords(&schema, json!([1, 0])), ["not"]);

    let schema = compile(json!({
        "properties": {
            "a": {"items": {"type": "integer"}},
            "b": {"$ref": "#/properties/a/items"}
        }
    }));
    assert!(schema.is_valid(&json!({"b": 1})));
    assert!(!schema.is_valid(&json!({"b": "1"})));
}

#[test]
fn test_reference_escapes() {
    let schema = compile(json!({
        "definitions": {"a/b": {"type": "string"}, "c%d": {"type": "integer"}},
        "properties": {
            "x": {"$ref": "#/definitions/a~1b"},
            "y": {"$ref": "#/definitions/c%25d"}
        }
    }));
    assert!(schema.is_valid(&json!({"x": "s", "y": 1})));
    assert!(!schema.is_valid(&json!({"x": 1})));
    assert!(!schema.is_valid(&json!({"y": "s"})));
}

#[test]
fn test_id_scopes() {
    let schema = compile(json!({
        "$id": "http://example.com/root.json",
        "definitions": {
            "A": {"$id": "#foo", "type": "integer"},
            "B": {
                "$id": "other.json",
                "definitions": {"X": {"type": "string"}},
                "$ref": "#/definitions/X"
            }
        },
        "properties": {
            "a": {"$ref": "#foo"},
            "b": {"$ref": "other.json"},
            "c": {"$ref": "http://example.com/other.json#/definitions/X"}
        }
    }));
    assert!(schema.is_valid(&json!({"a": 1, "b": "x", "c": "y"})));
    assert_eq!(keywords(&schema, json!({"a": "1", "b": 2})), ["type", "type"]);
}

#[test]
fn test_external_documents_load_lazily() {
    let mut documents = HashMap::new();
    documents.insert(
        "http://example.com/item.json".to_string(),
        json!({"type": "object", "required": ["sku"]}),
    );
    let schema = JsonSchema::compile_with(
        &json!({"type": "array", "items": {"$ref": "http://example.com/item.json"}}),
        &documents,
    )
    .unwrap();
    assert!(schema.is_valid(&json!([{"sku": 1}])));
    assert_eq!(keywords(&schema, json!([{}])), ["required"]);
}

#[test]
fn test_unresolved_reference() {
    let result = JsonSchema::compile_with(&json!({"$ref": "http://example.com/missing.json"}), &NoResolver);
    assert!(matches!(result, Err(SchemaError::UnresolvedReference(_))));

    let result = JsonSchema::compile(&json!({"$ref": "#/definitions/nope"}));
    assert!(matches!(result, Err(SchemaError::UnresolvedReference(_))));
}

#[test]
fn test_invalid_schemas() {
    assert!(matches!(
        JsonSchema::compile(&json!({"type": "float"})),
        Err(SchemaError::InvalidSchema { .. })
    ));
    assert!(matches!(
        JsonSchema::compile(&json!({"patternProperties": {"(": {}}})),
        Err(SchemaError::InvalidSchema { .. })
    ));
    assert!(matches!(
        JsonSchema::compile(&json!(42)),
        Err(SchemaError::InvalidSchema { .. })
    ));
    assert!(matches!(
        JsonSchema::compile(&json!({"properties": {"a": {"$ref": "http://[bad"}}})),
        Err(SchemaError::InvalidUri { .. })
    ));
}

#[test]
fn test_error_display() {
    let schema = compile(json!({"properties": {"a": {"type": "string"}}}));
    let errors = errors(&schema, json!({"a": 1}));
    assert_eq!(errors[0].to_string(), "/a: 1 is not of type string (type)");
}
