//! OpenAPI 3.0 rendering of the startup description document.

use plinth_kernel::{ApiDocument, Constraint, FieldSchema, MethodDescription, ParamKind};
use serde_json::{Map, Value, json};

const OPENAPI_VERSION: &str = "3.0.3";

pub fn openapi_document(title: &str, version: &str, document: &ApiDocument) -> Value {
    let mut paths = Map::new();
    for method in document.root.all_methods() {
        paths.insert(route_for(method), json!({ "post": operation(method) }));
    }
    json!({
        "openapi": OPENAPI_VERSION,
        "info": { "title": title, "version": version },
        "paths": paths,
        "components": { "schemas": { "Error": error_schema() } },
    })
}

fn route_for(method: &MethodDescription) -> String {
    format!("/{}", method.path.replace('.', "/"))
}

fn operation(method: &MethodDescription) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in &method.parameters {
        properties.insert(field.name.clone(), field_schema(field));
        if field.required {
            required.push(Value::String(field.name.clone()));
        }
    }
    let mut body = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        body["required"] = Value::Array(required.clone());
    }
    let result = method.returns.as_ref().map(kind_schema).unwrap_or_else(|| json!({}));

    let mut op = json!({
        "operationId": method.path,
        "requestBody": {
            "required": !required.is_empty(),
            "content": { "application/json": { "schema": body } },
        },
        "responses": {
            "200": {
                "description": "success",
                "content": { "application/json": { "schema": {
                    "type": "object",
                    "properties": {
                        "status": { "type": "string", "enum": ["success"] },
                        "result": result,
                    },
                }}},
            },
            "404": error_response("unknown handler or method"),
            "422": error_response("arguments failed validation"),
            "500": error_response("handler failed"),
        },
    });
    if let Some(summary) = &method.description {
        op["summary"] = Value::String(summary.clone());
    }
    op
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } },
    })
}

fn error_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": { "type": "string", "enum": ["error"] },
            "error": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string" },
                    "message": { "type": "string" },
                    "fields": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "field": { "type": "string" },
                                "message": { "type": "string" },
                            },
                        },
                    },
                },
            },
        },
    })
}

fn kind_schema(kind: &ParamKind) -> Value {
    match kind {
        ParamKind::Str => json!({ "type": "string" }),
        ParamKind::Int => json!({ "type": "integer" }),
        ParamKind::Float => json!({ "type": "number" }),
        ParamKind::Bool => json!({ "type": "boolean" }),
        ParamKind::Json => json!({}),
        ParamKind::Choice(values) => json!({ "type": "string", "enum": values }),
    }
}

fn field_schema(field: &FieldSchema) -> Value {
    let mut schema = kind_schema(&field.kind);
    let Some(object) = schema.as_object_mut() else {
        return schema;
    };
    for constraint in &field.constraints {
        match *constraint {
            Constraint::Gt(v) => {
                object.insert("minimum".into(), json!(v));
                object.insert("exclusiveMinimum".into(), json!(true));
            }
            Constraint::Ge(v) => {
                object.insert("minimum".into(), json!(v));
            }
            Constraint::Lt(v) => {
                object.insert("maximum".into(), json!(v));
                object.insert("exclusiveMaximum".into(), json!(true));
            }
            Constraint::Le(v) => {
                object.insert("maximum".into(), json!(v));
            }
            Constraint::MinLen(n) => {
                object.insert("minLength".into(), json!(n));
            }
            Constraint::MaxLen(n) => {
                object.insert("maxLength".into(), json!(n));
            }
        }
    }
    if let Some(default) = &field.default {
        object.insert("default".into(), default.clone());
    }
    if let Some(description) = &field.description {
        object.insert("description".into(), json!(description));
    }
    schema
}
