//! JSON-Schema to TypeScript type conversion.
//!
//! The converter is a pure function over its inputs: every invocation-scoped
//! piece of state (the named-type table) lives on the converter instance,
//! and one converter is used per generated file.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::case::to_pascal_case;
use crate::error::CodegenError;
use crate::types::{TsProperty, TsType};

/// Converts JSON-Schema-like objects into [`TsType`] trees.
///
/// Named interfaces are recorded in conversion order, which is already
/// dependency order: nested property types are converted (and registered)
/// before the interface that refers to them.
#[derive(Default)]
pub struct SchemaConverter {
    named: Vec<TsType>,
    index: HashMap<String, usize>,
}

impl SchemaConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Named interface declarations recorded so far, in registration order.
    pub fn named_types(&self) -> &[TsType] {
        &self.named
    }

    /// Look up a previously registered named type.
    pub fn lookup(&self, name: &str) -> Option<&TsType> {
        self.index.get(name).map(|&i| &self.named[i])
    }

    /// Convert a schema object to a type tree, rooting generated names at
    /// `type_name`.
    pub fn convert(
        &mut self,
        schema: &Map<String, Value>,
        type_name: &str,
    ) -> Result<TsType, CodegenError> {
        if let Some(existing) = self.lookup(type_name) {
            return Ok(existing.clone());
        }

        let Some(schema_type) = schema.get("type") else {
            if let Some(members) = schema.get("oneOf").and_then(Value::as_array) {
                return self.convert_union(members, type_name, schema);
            }
            if let Some(members) = schema.get("anyOf").and_then(Value::as_array) {
                return self.convert_union(members, type_name, schema);
            }
            if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
                return self.convert_intersection(members, type_name, schema);
            }
            return Ok(TsType::any());
        };

        match schema_type {
            Value::String(kind) => self.convert_single(schema, kind, type_name),
            Value::Array(kinds) => self.convert_type_array(kinds, type_name),
            other => Err(CodegenError::InvalidSchema(format!(
                "'type' must be a string or array of strings, got {other}"
            ))),
        }
    }

    fn convert_single(
        &mut self,
        schema: &Map<String, Value>,
        kind: &str,
        type_name: &str,
    ) -> Result<TsType, CodegenError> {
        match kind {
            "string" => {
                if let Some(values) = schema.get("enum").and_then(Value::as_array) {
                    return Ok(self.convert_enum(values, type_name, schema));
                }
                Ok(TsType::primitive("string"))
            }
            "number" | "integer" => Ok(TsType::primitive("number")),
            "boolean" => Ok(TsType::primitive("boolean")),
            "null" => Ok(TsType::primitive("null")),
            "array" => self.convert_array(schema, type_name),
            "object" => self.convert_object(schema, type_name),
            _ => Ok(TsType::any()),
        }
    }

    /// `type: ["string", "null"]` and friends become a union of the
    /// primitive conversions.
    fn convert_type_array(
        &mut self,
        kinds: &[Value],
        type_name: &str,
    ) -> Result<TsType, CodegenError> {
        let mut members = Vec::with_capacity(kinds.len());
        for (i, kind) in kinds.iter().enumerate() {
            let Some(kind) = kind.as_str() else {
                continue;
            };
            let member = self.convert_single(&Map::new(), kind, &format!("{type_name}_{i}"))?;
            members.push(member);
        }

        match members.len() {
            0 => Ok(TsType::any()),
            1 => Ok(members.into_iter().next().unwrap_or_else(TsType::any)),
            _ => Ok(TsType::Union {
                name: type_name.to_string(),
                description: None,
                members,
            }),
        }
    }

    fn convert_object(
        &mut self,
        schema: &Map<String, Value>,
        type_name: &str,
    ) -> Result<TsType, CodegenError> {
        let description = description_of(schema);
        let properties = schema.get("properties").and_then(Value::as_object);

        if properties.is_none() {
            // Record<string, T> shapes: additionalProperties with a schema,
            // `additionalProperties: true`, or nothing at all.
            let raw = match schema.get("additionalProperties") {
                Some(Value::Object(value_schema)) => {
                    let value_type = self.convert(value_schema, &format!("{type_name}Value"))?;
                    format!("Record<string, {}>", value_type.inline())
                }
                _ => "Record<string, any>".to_string(),
            };
            let alias = TsType::Alias {
                name: type_name.to_string(),
                description,
                raw,
            };
            self.register(alias.clone());
            return Ok(alias);
        }

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut ts_properties = Vec::new();
        for (prop_name, prop_schema) in properties.into_iter().flatten() {
            let Some(prop_schema) = prop_schema.as_object() else {
                continue;
            };

            let prop_type_name = format!("{type_name}{}", to_pascal_case(prop_name));
            let prop_type = self.convert(prop_schema, &prop_type_name).map_err(|e| {
                CodegenError::Property {
                    name: prop_name.clone(),
                    reason: e.to_string(),
                }
            })?;

            ts_properties.push(TsProperty {
                name: prop_name.clone(),
                ty: prop_type,
                optional: !required.contains(&prop_name.as_str()),
                description: description_of(prop_schema),
            });
        }

        let interface = TsType::Interface {
            name: type_name.to_string(),
            description,
            properties: ts_properties,
        };
        self.register(interface.clone());
        Ok(interface)
    }

    fn convert_array(
        &mut self,
        schema: &Map<String, Value>,
        type_name: &str,
    ) -> Result<TsType, CodegenError> {
        let element = match schema.get("items").and_then(Value::as_object) {
            Some(items) => self.convert(items, &format!("{type_name}Item"))?,
            None => TsType::any(),
        };
        Ok(TsType::Array {
            element: Box::new(element),
        })
    }

    /// Enums become a union of literals.
    fn convert_enum(
        &mut self,
        values: &[Value],
        type_name: &str,
        schema: &Map<String, Value>,
    ) -> TsType {
        let members = values
            .iter()
            .map(|value| {
                let raw = match value {
                    // JSON string encoding doubles as a TS string literal.
                    Value::String(s) => {
                        serde_json::to_string(s).unwrap_or_else(|_| format!("{s:?}"))
                    }
                    other => other.to_string(),
                };
                TsType::Primitive { raw }
            })
            .collect();

        TsType::Union {
            name: type_name.to_string(),
            description: description_of(schema),
            members,
        }
    }

    /// `oneOf` / `anyOf` become a union of the member conversions.
    fn convert_union(
        &mut self,
        schemas: &[Value],
        type_name: &str,
        schema: &Map<String, Value>,
    ) -> Result<TsType, CodegenError> {
        let mut members = Vec::with_capacity(schemas.len());
        for (i, member) in schemas.iter().enumerate() {
            let Some(member) = member.as_object() else {
                continue;
            };
            members.push(self.convert(member, &format!("{type_name}_{i}"))?);
        }

        match members.len() {
            0 => Ok(TsType::any()),
            1 => Ok(members.into_iter().next().unwrap_or_else(TsType::any)),
            _ => Ok(TsType::Union {
                name: type_name.to_string(),
                description: description_of(schema),
                members,
            }),
        }
    }

    /// `allOf` is realized as a flattened interface: the union of all member
    /// properties, with required flags OR'd across members.
    fn convert_intersection(
        &mut self,
        schemas: &[Value],
        type_name: &str,
        schema: &Map<String, Value>,
    ) -> Result<TsType, CodegenError> {
        let mut merged: Vec<TsProperty> = Vec::new();
        let mut description = description_of(schema);

        for (i, member) in schemas.iter().enumerate() {
            let Some(member) = member.as_object() else {
                continue;
            };
            let converted = self.convert(member, &format!("{type_name}_{i}"))?;
            let TsType::Interface {
                properties,
                description: member_description,
                ..
            } = converted
            else {
                continue;
            };

            if description.is_none() {
                description = member_description;
            }

            for property in properties {
                match merged.iter_mut().find(|p| p.name == property.name) {
                    Some(existing) => {
                        // Required in any member wins.
                        existing.optional = existing.optional && property.optional;
                    }
                    None => merged.push(property),
                }
            }
        }

        let interface = TsType::Interface {
            name: type_name.to_string(),
            description,
            properties: merged,
        };
        self.register(interface.clone());
        Ok(interface)
    }

    fn register(&mut self, ty: TsType) {
        let Some(name) = ty.name().map(str::to_string) else {
            return;
        };
        if self.index.contains_key(&name) {
            return;
        }
        self.index.insert(name, self.named.len());
        self.named.push(ty);
    }
}

fn description_of(schema: &Map<String, Value>) -> Option<String> {
    schema
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test schema is an object")
    }

    #[test]
    fn converts_primitives() {
        let mut sc = SchemaConverter::new();
        let ty = sc.convert(&object(json!({"type": "string"})), "T").unwrap();
        assert_eq!(ty, TsType::primitive("string"));

        let ty = sc.convert(&object(json!({"type": "integer"})), "U").unwrap();
        assert_eq!(ty, TsType::primitive("number"));

        let ty = sc.convert(&object(json!({"type": "null"})), "V").unwrap();
        assert_eq!(ty, TsType::primitive("null"));
    }

    #[test]
    fn missing_type_without_combinators_is_any() {
        let mut sc = SchemaConverter::new();
        let ty = sc.convert(&object(json!({})), "T").unwrap();
        assert_eq!(ty, TsType::any());
    }

    #[test]
    fn string_enum_becomes_literal_union() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({"type": "string", "enum": ["read", "write"]})),
                "Mode",
            )
            .unwrap();
        assert_eq!(ty.inline(), r#""read" | "write""#);
    }

    #[test]
    fn type_array_becomes_union() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(&object(json!({"type": ["string", "null"]})), "Maybe")
            .unwrap();
        assert_eq!(ty.inline(), "string | null");
    }

    #[test]
    fn array_of_objects_names_the_item_type() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "id": { "type": "number" } },
                        "required": ["id"]
                    }
                })),
                "Entries",
            )
            .unwrap();
        assert_eq!(ty.inline(), "EntriesItem[]");
        assert!(sc.lookup("EntriesItem").is_some());
    }

    #[test]
    fn array_without_items_is_any_array() {
        let mut sc = SchemaConverter::new();
        let ty = sc.convert(&object(json!({"type": "array"})), "T").unwrap();
        assert_eq!(ty.inline(), "any[]");
    }

    #[test]
    fn object_with_properties_tracks_required() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "head": { "type": "number" }
                    },
                    "required": ["path"]
                })),
                "Args",
            )
            .unwrap();

        let TsType::Interface { properties, .. } = ty else {
            panic!("expected interface");
        };
        let path = properties.iter().find(|p| p.name == "path").unwrap();
        let head = properties.iter().find(|p| p.name == "head").unwrap();
        assert!(!path.optional);
        assert!(head.optional);
    }

    #[test]
    fn additional_properties_schema_becomes_record() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({
                    "type": "object",
                    "additionalProperties": { "type": "number" }
                })),
                "Scores",
            )
            .unwrap();
        let TsType::Alias { raw, .. } = ty else {
            panic!("expected alias");
        };
        assert_eq!(raw, "Record<string, number>");
    }

    #[test]
    fn bare_object_becomes_any_record() {
        let mut sc = SchemaConverter::new();
        let ty = sc.convert(&object(json!({"type": "object"})), "Bag").unwrap();
        let TsType::Alias { raw, .. } = ty else {
            panic!("expected alias");
        };
        assert_eq!(raw, "Record<string, any>");
    }

    #[test]
    fn one_of_becomes_union() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({
                    "oneOf": [{ "type": "string" }, { "type": "number" }]
                })),
                "Id",
            )
            .unwrap();
        assert_eq!(ty.inline(), "string | number");
    }

    #[test]
    fn all_of_merges_properties_with_required_or() {
        let mut sc = SchemaConverter::new();
        let ty = sc
            .convert(
                &object(json!({
                    "allOf": [
                        {
                            "type": "object",
                            "properties": { "id": { "type": "string" } }
                        },
                        {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "label": { "type": "string" }
                            },
                            "required": ["id"]
                        }
                    ]
                })),
                "Merged",
            )
            .unwrap();

        let TsType::Interface { properties, .. } = ty else {
            panic!("expected interface");
        };
        assert_eq!(properties.len(), 2);
        let id = properties.iter().find(|p| p.name == "id").unwrap();
        assert!(!id.optional, "required in one member must win");
    }

    #[test]
    fn invalid_type_shape_errors() {
        let mut sc = SchemaConverter::new();
        let err = sc.convert(&object(json!({"type": 42})), "T").unwrap_err();
        assert!(matches!(err, CodegenError::InvalidSchema(_)));
    }

    #[test]
    fn nested_interfaces_register_before_parents() {
        let mut sc = SchemaConverter::new();
        sc.convert(
            &object(json!({
                "type": "object",
                "properties": {
                    "owner": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } }
                    }
                }
            })),
            "Repo",
        )
        .unwrap();

        let names: Vec<_> = sc.named_types().iter().filter_map(TsType::name).collect();
        assert_eq!(names, vec!["RepoOwner", "Repo"]);
    }
}
