//! TypeScript module emission for tool catalogs.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::case::{to_camel_case, to_pascal_case};
use crate::error::CodegenError;
use crate::schema::SchemaConverter;
use crate::types::{TsFunction, TsType};

/// The schema-shaped view of one tool that the generator consumes.
///
/// The client crate's `Tool` converts into this at the session layer, which
/// keeps codegen free of any transport types.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Map<String, Value>>,
    pub output_schema: Option<Map<String, Value>>,
}

/// Emits one typed module per tool plus the per-server and root index
/// files. A fresh [`SchemaConverter`] is used per module, so type names are
/// unique within a file and emission is deterministic.
#[derive(Default)]
pub struct TypeScriptGenerator;

impl TypeScriptGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate the complete module for one tool: argument interface (only
    /// when the input schema is non-empty), result type declaration (always
    /// present, degrading to an `any` alias), and the exported call stub.
    pub fn generate_function_file(
        &self,
        server_name: &str,
        tool: &ToolDefinition,
    ) -> Result<String, CodegenError> {
        let mut converter = SchemaConverter::new();
        let pascal = to_pascal_case(&tool.name);
        let mut extra_declarations: Vec<TsType> = Vec::new();

        // Argument type, only for a non-empty input schema.
        let args_type_name = format!("{pascal}Args");
        let args_type = match &tool.input_schema {
            Some(schema) if !schema.is_empty() => {
                let converted = converter.convert(schema, &args_type_name)?;
                Some(ensure_named(converted, &args_type_name, &mut extra_declarations))
            }
            _ => None,
        };

        // Result type: always declared; an absent or empty output schema
        // degrades to an alias to `any`.
        let return_type_name = format!("{pascal}Result");
        match &tool.output_schema {
            Some(schema) if !schema.is_empty() => {
                let converted = converter.convert(schema, &return_type_name)?;
                ensure_named(converted, &return_type_name, &mut extra_declarations);
            }
            _ => {
                extra_declarations.push(TsType::Alias {
                    name: return_type_name.clone(),
                    description: Some(
                        "No output schema defined - structure varies by implementation"
                            .to_string(),
                    ),
                    raw: "any".to_string(),
                });
            }
        }

        let function = TsFunction {
            name: to_camel_case(&tool.name),
            description: tool.description.clone(),
            server_name: server_name.to_string(),
            tool_name: tool.name.clone(),
            args_type: args_type.map(|_| args_type_name),
            return_type: return_type_name,
        };

        // The converter's table is already dependency-ordered: nested types
        // register before the types that reference them. Generator-created
        // declarations (degraded aliases, top-level unions) follow.
        let mut declarations = converter.named_types().to_vec();
        let mut seen: HashSet<String> = declarations
            .iter()
            .filter_map(|t| t.name().map(str::to_string))
            .collect();
        for declaration in extra_declarations {
            if let Some(name) = declaration.name() {
                if seen.insert(name.to_string()) {
                    declarations.push(declaration);
                }
            }
        }

        Ok(render_file(server_name, &declarations, &function))
    }

    /// Generate the `index.ts` for one server directory, re-exporting every
    /// tool module.
    pub fn generate_server_index(&self, server_name: &str, tools: &[ToolDefinition]) -> String {
        let mut out = String::new();
        out.push_str("/**\n");
        out.push_str(&format!(" * {server_name} MCP server tools\n"));
        out.push_str(" * This file is auto-generated. Do not edit manually.\n");
        out.push_str(" */\n\n");

        for tool in tools {
            let module = to_camel_case(&tool.name);
            out.push_str(&format!("export * from './{module}';\n"));
        }

        out
    }

    /// Generate the root `servers/index.ts`, re-exporting each server as a
    /// namespace under its own name.
    pub fn generate_root_index(&self, server_names: &[String]) -> String {
        let mut out = String::new();
        out.push_str("/**\n");
        out.push_str(" * All connected MCP servers.\n");
        out.push_str(" *\n");
        out.push_str(" * Import with the namespace pattern for clear call sites:\n");
        out.push_str(" *\n");
        out.push_str(" *   import * as github from './servers/github';\n");
        out.push_str(" *\n");
        out.push_str(" * This file is auto-generated. Do not edit manually.\n");
        out.push_str(" */\n\n");

        for server in server_names {
            out.push_str(&format!("export * as {server} from './{server}';\n"));
        }

        out
    }
}

/// Guarantee a top-level type has a declaration under `name`. Conversions
/// that come back inline (primitives, arrays, inline unions) are wrapped in
/// an alias; named types pass through and are queued for declaration if the
/// converter did not already register them.
fn ensure_named(converted: TsType, name: &str, extra: &mut Vec<TsType>) -> TsType {
    match converted.name() {
        Some(_) => {
            extra.push(converted.clone());
            converted
        }
        None => {
            let alias = TsType::Alias {
                name: name.to_string(),
                description: None,
                raw: converted.inline(),
            };
            extra.push(alias.clone());
            alias
        }
    }
}

fn render_file(server_name: &str, declarations: &[TsType], function: &TsFunction) -> String {
    let mut out = String::new();

    out.push_str("/**\n");
    out.push_str(&format!(
        " * Generated MCP tool definitions for: {server_name}\n"
    ));
    out.push_str(" * This file is auto-generated. Do not edit manually.\n");
    out.push_str(" */\n\n");

    for declaration in declarations {
        out.push_str(&render_type(declaration));
        out.push('\n');
    }

    out.push_str(&render_function(function));
    out
}

fn render_type(ty: &TsType) -> String {
    let mut out = String::new();

    match ty {
        TsType::Interface {
            name,
            description,
            properties,
        } => {
            push_doc_comment(&mut out, description.as_deref());
            out.push_str(&format!("export interface {name} {{\n"));
            for property in properties {
                if let Some(description) = &property.description {
                    out.push_str(&format!("  /** {} */\n", sanitize_comment(description)));
                }
                let optional = if property.optional { "?" } else { "" };
                out.push_str(&format!(
                    "  {}{optional}: {};\n",
                    property.name,
                    property.ty.inline()
                ));
            }
            out.push_str("}\n");
        }
        TsType::Alias {
            name,
            description,
            raw,
        } => {
            push_doc_comment(&mut out, description.as_deref());
            out.push_str(&format!("export type {name} = {raw};\n"));
        }
        TsType::Union {
            name,
            description,
            members,
        } => {
            push_doc_comment(&mut out, description.as_deref());
            let joined = members
                .iter()
                .map(TsType::inline)
                .collect::<Vec<_>>()
                .join(" | ");
            out.push_str(&format!("export type {name} = {joined};\n"));
        }
        // Unnamed types are referenced inline and never declared.
        TsType::Primitive { .. } | TsType::Array { .. } => {}
    }

    out
}

fn render_function(function: &TsFunction) -> String {
    let mut out = String::new();

    out.push_str("/**\n");
    match &function.description {
        Some(description) => {
            out.push_str(&format!(" * {}\n", sanitize_comment(description)));
        }
        None => out.push_str(&format!(" * Call tool: {}\n", function.tool_name)),
    }
    out.push_str(" *\n");
    out.push_str(" * Returns the parsed response - structure depends on the tool implementation.\n");
    out.push_str(" */\n");

    let params = match &function.args_type {
        Some(args_type) => format!("args: {args_type}"),
        None => String::new(),
    };
    let args_value = if function.args_type.is_some() {
        "args"
    } else {
        "{}"
    };

    out.push_str(&format!(
        "export async function {}({params}): Promise<{}> {{\n",
        function.name, function.return_type
    ));
    out.push_str(&format!(
        "  return callTool({:?}, {:?}, {args_value});\n",
        function.server_name, function.tool_name
    ));
    out.push_str("}\n");

    out
}

fn push_doc_comment(out: &mut String, description: Option<&str>) {
    if let Some(description) = description {
        out.push_str("/**\n");
        out.push_str(&format!(" * {}\n", sanitize_comment(description)));
        out.push_str(" */\n");
    }
}

/// Escape comment terminators so pass-through documentation cannot break the
/// surrounding JSDoc block.
fn sanitize_comment(comment: &str) -> String {
    comment.replace("*/", r"*\/").replace("/*", r"/\*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test schema is an object")
    }

    fn read_text_file_tool() -> ToolDefinition {
        ToolDefinition {
            name: "read_text_file".to_string(),
            description: Some("Read a file from disk".to_string()),
            input_schema: Some(schema(json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "head": { "type": "number" },
                    "tail": { "type": "number" }
                },
                "required": ["path"]
            }))),
            output_schema: None,
        }
    }

    #[test]
    fn generates_args_interface_and_degraded_result_alias() {
        let generator = TypeScriptGenerator::new();
        let file = generator
            .generate_function_file("fs", &read_text_file_tool())
            .unwrap();

        assert!(file.contains("export interface ReadTextFileArgs {"));
        assert!(file.contains("  path: string;"));
        assert!(file.contains("  head?: number;"));
        assert!(file.contains("  tail?: number;"));
        assert!(file.contains("export type ReadTextFileResult = any;"));
        assert!(file.contains(
            "export async function readTextFile(args: ReadTextFileArgs): Promise<ReadTextFileResult> {"
        ));
        assert!(file.contains(r#"return callTool("fs", "read_text_file", args);"#));
    }

    #[test]
    fn empty_input_schema_produces_no_args_interface() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "ping".to_string(),
            description: None,
            input_schema: Some(Map::new()),
            output_schema: None,
        };
        let file = generator.generate_function_file("fs", &tool).unwrap();

        assert!(!file.contains("PingArgs"));
        assert!(file.contains("export async function ping(): Promise<PingResult> {"));
        assert!(file.contains(r#"return callTool("fs", "ping", {});"#));
    }

    #[test]
    fn missing_output_schema_still_declares_result() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "noop".to_string(),
            description: None,
            input_schema: None,
            output_schema: None,
        };
        let file = generator.generate_function_file("fs", &tool).unwrap();
        assert!(file.contains("export type NoopResult = any;"));
    }

    #[test]
    fn structured_output_schema_becomes_interface() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "stat_file".to_string(),
            description: None,
            input_schema: None,
            output_schema: Some(schema(json!({
                "type": "object",
                "properties": { "size": { "type": "number" } },
                "required": ["size"]
            }))),
        };
        let file = generator.generate_function_file("fs", &tool).unwrap();
        assert!(file.contains("export interface StatFileResult {"));
        assert!(file.contains("  size: number;"));
    }

    #[test]
    fn nested_types_are_declared_before_first_reference() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "get_repo".to_string(),
            description: None,
            input_schema: Some(schema(json!({
                "type": "object",
                "properties": {
                    "owner": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } }
                    }
                }
            }))),
            output_schema: None,
        };
        let file = generator.generate_function_file("gh", &tool).unwrap();

        let owner_decl = file
            .find("export interface GetRepoArgsOwner")
            .expect("nested interface declared");
        let parent_ref = file
            .find("owner?: GetRepoArgsOwner;")
            .expect("parent references nested interface");
        assert!(owner_decl < parent_ref, "dependency must be declared first");
    }

    #[test]
    fn descriptions_are_sanitized() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "tricky".to_string(),
            description: Some("ends the comment */ maliciously /* maybe".to_string()),
            input_schema: None,
            output_schema: None,
        };
        let file = generator.generate_function_file("x", &tool).unwrap();
        assert!(file.contains(r"*\/"));
        assert!(file.contains(r"/\*"));
        assert!(!file.contains("maliciously */"));
    }

    #[test]
    fn generation_is_deterministic() {
        let generator = TypeScriptGenerator::new();
        let tool = read_text_file_tool();
        let first = generator.generate_function_file("fs", &tool).unwrap();
        let second = generator.generate_function_file("fs", &tool).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn enum_result_is_declared_as_literal_union() {
        let generator = TypeScriptGenerator::new();
        let tool = ToolDefinition {
            name: "get_mode".to_string(),
            description: None,
            input_schema: None,
            output_schema: Some(schema(json!({
                "type": "string",
                "enum": ["read", "write"]
            }))),
        };
        let file = generator.generate_function_file("fs", &tool).unwrap();
        assert!(file.contains(r#"export type GetModeResult = "read" | "write";"#));
    }

    #[test]
    fn server_index_reexports_each_tool() {
        let generator = TypeScriptGenerator::new();
        let tools = vec![
            ToolDefinition {
                name: "read_text_file".to_string(),
                description: None,
                input_schema: None,
                output_schema: None,
            },
            ToolDefinition {
                name: "write_file".to_string(),
                description: None,
                input_schema: None,
                output_schema: None,
            },
        ];
        let index = generator.generate_server_index("fs", &tools);
        assert!(index.contains("export * from './readTextFile';"));
        assert!(index.contains("export * from './writeFile';"));
    }

    #[test]
    fn root_index_reexports_namespaces() {
        let generator = TypeScriptGenerator::new();
        let index = generator
            .generate_root_index(&["fs".to_string(), "github".to_string()]);
        assert!(index.contains("export * as fs from './fs';"));
        assert!(index.contains("export * as github from './github';"));
    }
}
