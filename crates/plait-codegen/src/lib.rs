//! # plait-codegen
//!
//! Turns downstream tool catalogs into typed TypeScript modules: a
//! [`SchemaConverter`] maps JSON-Schema-like objects onto a [`TsType`] tree,
//! and a [`TypeScriptGenerator`] emits one module per tool plus per-server
//! and root index files. Everything here is pure string generation; writing
//! the files to disk is the session layer's job.

pub mod case;
mod error;
mod generator;
mod schema;
mod types;

pub use error::CodegenError;
pub use generator::{ToolDefinition, TypeScriptGenerator};
pub use schema::SchemaConverter;
pub use types::{TsFunction, TsProperty, TsType};
