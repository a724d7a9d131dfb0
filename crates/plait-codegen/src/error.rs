//! Codegen error types.

use thiserror::Error;

/// Errors raised while converting schemas or generating modules.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// A schema used a shape the converter does not recognize.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A property schema could not be converted.
    #[error("failed to convert property {name:?}: {reason}")]
    Property { name: String, reason: String },
}
