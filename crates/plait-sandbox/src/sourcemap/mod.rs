//! Source-map stack resolution: translate stack traces that reference
//! bundled code back to positions in the user's original source.

use tracing::warn;

use crate::error::SandboxError;

pub mod formatter;
pub mod parser;

use parser::StackFrame;

/// An original-source position recovered from the map. Line and column are
/// 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub file_name: String,
    pub line: u32,
    pub column: u32,
    pub function_name: Option<String>,
}

/// A parsed frame plus its mapping, when one was found.
#[derive(Debug, Clone)]
pub struct MappedFrame {
    pub frame: StackFrame,
    pub original: Option<OriginalPosition>,
}

/// Map every mappable frame of `stack` through `source_map` and reformat
/// the trace. Native and unmapped frames are emitted as-is.
pub fn map_stack_trace(source_map: &str, stack: &str) -> Result<String, SandboxError> {
    let map = sourcemap::SourceMap::from_slice(source_map.as_bytes())
        .map_err(|e| SandboxError::Serialization(format!("invalid source map: {e}")))?;

    let frames: Vec<MappedFrame> = parser::parse_stack_trace(stack)
        .into_iter()
        .map(|frame| map_frame(&map, frame))
        .collect();

    for frame in &frames {
        if frame.original.is_none() && !frame.frame.is_native && frame.frame.line.is_some() {
            warn!(
                file = %frame.frame.file_name,
                line = frame.frame.line.unwrap_or(0),
                column = frame.frame.column.unwrap_or(0),
                "failed to map stack position"
            );
        }
    }

    Ok(formatter::format_stack_trace(&frames))
}

/// Map one frame. Stack positions are 1-indexed; the consumer is queried
/// 0-indexed on both axes and results converted back.
fn map_frame(map: &sourcemap::SourceMap, frame: StackFrame) -> MappedFrame {
    let (Some(line), Some(column)) = (frame.line, frame.column) else {
        return MappedFrame {
            frame,
            original: None,
        };
    };
    if frame.is_native || line == 0 || column == 0 {
        return MappedFrame {
            frame,
            original: None,
        };
    }

    let original = map
        .lookup_token(line - 1, column - 1)
        .and_then(|token| {
            let file_name = token.get_source()?;
            Some(OriginalPosition {
                file_name: file_name.to_string(),
                line: token.get_src_line() + 1,
                column: token.get_src_col() + 1,
                function_name: token.get_name().map(str::to_string),
            })
        });

    MappedFrame { frame, original }
}
