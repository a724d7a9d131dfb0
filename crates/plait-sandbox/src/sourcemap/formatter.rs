//! Formatting mapped frames back into a readable trace.

use super::MappedFrame;

/// Format one frame. Unmapped and native frames come back exactly as they
/// appeared; mapped frames are rewritten with the original position while
/// keeping the raw line's indentation.
pub fn format_frame(frame: &MappedFrame) -> String {
    let Some(original) = &frame.original else {
        return frame.frame.raw.clone();
    };

    let function_name = original
        .function_name
        .as_deref()
        .unwrap_or(&frame.frame.function_name);

    let indent: String = frame
        .frame
        .raw
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();

    format!(
        "{indent}at {function_name} ({}:{}:{})",
        original.file_name, original.line, original.column
    )
}

/// Format a whole trace, one line per frame.
pub fn format_stack_trace(frames: &[MappedFrame]) -> String {
    frames
        .iter()
        .map(format_frame)
        .collect::<Vec<_>>()
        .join("\n")
}
