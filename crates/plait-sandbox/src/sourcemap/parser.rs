//! Stack-trace parsing.
//!
//! Recognizes the three frame shapes JavaScript engines emit, marks native
//! frames, and drops anything else so mapped output never echoes lines the
//! agent could misread as positions.

use regex::Regex;
use std::sync::LazyLock;

static NATIVE_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at\s+(.+?)\s+\(native\)").expect("static pattern"));

// at functionName (file:line:column)
static NAMED_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at\s+(.+?)\s+\((.+?):(\d+):(\d+)\)").expect("static pattern"));

// at file:line:column
static BARE_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at\s+(.+?):(\d+):(\d+)").expect("static pattern"));

// file:line:column with no "at"
static LOCATION_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?):(\d+):(\d+)$").expect("static pattern"));

/// One parsed stack frame. Line and column are 1-indexed when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// The raw line as it appeared, indentation included.
    pub raw: String,
    pub function_name: String,
    pub file_name: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub is_native: bool,
}

/// Parse a multi-line stack trace. Unrecognized lines are dropped.
pub fn parse_stack_trace(stack: &str) -> Vec<StackFrame> {
    stack.lines().filter_map(parse_stack_line).collect()
}

fn parse_stack_line(line: &str) -> Option<StackFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.contains("(native)") {
        let function_name = NATIVE_FRAME
            .captures(trimmed)
            .map_or("unknown", |captures| {
                captures.get(1).map_or("unknown", |m| m.as_str())
            });
        return Some(StackFrame {
            raw: line.to_string(),
            function_name: function_name.to_string(),
            file_name: "native".to_string(),
            line: None,
            column: None,
            is_native: true,
        });
    }

    if let Some(captures) = NAMED_FRAME.captures(trimmed) {
        return Some(StackFrame {
            raw: line.to_string(),
            function_name: captures[1].to_string(),
            file_name: captures[2].to_string(),
            line: captures[3].parse().ok(),
            column: captures[4].parse().ok(),
            is_native: false,
        });
    }

    if let Some(captures) = BARE_FRAME.captures(trimmed) {
        return Some(StackFrame {
            raw: line.to_string(),
            function_name: "<anonymous>".to_string(),
            file_name: captures[1].to_string(),
            line: captures[2].parse().ok(),
            column: captures[3].parse().ok(),
            is_native: false,
        });
    }

    if let Some(captures) = LOCATION_ONLY.captures(trimmed) {
        return Some(StackFrame {
            raw: line.to_string(),
            function_name: "<anonymous>".to_string(),
            file_name: captures[1].to_string(),
            line: captures[2].parse().ok(),
            column: captures[3].parse().ok(),
            is_native: false,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_frames() {
        let frames = parse_stack_trace("    at exec (main.js:2:11)");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function_name, "exec");
        assert_eq!(frames[0].file_name, "main.js");
        assert_eq!(frames[0].line, Some(2));
        assert_eq!(frames[0].column, Some(11));
    }

    #[test]
    fn parses_bare_frames_as_anonymous() {
        let frames = parse_stack_trace("    at main.js:3:5");
        assert_eq!(frames[0].function_name, "<anonymous>");
        assert_eq!(frames[0].line, Some(3));
    }

    #[test]
    fn parses_location_only_lines() {
        let frames = parse_stack_trace("main.js:10:2");
        assert_eq!(frames[0].file_name, "main.js");
        assert_eq!(frames[0].line, Some(10));
    }

    #[test]
    fn marks_native_frames() {
        let frames = parse_stack_trace("    at map (native)");
        assert!(frames[0].is_native);
        assert_eq!(frames[0].function_name, "map");
        assert!(frames[0].line.is_none());
    }

    #[test]
    fn drops_unrecognized_lines() {
        let frames = parse_stack_trace("Error: boom\n    at exec (main.js:2:1)\nsome noise");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].function_name, "exec");
    }

    #[test]
    fn preserves_raw_indentation() {
        let frames = parse_stack_trace("        at exec (main.js:2:1)");
        assert!(frames[0].raw.starts_with("        "));
    }
}
