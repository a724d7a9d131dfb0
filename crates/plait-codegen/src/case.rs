//! Identifier case conversion for generated TypeScript.

/// Convert a string to PascalCase, splitting on underscore, hyphen and
/// space.
pub fn to_pascal_case(s: &str) -> String {
    s.split(|c| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// Convert a string to camelCase. Inputs that already contain no separators
/// just get their first character lowercased, so PascalCase and camelCase
/// inputs pass through predictably.
pub fn to_camel_case(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    if !s.contains(['_', '-', ' ']) {
        return decapitalize(s);
    }
    decapitalize(&to_pascal_case(s))
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
