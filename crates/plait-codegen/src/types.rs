//! The language-neutral type tree produced by schema conversion.

/// A TypeScript type as produced by [`crate::SchemaConverter`].
///
/// Named variants (`Interface`, `Alias`, `Union`) become declarations in the
/// generated file; `Primitive` and `Array` are always rendered inline.
#[derive(Debug, Clone, PartialEq)]
pub enum TsType {
    /// A raw inline type: `string`, `number`, `boolean`, `null`, `any`, or
    /// a literal such as `"north"`.
    Primitive { raw: String },

    /// `export interface Name { … }`
    Interface {
        name: String,
        description: Option<String>,
        properties: Vec<TsProperty>,
    },

    /// `export type Name = <raw>;`
    Alias {
        name: String,
        description: Option<String>,
        raw: String,
    },

    /// `element[]`
    Array { element: Box<TsType> },

    /// `export type Name = A | B | …;` when declared, `A | B | …` inline.
    Union {
        name: String,
        description: Option<String>,
        members: Vec<TsType>,
    },
}

impl TsType {
    /// Inline `any`.
    pub fn any() -> Self {
        Self::Primitive {
            raw: "any".to_string(),
        }
    }

    pub fn primitive(raw: impl Into<String>) -> Self {
        Self::Primitive { raw: raw.into() }
    }

    /// The declaration name, if this type is a named declaration.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Interface { name, .. } | Self::Alias { name, .. } | Self::Union { name, .. } => {
                Some(name)
            }
            Self::Primitive { .. } | Self::Array { .. } => None,
        }
    }

    /// Render this type as it appears in a position that references it:
    /// interfaces and aliases by name, unions and arrays structurally.
    pub fn inline(&self) -> String {
        match self {
            Self::Primitive { raw } => raw.clone(),
            Self::Interface { name, .. } | Self::Alias { name, .. } => name.clone(),
            Self::Array { element } => format!("{}[]", element.inline()),
            Self::Union { members, .. } => members
                .iter()
                .map(TsType::inline)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

/// One field of an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct TsProperty {
    pub name: String,
    pub ty: TsType,
    pub optional: bool,
    pub description: Option<String>,
}

/// The call stub emitted for one tool.
#[derive(Debug, Clone)]
pub struct TsFunction {
    /// camelCase export identifier.
    pub name: String,
    pub description: Option<String>,
    pub server_name: String,
    pub tool_name: String,
    /// Name of the argument interface, or `None` when the tool takes no
    /// arguments.
    pub args_type: Option<String>,
    /// Name of the result type declaration.
    pub return_type: String,
}
