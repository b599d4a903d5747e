//! GraphQL SDL scanning.
//!
//! Extracts the type definitions of a schema and, for object-like types,
//! their field names. This is enough to validate an app definition's
//! mappings; type checking of the schema itself is left to the query engine.

use crate::error::{AppDefinitionError, AppDefinitionResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(extend\s+)?(type|interface|input|enum|union|scalar)\s+([_A-Za-z][_0-9A-Za-z]*)")
        .expect("valid regex")
});

static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([_A-Za-z][_0-9A-Za-z]*)\s*:").expect("valid regex"));

/// The kind of a schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// `type`
    Object,
    /// `interface`
    Interface,
    /// `input`
    Input,
    /// `enum`
    Enum,
    /// `union`
    Union,
    /// `scalar`
    Scalar,
}

impl TypeKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "type" => Self::Object,
            "interface" => Self::Interface,
            "input" => Self::Input,
            "enum" => Self::Enum,
            "union" => Self::Union,
            "scalar" => Self::Scalar,
            _ => return None,
        })
    }

    const fn has_fields(self) -> bool {
        matches!(self, Self::Object | Self::Interface | Self::Input)
    }
}

/// A type declared by the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Kind of the type.
    pub kind: TypeKind,
    /// Declared field names, for object-like types.
    pub fields: Vec<String>,
}

impl TypeDefinition {
    /// Returns true if the type declares `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// A scanned schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    sdl: String,
    types: BTreeMap<String, TypeDefinition>,
}

impl SchemaDocument {
    /// Scans the SDL text.
    ///
    /// # Errors
    ///
    /// Fails if the text is empty, has unterminated strings or unbalanced
    /// brackets, defines a type twice, or does not declare a `Query` type
    /// with at least one field.
    pub fn parse(sdl: &str) -> AppDefinitionResult<Self> {
        let text = strip_comments_and_strings(sdl)?;
        if text.trim().is_empty() {
            return Err(AppDefinitionError::schema("the schema is empty"));
        }
        let depths = bracket_depths(&text)?;

        let definitions: Vec<_> = DEFINITION
            .captures_iter(&text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                (depths[whole.start()] == 0).then_some(caps)
            })
            .collect();

        let mut types: BTreeMap<String, TypeDefinition> = BTreeMap::new();
        for (i, caps) in definitions.iter().enumerate() {
            let extend = caps.get(1).is_some();
            let Some(kind) = caps.get(2).and_then(|m| TypeKind::from_keyword(m.as_str())) else {
                continue;
            };
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(3)) else {
                continue;
            };
            let next_start = definitions
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());

            let fields = if kind.has_fields() {
                field_names(&text[whole.end()..next_start])
            } else {
                Vec::new()
            };

            let name = name.as_str();
            match types.get_mut(name) {
                Some(existing) if extend => existing.fields.extend(fields),
                Some(_) => {
                    return Err(AppDefinitionError::schema(format!(
                        "'{name}' type tried to redefine an existing type"
                    )))
                }
                None => {
                    types.insert(name.to_string(), TypeDefinition { kind, fields });
                }
            }
        }

        match types.get("Query") {
            Some(query) if query.kind == TypeKind::Object && !query.fields.is_empty() => {}
            Some(_) => {
                return Err(AppDefinitionError::schema(
                    "type Query must declare at least one field",
                ))
            }
            None => {
                return Err(AppDefinitionError::schema(
                    "a schema MUST have a 'query' operation defined",
                ))
            }
        }

        Ok(Self {
            sdl: sdl.to_string(),
            types,
        })
    }

    /// Returns the SDL text.
    #[must_use]
    pub fn sdl(&self) -> &str {
        &self.sdl
    }

    /// Returns the definition of a type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Returns true if `name` is an object type.
    #[must_use]
    pub fn is_object(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.kind == TypeKind::Object)
    }

    /// Iterates over the declared type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

/// Field names declared in the first `{...}` block of `segment`.
fn field_names(segment: &str) -> Vec<String> {
    let Some(open) = segment.find('{') else {
        return Vec::new();
    };
    let mut depth = 0usize;
    let Some(close) = segment[open..].char_indices().find_map(|(i, c)| {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
        None
    }) else {
        return Vec::new();
    };

    // Arguments and directive arguments contain `name:` pairs too.
    let mut body = String::with_capacity(close - open);
    let mut parens = 0usize;
    for c in segment[open + 1..close].chars() {
        match c {
            '(' => parens += 1,
            ')' => parens = parens.saturating_sub(1),
            _ if parens == 0 => body.push(c),
            _ => {}
        }
    }

    FIELD
        .captures_iter(&body)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Replaces comments and string literals with blanks, keeping line breaks.
fn strip_comments_and_strings(sdl: &str) -> AppDefinitionResult<String> {
    let mut out = String::with_capacity(sdl.len());
    let mut rest = sdl;

    while let Some(c) = rest.chars().next() {
        if c == '#' {
            let end = rest.find('\n').unwrap_or(rest.len());
            out.push_str(&" ".repeat(end));
            rest = &rest[end..];
        } else if rest.starts_with("\"\"\"") {
            let Some(end) = rest[3..].find("\"\"\"") else {
                return Err(AppDefinitionError::schema("unterminated block string"));
            };
            let len = end + 6;
            out.push_str(&blank(&rest[..len]));
            rest = &rest[len..];
        } else if c == '"' {
            let mut len = None;
            let mut escaped = false;
            for (i, ch) in rest.char_indices().skip(1) {
                match ch {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        len = Some(i + 1);
                        break;
                    }
                    '\n' => break,
                    _ => escaped = false,
                }
            }
            let Some(len) = len else {
                return Err(AppDefinitionError::schema("unterminated string"));
            };
            out.push_str(&blank(&rest[..len]));
            rest = &rest[len..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    Ok(out)
}

fn blank(s: &str) -> String {
    s.chars().map(|c| if c == '\n' { '\n' } else { ' ' }).collect()
}

/// Brace depth at every byte offset of `text`.
fn bracket_depths(text: &str) -> AppDefinitionResult<Vec<usize>> {
    let mut depths = Vec::with_capacity(text.len() + 1);
    let mut stack = Vec::new();

    for (i, c) in text.char_indices() {
        while depths.len() < i {
            depths.push(stack.len());
        }
        depths.push(stack.len());
        match c {
            '{' | '(' | '[' => stack.push(c),
            '}' | ')' | ']' => {
                let expected = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                if stack.pop() != Some(expected) {
                    return Err(AppDefinitionError::schema(format!("unexpected '{c}'")));
                }
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(AppDefinitionError::schema("unbalanced brackets"));
    }
    depths.resize(text.len() + 1, 0);
    Ok(depths)
}
