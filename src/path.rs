//! Path expression resolution.
//!
//! A path expression is a dot separated list of field names resolved against a
//! [`FieldSchema`]:
//!
//! - `profile.name` addresses a nested field
//! - `items.{{itemId}}.count` substitutes the caller supplied `itemId`
//! - `scores[2]` or `scores.{{index}}` addresses a list position
//! - `profile.(name, age)` selects several siblings at once
//!
//! Resolution produces [`Chain`]s of typed [`PathElement`]s; escaping of names
//! for the wire is left to the [`expression`](crate::expression) builder.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::Error;
use crate::schema::{
    Chain, ContainerType, FieldHandle, FieldNode, FieldSchema, FieldShape, PathElement,
};

/// Values substituted for `{{name}}` placeholders.
pub type Substitutions = HashMap<String, Value>;

/// A chain together with the validation handle of the field it ends on.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Validation capability of the leaf field
    pub handle: FieldHandle,
    /// Location of the leaf field
    pub chain: Chain,
}

/// Result of resolving a path expression.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    /// A plain path
    Single(ResolvedField),
    /// A `(a, b, ...)` selector group, keyed by selector name in expression order
    Multi(Vec<(String, ResolvedField)>),
}

impl ResolvedTarget {
    /// Look up one member of a multi-selector by name.
    pub fn member(&self, name: &str) -> Option<&ResolvedField> {
        match self {
            ResolvedTarget::Single(_) => None,
            ResolvedTarget::Multi(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, field)| field),
        }
    }

    /// Every resolved field, in expression order.
    pub fn fields(&self) -> Vec<&ResolvedField> {
        match self {
            ResolvedTarget::Single(field) => vec![field],
            ResolvedTarget::Multi(members) => members.iter().map(|(_, field)| field).collect(),
        }
    }

    /// Unwrap a single target.
    pub fn into_single(self) -> Option<ResolvedField> {
        match self {
            ResolvedTarget::Single(field) => Some(field),
            ResolvedTarget::Multi(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RawSegment {
    Name(String),
    Bracket(String),
    Group(Vec<String>),
}

/// What the next segment is looked up in.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Fields(&'a FieldSchema),
    Node(&'a FieldNode),
    /// Set members have no children
    Closed,
}

/// Resolve `path` against `schema`.
///
/// # Example
///
/// ```
/// use dynamo_fields::path::{resolve, Substitutions};
/// use dynamo_fields::schema::{FieldNode, FieldSchema};
/// use serde_json::json;
///
/// let schema = FieldSchema::builder()
///     .field(FieldNode::dict("items", "itemId", FieldNode::scalar("value")))
///     .build()
///     .unwrap();
///
/// let mut substitutions = Substitutions::new();
/// substitutions.insert("itemId".to_string(), json!("a.b"));
///
/// let target = resolve("items.{{itemId}}", &schema, &substitutions).unwrap();
/// let field = target.into_single().unwrap();
/// assert_eq!(field.chain.joined_path(), "items.a.b");
/// ```
pub fn resolve(
    path: &str,
    schema: &FieldSchema,
    substitutions: &Substitutions,
) -> Result<ResolvedTarget, Error> {
    let segments = split_segments(path)?;
    let mut chain = Chain::default();
    let mut scope = Scope::Fields(schema);
    let mut handle = None;

    for (position, segment) in segments.iter().enumerate() {
        match segment {
            RawSegment::Group(names) => {
                if position + 1 != segments.len() {
                    return Err(invalid(path, "a selector group must be the last segment"));
                }

                let mut members = Vec::with_capacity(names.len());
                for name in names {
                    let (key, node) = step(path, scope, name, false, substitutions)?;
                    let mut member_chain = chain.clone();
                    member_chain.push(element_for(&key, node));
                    let member_name = key.display();
                    if members.iter().any(|(existing, _)| *existing == member_name) {
                        return Err(invalid(path, "duplicate selector in group"));
                    }
                    members.push((
                        member_name,
                        ResolvedField {
                            handle: node.handle().clone(),
                            chain: member_chain,
                        },
                    ));
                }
                return Ok(ResolvedTarget::Multi(members));
            }
            RawSegment::Name(text) | RawSegment::Bracket(text) => {
                let bracket = matches!(segment, RawSegment::Bracket(_));
                let (key, node) = step(path, scope, text, bracket, substitutions)?;
                chain.push(element_for(&key, node));
                handle = Some(node.handle().clone());
                scope = match key {
                    Key::Member(_) => Scope::Closed,
                    _ => Scope::Node(node),
                };
            }
        }
    }

    match handle {
        Some(handle) => Ok(ResolvedTarget::Single(ResolvedField { handle, chain })),
        None => Err(invalid(path, "empty path")),
    }
}

/// Resolve a path that must not contain a selector group.
pub fn resolve_single(
    path: &str,
    schema: &FieldSchema,
    substitutions: &Substitutions,
) -> Result<ResolvedField, Error> {
    resolve(path, schema, substitutions)?
        .into_single()
        .ok_or_else(|| invalid(path, "a selector group is not allowed here"))
}

enum Key {
    Name(String),
    Index(usize),
    /// Value inside a set
    Member(String),
}

impl Key {
    fn display(&self) -> String {
        match self {
            Key::Name(name) | Key::Member(name) => name.clone(),
            Key::Index(index) => index.to_string(),
        }
    }
}

fn element_for(key: &Key, node: &FieldNode) -> PathElement {
    match key {
        Key::Name(name) => PathElement::named(name.clone(), node.container())
            .with_default(node.custom_default().cloned()),
        Key::Index(index) => PathElement::indexed(*index, node.container())
            .with_default(node.custom_default().cloned()),
        Key::Member(member) => PathElement::named(member.clone(), ContainerType::Scalar),
    }
}

/// Resolve one segment inside `scope`.
fn step<'a>(
    path: &str,
    scope: Scope<'a>,
    text: &str,
    bracket: bool,
    substitutions: &Substitutions,
) -> Result<(Key, &'a FieldNode), Error> {
    let node = match scope {
        Scope::Fields(fields) => {
            if bracket {
                return Err(invalid(path, "list index applied to a map"));
            }
            let name = substitute(path, text, substitutions)?.into_text();
            let node = fields.field(&name).ok_or_else(|| Error::UnknownField {
                path: path.to_string(),
                segment: name.clone(),
            })?;
            return Ok((Key::Name(name), node));
        }
        Scope::Node(node) => node,
        Scope::Closed => {
            return Err(Error::UnknownField {
                path: path.to_string(),
                segment: text.to_string(),
            })
        }
    };

    match node.shape() {
        FieldShape::Map(children) => step(path, Scope::Fields(children), text, bracket, substitutions),
        FieldShape::Dict { value, .. } => {
            if bracket {
                return Err(invalid(path, "list index applied to a map"));
            }
            let key = substitute(path, text, substitutions)?.into_text();
            Ok((Key::Name(key), value))
        }
        FieldShape::List { item, .. } => {
            let index = match substitute(path, text, substitutions)? {
                Substituted::Value(Value::Number(number)) => number.as_u64(),
                Substituted::Value(_) => None,
                Substituted::Text(literal) => literal.parse::<u64>().ok(),
            }
            .and_then(|index| usize::try_from(index).ok())
            .ok_or_else(|| Error::InvalidListIndex {
                path: path.to_string(),
                value: text.to_string(),
            })?;
            Ok((Key::Index(index), item))
        }
        FieldShape::Set if !bracket => {
            // Set members are addressed by value and read as membership tests.
            let member = substitute(path, text, substitutions)?.into_text();
            Ok((Key::Member(member), node))
        }
        FieldShape::Set | FieldShape::Scalar => Err(Error::UnknownField {
            path: path.to_string(),
            segment: text.to_string(),
        }),
    }
}

enum Substituted {
    /// The whole segment was one placeholder
    Value(Value),
    Text(String),
}

impl Substituted {
    fn into_text(self) -> String {
        match self {
            Substituted::Value(value) => value_text(&value),
            Substituted::Text(text) => text,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Replace every `{{name}}` in `segment`.
fn substitute(path: &str, segment: &str, substitutions: &Substitutions) -> Result<Substituted, Error> {
    let lookup = |name: &str| {
        substitutions
            .get(name)
            .ok_or_else(|| Error::MissingSubstitution {
                path: path.to_string(),
                name: name.to_string(),
            })
    };

    if let Some(name) = segment
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .filter(|name| !name.contains("{{") && !name.contains("}}"))
    {
        return Ok(Substituted::Value(lookup(name.trim())?.clone()));
    }

    let mut output = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| invalid(path, "unterminated '{{' placeholder"))?;
        output.push_str(&value_text(lookup(after[..end].trim())?));
        rest = &after[end + 2..];
    }
    output.push_str(rest);

    Ok(Substituted::Text(output))
}

fn invalid(path: &str, reason: &str) -> Error {
    Error::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Split on `.` outside of parentheses and placeholders, then expand `[..]` suffixes.
fn split_segments(path: &str) -> Result<Vec<RawSegment>, Error> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0usize;
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                let _ = chars.next();
                current.push_str("{{");
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '}' && chars.peek() == Some(&'}') {
                        let _ = chars.next();
                        current.push_str("}}");
                        closed = true;
                        break;
                    }
                    current.push(inner);
                }
                if !closed {
                    return Err(invalid(path, "unterminated '{{' placeholder"));
                }
            }
            '(' => {
                paren_depth += 1;
                current.push(ch);
            }
            ')' => {
                paren_depth = paren_depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(path, "unbalanced ')'"))?;
                current.push(ch);
            }
            '.' if paren_depth == 0 => pieces.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if paren_depth != 0 {
        return Err(invalid(path, "unbalanced '('"));
    }
    pieces.push(current);

    let mut segments = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(invalid(path, "empty segment"));
        }

        if let Some(inner) = piece.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
            let names: Vec<String> = inner.split(',').map(|n| n.trim().to_string()).collect();
            if names.iter().any(|n| n.is_empty()) {
                return Err(invalid(path, "empty selector in group"));
            }
            segments.push(RawSegment::Group(names));
            continue;
        }

        match piece.find('[') {
            None => segments.push(RawSegment::Name(piece.to_string())),
            Some(0) => return Err(invalid(path, "list index without a field")),
            Some(start) => {
                segments.push(RawSegment::Name(piece[..start].to_string()));
                let mut rest = &piece[start..];
                while !rest.is_empty() {
                    let inner = rest
                        .strip_prefix('[')
                        .and_then(|r| r.find(']').map(|end| (&r[..end], &r[end + 1..])));
                    match inner {
                        Some((index, tail)) if !index.trim().is_empty() => {
                            segments.push(RawSegment::Bracket(index.trim().to_string()));
                            rest = tail;
                        }
                        _ => return Err(invalid(path, "malformed list index")),
                    }
                }
            }
        }
    }

    Ok(segments)
}
