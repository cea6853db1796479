//! Declarative argument schemas.
//!
//! A [`Schema`] names the arguments a command accepts and the IPLD kind
//! each one must carry. Validation is total: every problem in the
//! argument map is collected into one [`SchemaError`] rather than
//! stopping at the first.

use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The IPLD data kind an argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// A boolean.
    Bool,
    /// An integer.
    Integer,
    /// A floating point number.
    Float,
    /// A UTF-8 string.
    String,
    /// A byte string.
    Bytes,
    /// A list of arbitrary IPLD values.
    List,
    /// A map with string keys.
    Map,
    /// A CID link.
    Link,
}

impl Kind {
    /// Whether `value` carries this kind.
    #[must_use]
    pub const fn matches(&self, value: &Ipld) -> bool {
        matches!(
            (self, value),
            (Kind::Bool, Ipld::Bool(_))
                | (Kind::Integer, Ipld::Integer(_))
                | (Kind::Float, Ipld::Float(_))
                | (Kind::String, Ipld::String(_))
                | (Kind::Bytes, Ipld::Bytes(_))
                | (Kind::List, Ipld::List(_))
                | (Kind::Map, Ipld::Map(_))
                | (Kind::Link, Ipld::Link(_))
        )
    }

    const fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Integer => "integer",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Link => "link",
        }
    }
}

/// One named argument in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// The kind the argument value must have.
    pub kind: Kind,
    /// Whether the argument must be present.
    pub required: bool,
}

impl Field {
    /// A field that must appear in the arguments.
    #[must_use]
    pub const fn required(kind: Kind) -> Self {
        Field {
            kind,
            required: true,
        }
    }

    /// A field that may be omitted.
    #[must_use]
    pub const fn optional(kind: Kind) -> Self {
        Field {
            kind,
            required: false,
        }
    }
}

/// Argument schema for a command: field name to [`Field`].
///
/// Arguments not named by the schema are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, Field>,
}

impl Schema {
    /// An empty schema, accepting only an empty argument map.
    #[must_use]
    pub const fn new() -> Self {
        Schema {
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, replacing any previous definition of the same name.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// The declared fields.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Field> {
        &self.fields
    }

    /// Check `arguments` against this schema.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] listing every missing required field,
    /// unknown field, and kind mismatch.
    pub fn validate(&self, arguments: &BTreeMap<String, Ipld>) -> Result<(), SchemaError> {
        let mut issues = Vec::new();

        for (name, field) in &self.fields {
            match arguments.get(name) {
                Some(value) if !field.kind.matches(value) => issues.push(Issue {
                    path: name.clone(),
                    message: format!("expected {}", field.kind.name()),
                }),
                None if field.required => issues.push(Issue {
                    path: name.clone(),
                    message: "required field is missing".to_string(),
                }),
                _ => {}
            }
        }

        for name in arguments.keys() {
            if !self.fields.contains_key(name) {
                issues.push(Issue {
                    path: name.clone(),
                    message: "unknown field".to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(SchemaError { issues })
        }
    }
}

/// One problem found while validating arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// The argument the problem is about.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The full set of problems found while validating arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid arguments: {}", .issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct SchemaError {
    /// Every issue found, in field order.
    pub issues: Vec<Issue>,
}
