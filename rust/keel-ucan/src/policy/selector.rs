//! jq-style selectors over invocation arguments.

use ipld_core::ipld::Ipld;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, map, opt},
    multi::many1,
    sequence::{delimited, pair, preceded, separated_pair},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// One step of a [`Selector`] path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Map field access: `.name`.
    Field {
        /// The field name.
        name: String,
        /// Whether the step is marked `?`.
        optional: bool,
    },

    /// List index access: `[2]`, negative counts from the end.
    Index {
        /// The index.
        index: i64,
        /// Whether the step is marked `?`.
        optional: bool,
    },

    /// List slice: `[1:3]`, either end may be omitted.
    Slice {
        /// Inclusive start, defaulting to the list's start.
        start: Option<i64>,
        /// Exclusive end, defaulting to the list's end.
        end: Option<i64>,
        /// Whether the step is marked `?`.
        optional: bool,
    },

    /// Value enumeration: `[]` turns a list or map into its values.
    Values {
        /// Whether the step is marked `?`.
        optional: bool,
    },
}

impl Segment {
    const fn optional(&self) -> bool {
        match self {
            Segment::Field { optional, .. }
            | Segment::Index { optional, .. }
            | Segment::Slice { optional, .. }
            | Segment::Values { optional } => *optional,
        }
    }
}

/// A parsed selector path like `.escalate` or `.msg.cc[0:2]`.
///
/// The identity selector `.` yields the arguments unchanged. Each
/// further [`Segment`] narrows the value; a failing step marked `?`
/// resolves the whole selector to `null` instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector(Vec<Segment>);

impl Selector {
    /// The identity selector `.`.
    #[must_use]
    pub const fn identity() -> Self {
        Selector(Vec::new())
    }

    /// The selector's segments. Empty for the identity.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Resolve this selector against a value.
    ///
    /// # Errors
    ///
    /// Returns a [`SelectorError`] naming the first failing step, unless
    /// that step is optional, in which case the result is `Ipld::Null`.
    pub fn resolve(&self, data: &Ipld) -> Result<Ipld, SelectorError> {
        let mut current = data.clone();
        for segment in &self.0 {
            match apply(segment, current) {
                Ok(value) => current = value,
                Err(_) if segment.optional() => return Ok(Ipld::Null),
                Err(error) => return Err(error),
            }
        }
        Ok(current)
    }
}

fn apply(segment: &Segment, value: Ipld) -> Result<Ipld, SelectorError> {
    match segment {
        Segment::Field { name, .. } => match value {
            Ipld::Map(mut map) => map
                .remove(name)
                .ok_or_else(|| SelectorError::MissingField(name.clone())),
            other => Err(SelectorError::NotAMap(kind_of(&other))),
        },
        Segment::Index { index, .. } => match value {
            Ipld::List(mut list) => {
                let resolved = resolve_index(*index, list.len())
                    .ok_or(SelectorError::IndexOutOfBounds {
                        index: *index,
                        length: list.len(),
                    })?;
                Ok(list.swap_remove(resolved))
            }
            other => Err(SelectorError::NotAList(kind_of(&other))),
        },
        Segment::Slice { start, end, .. } => match value {
            Ipld::List(list) => {
                let len = list.len();
                let from = start.map_or(0, |s| clamp_index(s, len));
                let to = end.map_or(len, |e| clamp_index(e, len));
                if from <= to {
                    Ok(Ipld::List(list[from..to].to_vec()))
                } else {
                    Ok(Ipld::List(Vec::new()))
                }
            }
            other => Err(SelectorError::NotAList(kind_of(&other))),
        },
        Segment::Values { .. } => match value {
            Ipld::List(list) => Ok(Ipld::List(list)),
            Ipld::Map(map) => Ok(Ipld::List(map.into_values().collect())),
            other => Err(SelectorError::NotACollection(kind_of(&other))),
        },
    }
}

/// Map a possibly negative index onto `0..length`.
fn resolve_index(index: i64, length: usize) -> Option<usize> {
    let length = i64::try_from(length).ok()?;
    let resolved = if index < 0 { length + index } else { index };
    if (0..length).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// Clamp a possibly negative slice bound into `0..=length`.
fn clamp_index(index: i64, length: usize) -> usize {
    let length_i = i64::try_from(length).unwrap_or(i64::MAX);
    let resolved = if index < 0 { length_i + index } else { index };
    usize::try_from(resolved.clamp(0, length_i)).unwrap_or(length)
}

fn kind_of(value: &Ipld) -> &'static str {
    match value {
        Ipld::Null => "null",
        Ipld::Bool(_) => "bool",
        Ipld::Integer(_) => "integer",
        Ipld::Float(_) => "float",
        Ipld::String(_) => "string",
        Ipld::Bytes(_) => "bytes",
        Ipld::List(_) => "list",
        Ipld::Map(_) => "map",
        Ipld::Link(_) => "link",
    }
}

/// Error resolving a selector step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    /// A `.field` step did not find the field.
    #[error("field {0:?} not present")]
    MissingField(String),

    /// A `.field` step was applied to a non-map.
    #[error("cannot select a field from a {0}")]
    NotAMap(&'static str),

    /// An `[n]` or `[n:m]` step was applied to a non-list.
    #[error("cannot index into a {0}")]
    NotAList(&'static str),

    /// A `[]` step was applied to a non-collection.
    #[error("cannot enumerate the values of a {0}")]
    NotACollection(&'static str),

    /// An `[n]` step pointed outside the list.
    #[error("index {index} out of bounds for a list of length {length}")]
    IndexOutOfBounds {
        /// The requested index.
        index: i64,
        /// The list's length.
        length: usize,
    },
}

/// Error when parsing a selector string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector: {0:?}")]
pub struct SelectorParseError(pub String);

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| nom_unicode::is_alphanumeric(c) || c == '_' || c == '-')(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, digits) = take_while1(|c: char| c.is_ascii_digit())(input)?;
    let Ok(magnitude) = digits.parse::<i64>() else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    };
    Ok((input, if sign.is_some() { -magnitude } else { magnitude }))
}

fn field_segment(input: &str) -> IResult<&str, Segment> {
    map(
        preceded(char('.'), pair(identifier, opt(char('?')))),
        |(name, optional)| Segment::Field {
            name: name.to_string(),
            optional: optional.is_some(),
        },
    )(input)
}

fn bracket_segment(input: &str) -> IResult<&str, Segment> {
    // Brackets may follow a dot (`.[]`) or attach directly (`.cc[0]`).
    let (input, _) = opt(char('.'))(input)?;
    let (input, inner) = delimited(
        char('['),
        opt(alt((
            map(
                separated_pair(opt(integer), char(':'), opt(integer)),
                |(start, end)| Segment::Slice {
                    start,
                    end,
                    optional: false,
                },
            ),
            map(integer, |index| Segment::Index {
                index,
                optional: false,
            }),
        ))),
        char(']'),
    )(input)?;
    let (input, optional) = opt(char('?'))(input)?;

    let optional = optional.is_some();
    let segment = match inner {
        None => Segment::Values { optional },
        Some(Segment::Index { index, .. }) => Segment::Index { index, optional },
        Some(Segment::Slice { start, end, .. }) => Segment::Slice {
            start,
            end,
            optional,
        },
        Some(other) => other,
    };
    Ok((input, segment))
}

impl FromStr for Selector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Selector::identity());
        }
        if !s.starts_with('.') && !s.starts_with('[') {
            return Err(SelectorParseError(s.to_string()));
        }
        match all_consuming(many1(alt((field_segment, bracket_segment))))(s) {
            Ok((_, segments)) => Ok(Selector(segments)),
            Err(_) => Err(SelectorParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for segment in &self.0 {
            match segment {
                Segment::Field { name, optional } => {
                    write!(f, ".{name}{}", if *optional { "?" } else { "" })?;
                }
                Segment::Index { index, optional } => {
                    write!(f, "[{index}]{}", if *optional { "?" } else { "" })?;
                }
                Segment::Slice {
                    start,
                    end,
                    optional,
                } => {
                    f.write_str("[")?;
                    if let Some(start) = start {
                        write!(f, "{start}")?;
                    }
                    f.write_str(":")?;
                    if let Some(end) = end {
                        write!(f, "{end}")?;
                    }
                    write!(f, "]{}", if *optional { "?" } else { "" })?;
                }
                Segment::Values { optional } => {
                    write!(f, "[]{}", if *optional { "?" } else { "" })?;
                }
            }
        }
        Ok(())
    }
}

impl Serialize for Selector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
