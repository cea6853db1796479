//! UCAN Command paths.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::all_consuming,
    multi::separated_list1,
    sequence::preceded,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A slash-delimited command path like `/crud/read`.
///
/// Commands form a hierarchy: `/crud` covers `/crud/read`, and the root
/// command `/` covers everything. A delegation's command bounds what its
/// audience may invoke or re-delegate; [`starts_with`][Command::starts_with]
/// is that containment test.
///
/// The textual form must start with `/`, be lowercase, contain no empty
/// segments, and not end with `/` (unless it is exactly the root `/`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Command(Vec<String>);

impl Command {
    /// The root command `/`, covering every command.
    #[must_use]
    pub const fn root() -> Self {
        Command(Vec::new())
    }

    /// Create a command from its segments. An empty list is the root.
    #[must_use]
    pub fn new(segments: impl IntoIterator<Item = String>) -> Self {
        Command(segments.into_iter().collect())
    }

    /// The command's path segments. Empty for the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` falls within the scope of `prefix`.
    ///
    /// True when `prefix`'s segments are a leading run of `self`'s. Every
    /// command is within its own scope, and everything is within `/`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Command) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Iterate over this command and all of its ancestors, ending at the
    /// root: `/a/b` yields `/a/b`, `/a`, `/`.
    pub fn ancestors(&self) -> impl Iterator<Item = Command> + '_ {
        (0..=self.0.len())
            .rev()
            .map(|n| Command(self.0[..n].to_vec()))
    }
}

impl From<Vec<String>> for Command {
    fn from(segments: Vec<String>) -> Self {
        Command(segments)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Error when parsing a command path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    /// The input was empty.
    #[error("command must not be empty")]
    Empty,

    /// The input did not start with `/`.
    #[error("command must start with '/': {0:?}")]
    MissingLeadingSlash(String),

    /// The input ended with `/` but was not the root command.
    #[error("command must not end with '/': {0:?}")]
    TrailingSlash(String),

    /// The input contained an empty segment (`//`).
    #[error("command must not contain empty segments: {0:?}")]
    EmptySegment(String),

    /// The input contained uppercase characters.
    #[error("command must be lowercase: {0:?}")]
    NotLowercase(String),
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '/')(input)
}

fn command_path(input: &str) -> IResult<&str, Vec<&str>> {
    preceded(char('/'), separated_list1(char('/'), segment))(input)
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CommandParseError::Empty);
        }
        if !s.starts_with('/') {
            return Err(CommandParseError::MissingLeadingSlash(s.to_string()));
        }
        if s == "/" {
            return Ok(Command::root());
        }
        if s.chars().any(char::is_uppercase) {
            return Err(CommandParseError::NotLowercase(s.to_string()));
        }
        if s.ends_with('/') {
            return Err(CommandParseError::TrailingSlash(s.to_string()));
        }

        match all_consuming(command_path)(s) {
            Ok((_, segments)) => Ok(Command(
                segments.into_iter().map(ToString::to_string).collect(),
            )),
            // The remaining way to fail after the checks above is `//`
            Err(_) => Err(CommandParseError::EmptySegment(s.to_string())),
        }
    }
}

impl Serialize for Command {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
