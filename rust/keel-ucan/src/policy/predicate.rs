//! Policy predicates.

use super::selector::Selector;
use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize, ser::SerializeSeq};

/// A single policy statement over the invocation's arguments.
///
/// Statements are total: any evaluation failure — a selector that does
/// not resolve, a comparison between incompatible kinds — makes the
/// statement false rather than raising an error, so a policy can never
/// abort a check.
///
/// On the wire a statement is a tagged array, e.g.
/// `["==", ".status", "draft"]` or `["and", [s1, s2]]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `["==", selector, value]` — resolved value equals the literal.
    Equal(Selector, Ipld),

    /// `["!=", selector, value]` — resolved value differs from the literal.
    NotEqual(Selector, Ipld),

    /// `["<", selector, number]` — numeric strictly-less comparison.
    LessThan(Selector, Ipld),

    /// `["<=", selector, number]`.
    LessThanOrEqual(Selector, Ipld),

    /// `[">", selector, number]`.
    GreaterThan(Selector, Ipld),

    /// `[">=", selector, number]`.
    GreaterThanOrEqual(Selector, Ipld),

    /// `["like", selector, pattern]` — anchored glob match over a string.
    /// `*` matches any run of characters; `\*` is a literal asterisk.
    Like(Selector, String),

    /// `["not", statement]`.
    Not(Box<Predicate>),

    /// `["and", [statements]]` — all must hold; empty holds.
    And(Vec<Predicate>),

    /// `["or", [statements]]` — at least one must hold; empty holds
    /// vacuously.
    Or(Vec<Predicate>),

    /// `["all", selector, statement]` — the statement holds for every
    /// element of the selected collection; empty collections hold.
    All(Selector, Box<Predicate>),

    /// `["any", selector, statement]` — the statement holds for at least
    /// one element of the selected collection; empty collections fail.
    Any(Selector, Box<Predicate>),
}

impl Predicate {
    /// Evaluate this statement against invocation arguments.
    #[must_use]
    pub fn check(&self, arguments: &Ipld) -> bool {
        match self {
            Predicate::Equal(selector, value) => selector
                .resolve(arguments)
                .is_ok_and(|resolved| &resolved == value),
            Predicate::NotEqual(selector, value) => selector
                .resolve(arguments)
                .is_ok_and(|resolved| &resolved != value),
            Predicate::LessThan(selector, value) => compare(selector, arguments, value)
                .is_some_and(|ordering| ordering == std::cmp::Ordering::Less),
            Predicate::LessThanOrEqual(selector, value) => compare(selector, arguments, value)
                .is_some_and(|ordering| ordering != std::cmp::Ordering::Greater),
            Predicate::GreaterThan(selector, value) => compare(selector, arguments, value)
                .is_some_and(|ordering| ordering == std::cmp::Ordering::Greater),
            Predicate::GreaterThanOrEqual(selector, value) => compare(selector, arguments, value)
                .is_some_and(|ordering| ordering != std::cmp::Ordering::Less),
            Predicate::Like(selector, pattern) => {
                selector.resolve(arguments).is_ok_and(|resolved| {
                    if let Ipld::String(text) = resolved {
                        glob_match(pattern, &text)
                    } else {
                        false
                    }
                })
            }
            Predicate::Not(inner) => !inner.check(arguments),
            Predicate::And(statements) => {
                statements.iter().all(|statement| statement.check(arguments))
            }
            Predicate::Or(statements) => {
                statements.is_empty()
                    || statements.iter().any(|statement| statement.check(arguments))
            }
            Predicate::All(selector, statement) => match collection(selector, arguments) {
                Some(items) => items.iter().all(|item| statement.check(item)),
                None => false,
            },
            Predicate::Any(selector, statement) => match collection(selector, arguments) {
                Some(items) => items.iter().any(|item| statement.check(item)),
                None => false,
            },
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            Predicate::Equal(..) => "==",
            Predicate::NotEqual(..) => "!=",
            Predicate::LessThan(..) => "<",
            Predicate::LessThanOrEqual(..) => "<=",
            Predicate::GreaterThan(..) => ">",
            Predicate::GreaterThanOrEqual(..) => ">=",
            Predicate::Like(..) => "like",
            Predicate::Not(..) => "not",
            Predicate::And(..) => "and",
            Predicate::Or(..) => "or",
            Predicate::All(..) => "all",
            Predicate::Any(..) => "any",
        }
    }
}

/// Numeric comparison; `None` when either side is not a number.
fn compare(selector: &Selector, arguments: &Ipld, value: &Ipld) -> Option<std::cmp::Ordering> {
    let resolved = selector.resolve(arguments).ok()?;
    let left = as_number(&resolved)?;
    let right = as_number(value)?;
    left.partial_cmp(&right)
}

#[allow(clippy::cast_precision_loss)]
fn as_number(value: &Ipld) -> Option<f64> {
    match value {
        Ipld::Integer(i) => Some(*i as f64),
        Ipld::Float(f) => Some(*f),
        _ => None,
    }
}

/// Resolve a selector to the elements of a collection, for `all`/`any`.
fn collection(selector: &Selector, arguments: &Ipld) -> Option<Vec<Ipld>> {
    match selector.resolve(arguments).ok()? {
        Ipld::List(items) => Some(items),
        Ipld::Map(map) => Some(map.into_values().collect()),
        _ => None,
    }
}

/// Anchored glob match: `*` matches any run of characters and `\*`
/// matches a literal asterisk.
fn glob_match(pattern: &str, text: &str) -> bool {
    #[derive(PartialEq)]
    enum Token {
        Star,
        Literal(char),
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('*') => tokens.push(Token::Literal('*')),
                Some(other) => {
                    tokens.push(Token::Literal('\\'));
                    tokens.push(Token::Literal(other));
                }
                None => tokens.push(Token::Literal('\\')),
            },
            '*' => tokens.push(Token::Star),
            other => tokens.push(Token::Literal(other)),
        }
    }

    let text: Vec<char> = text.chars().collect();

    // Greedy match with backtracking to the most recent star.
    let (mut t, mut p) = (0usize, 0usize);
    let (mut star, mut star_t) = (None::<usize>, 0usize);
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Literal(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(Token::Star) => {
                star = Some(p);
                star_t = t;
                p += 1;
            }
            _ => match star {
                Some(star_p) => {
                    p = star_p + 1;
                    star_t += 1;
                    t = star_t;
                }
                None => return false,
            },
        }
    }
    while tokens.get(p) == Some(&Token::Star) {
        p += 1;
    }
    p == tokens.len()
}

impl Serialize for Predicate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let operator = self.operator();
        match self {
            Predicate::Equal(selector, value)
            | Predicate::NotEqual(selector, value)
            | Predicate::LessThan(selector, value)
            | Predicate::LessThanOrEqual(selector, value)
            | Predicate::GreaterThan(selector, value)
            | Predicate::GreaterThanOrEqual(selector, value) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(operator)?;
                seq.serialize_element(selector)?;
                seq.serialize_element(value)?;
                seq.end()
            }
            Predicate::Like(selector, pattern) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(operator)?;
                seq.serialize_element(selector)?;
                seq.serialize_element(pattern)?;
                seq.end()
            }
            Predicate::Not(statement) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(operator)?;
                seq.serialize_element(statement)?;
                seq.end()
            }
            Predicate::And(statements) | Predicate::Or(statements) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(operator)?;
                seq.serialize_element(statements)?;
                seq.end()
            }
            Predicate::All(selector, statement) | Predicate::Any(selector, statement) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(operator)?;
                seq.serialize_element(selector)?;
                seq.serialize_element(statement)?;
                seq.end()
            }
        }
    }
}

impl TryFrom<Ipld> for Predicate {
    type Error = PredicateParseError;

    fn try_from(value: Ipld) -> Result<Self, Self::Error> {
        let Ipld::List(items) = value else {
            return Err(PredicateParseError::NotAnArray);
        };
        let mut items = items.into_iter();
        let Some(Ipld::String(operator)) = items.next() else {
            return Err(PredicateParseError::MissingOperator);
        };

        let selector_arg = |items: &mut dyn Iterator<Item = Ipld>| {
            let Some(Ipld::String(raw)) = items.next() else {
                return Err(PredicateParseError::MissingSelector(operator.clone()));
            };
            raw.parse::<Selector>()
                .map_err(|e| PredicateParseError::BadSelector(e.to_string()))
        };

        let predicate = match operator.as_str() {
            "==" | "!=" => {
                let selector = selector_arg(&mut items)?;
                let value = items
                    .next()
                    .ok_or_else(|| PredicateParseError::MissingArgument(operator.clone()))?;
                if operator == "==" {
                    Predicate::Equal(selector, value)
                } else {
                    Predicate::NotEqual(selector, value)
                }
            }
            "<" | "<=" | ">" | ">=" => {
                let selector = selector_arg(&mut items)?;
                let value = items
                    .next()
                    .ok_or_else(|| PredicateParseError::MissingArgument(operator.clone()))?;
                if !matches!(value, Ipld::Integer(_) | Ipld::Float(_)) {
                    return Err(PredicateParseError::NonNumericComparison(operator.clone()));
                }
                match operator.as_str() {
                    "<" => Predicate::LessThan(selector, value),
                    "<=" => Predicate::LessThanOrEqual(selector, value),
                    ">" => Predicate::GreaterThan(selector, value),
                    _ => Predicate::GreaterThanOrEqual(selector, value),
                }
            }
            "like" => {
                let selector = selector_arg(&mut items)?;
                let Some(Ipld::String(pattern)) = items.next() else {
                    return Err(PredicateParseError::MissingArgument(operator.clone()));
                };
                Predicate::Like(selector, pattern)
            }
            "not" => {
                let statement = items
                    .next()
                    .ok_or_else(|| PredicateParseError::MissingArgument(operator.clone()))?;
                Predicate::Not(Box::new(Predicate::try_from(statement)?))
            }
            "and" | "or" => {
                let Some(Ipld::List(raw)) = items.next() else {
                    return Err(PredicateParseError::MissingArgument(operator.clone()));
                };
                let statements = raw
                    .into_iter()
                    .map(Predicate::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                if operator == "and" {
                    Predicate::And(statements)
                } else {
                    Predicate::Or(statements)
                }
            }
            "all" | "any" => {
                let selector = selector_arg(&mut items)?;
                let statement = items
                    .next()
                    .ok_or_else(|| PredicateParseError::MissingArgument(operator.clone()))?;
                let statement = Box::new(Predicate::try_from(statement)?);
                if operator == "all" {
                    Predicate::All(selector, statement)
                } else {
                    Predicate::Any(selector, statement)
                }
            }
            other => return Err(PredicateParseError::UnknownOperator(other.to_string())),
        };

        if items.next().is_some() {
            return Err(PredicateParseError::TrailingElements(operator));
        }
        Ok(predicate)
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ipld = Ipld::deserialize(deserializer)?;
        Predicate::try_from(ipld).map_err(serde::de::Error::custom)
    }
}

/// Error when decoding a policy statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateParseError {
    /// The statement was not an array.
    #[error("policy statement must be an array")]
    NotAnArray,

    /// The statement's first element was not an operator string.
    #[error("policy statement must start with an operator string")]
    MissingOperator,

    /// The statement's operator was not recognized.
    #[error("unknown policy operator {0:?}")]
    UnknownOperator(String),

    /// The statement was missing its selector element.
    #[error("{0:?} statement is missing its selector")]
    MissingSelector(String),

    /// The statement's selector did not parse.
    #[error("{0}")]
    BadSelector(String),

    /// The statement was missing its final element.
    #[error("{0:?} statement is missing an argument")]
    MissingArgument(String),

    /// An ordering comparison against a non-numeric literal.
    #[error("{0:?} statement requires a numeric literal")]
    NonNumericComparison(String),

    /// The statement had extra trailing elements.
    #[error("{0:?} statement has trailing elements")]
    TrailingElements(String),
}
