//! Delegation policies.
//!
//! A policy is a list of [`Predicate`]s over the invocation's arguments;
//! all of them must hold for the invocation to be authorized. Predicates
//! address into the argument structure with jq-style [`Selector`]s.

pub mod predicate;
pub mod selector;

use ipld_core::ipld::Ipld;
pub use predicate::Predicate;
pub use selector::Selector;

/// Evaluate a whole policy against invocation arguments.
///
/// The policy is an implicit conjunction: every predicate must hold.
/// An empty policy holds trivially.
///
/// # Errors
///
/// Returns the first predicate the arguments violate.
pub fn validate<'p>(arguments: &Ipld, policy: &'p [Predicate]) -> Result<(), &'p Predicate> {
    match policy.iter().find(|predicate| !predicate.check(arguments)) {
        Some(violated) => Err(violated),
        None => Ok(()),
    }
}
