//! Typed capability facade over UCAN tokens.
//!
//! A [`Capability`] binds a [`Command`](keel_ucan::Command) to an argument
//! [`Schema`]. Invoking it validates the arguments, discovers a proof chain
//! in a delegation store, and signs the resulting invocation in one step.
//! Delegating it signs a scoped grant for another principal.

pub mod capability;
pub mod schema;

pub use capability::{Capability, InvokeError};
pub use schema::{Field, Issue, Kind, Schema, SchemaError};
