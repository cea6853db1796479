//! [UCAN] delegation and invocation tokens.
//!
//! A UCAN authorization flow has two token kinds:
//!
//! 1. A [`Delegation`] grants an audience the right to act on a subject's
//!    behalf, scoped by a [`Command`] and a [policy](policy::Predicate).
//! 2. An [`Invocation`] exercises such a grant. It names the action, its
//!    arguments, and a chain of delegation proofs leading back to the
//!    subject.
//!
//! Both are signed DAG-CBOR [envelopes](envelope::Envelope) with a varsig
//! header describing the signature algorithm and payload encoding. The
//! [`store`] module keeps issued delegations indexed for proof-chain
//! discovery.
//!
//! [UCAN]: https://github.com/ucan-wg/spec

pub mod cid;
pub mod codec;
pub mod command;
pub mod crypto;
pub mod delegation;
pub mod envelope;
pub mod invocation;
pub mod issuer;
pub mod policy;
pub mod store;
pub mod subject;
pub mod time;

pub use cid::to_dagcbor_cid;
pub use codec::{CborCodec, RawCodec};
pub use command::Command;
pub use delegation::Delegation;
pub use invocation::Invocation;
pub use issuer::Issuer;
pub use subject::Subject;
