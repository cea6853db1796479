//! Ed25519 `did:key` identities.

mod error;
mod resolver;
mod signer;
mod verifier;

pub use error::{Ed25519DidParseError, Ed25519ResolveError, Ed25519SignerError};
pub use resolver::Ed25519KeyResolver;
pub use signer::Ed25519Signer;
pub use verifier::Ed25519Verifier;

/// Multicodec prefix for an Ed25519 public key inside a `did:key`.
pub(crate) const ED25519_PUB_PREFIX: [u8; 2] = [0xed, 0x01];
