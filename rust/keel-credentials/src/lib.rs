//! Concrete key and signing types for keel tokens.
//!
//! This crate provides credential implementations that satisfy the
//! [`Principal`], [`Signer`], and [`Verifier`] traits from
//! `keel-varsig`, starting with Ed25519 `did:key` identities (enabled
//! by the `ed25519` feature, on by default).
//!
//! [`Principal`]: keel_varsig::Principal
//! [`Signer`]: keel_varsig::Signer
//! [`Verifier`]: keel_varsig::Verifier

#[cfg(feature = "ed25519")]
pub mod ed25519;
#[cfg(feature = "ed25519")]
pub use ed25519::*;
