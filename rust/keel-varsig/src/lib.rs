//! [Varsig] headers and the signing traits built around them.
//!
//! A varsig header is a short self-describing byte string that names a
//! signature algorithm and the encoding of the payload that was signed.
//! This crate provides the header codec, the algorithm presets, and the
//! async [`Signer`]/[`Verifier`]/[`Resolver`] traits that the token layer
//! plugs concrete cryptography into.
//!
//! [Varsig]: https://github.com/ChainAgnostic/varsig

pub mod algorithm;
pub mod codec;
pub mod did;
pub mod principal;
pub mod resolver;
pub mod signature;

pub use algorithm::*;
pub use codec::*;
pub use did::*;
pub use principal::*;
pub use resolver::*;
pub use signature::*;
