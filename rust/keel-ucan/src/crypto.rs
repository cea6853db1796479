//! Cryptographic support types.

pub mod nonce;

pub use nonce::Nonce;
