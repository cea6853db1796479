//! Signature algorithm presets.
//!
//! Each supported algorithm is a zero-sized marker type carrying the fixed
//! varint preset that identifies it inside a varsig header. Decoding is
//! exact-match: a tag sequence that does not correspond byte-for-byte to a
//! known preset is rejected.

#[cfg(any(
    feature = "es256",
    feature = "es384",
    feature = "es512",
    feature = "es256k"
))]
pub mod ecdsa;
#[cfg(feature = "ed25519")]
pub mod eddsa;
#[cfg(feature = "eip191")]
pub mod eip191;
#[cfg(any(feature = "rs256_2048", feature = "rs256_4096"))]
pub mod rsa;

#[cfg(any(
    feature = "es256",
    feature = "es384",
    feature = "es512",
    feature = "es256k"
))]
pub use ecdsa::*;
#[cfg(feature = "ed25519")]
pub use eddsa::*;
#[cfg(feature = "eip191")]
pub use eip191::*;
#[cfg(any(feature = "rs256_2048", feature = "rs256_4096"))]
pub use rsa::*;

/// A signature algorithm identified by a fixed varint preset.
///
/// The preset is split into a leading `prefix` tag (the algorithm family)
/// and the remaining `config_tags` (curve, hash, or key-size parameters).
/// [`try_from_tags`][SignatureAlgorithm::try_from_tags] is the inverse: it
/// consumes the preset from the front of a decoded tag sequence and returns
/// whatever tags remain (normally just the payload-encoding tag).
pub trait SignatureAlgorithm: Default + PartialEq + std::fmt::Debug {
    /// The leading algorithm-family tag.
    fn prefix(&self) -> u64;

    /// The configuration tags that follow the prefix.
    fn config_tags(&self) -> Vec<u64>;

    /// Match this algorithm's preset at the front of `tags`.
    ///
    /// Returns the algorithm and the unconsumed remainder, or `None` when
    /// the tags do not exactly match the preset.
    fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])>;
}
