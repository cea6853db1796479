//! EdDSA (Ed25519) signature algorithm configuration.

use super::SignatureAlgorithm;
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use signature::SignatureEncoding;

/// The Ed25519 signature algorithm.
///
/// Varsig preset: prefix `0xed` (EdDSA), curve tag `0xed` (edwards25519),
/// hash tag `0x13` (sha2-512).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ed25519;

const ED25519_PRESET: [u64; 3] = [0xed, 0xed, 0x13];

impl SignatureAlgorithm for Ed25519 {
    fn prefix(&self) -> u64 {
        ED25519_PRESET[0]
    }

    fn config_tags(&self) -> Vec<u64> {
        ED25519_PRESET[1..].to_vec()
    }

    fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])> {
        if tags.get(0..3)? == ED25519_PRESET {
            Some((Ed25519, tags.get(3..)?))
        } else {
            None
        }
    }
}

/// Raw Ed25519 signature bytes.
///
/// Platform-agnostic 64-byte representation, convertible to and from
/// `ed25519_dalek::Signature` for signing and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    /// Signature length in bytes.
    pub const LENGTH: usize = 64;

    /// Get the raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl From<[u8; 64]> for Ed25519Signature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

impl From<Ed25519Signature> for [u8; 64] {
    fn from(sig: Ed25519Signature) -> Self {
        sig.0
    }
}

impl TryFrom<&[u8]> for Ed25519Signature {
    type Error = signature::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr = <[u8; 64]>::try_from(bytes).map_err(|_| signature::Error::new())?;
        Ok(Self(arr))
    }
}

impl SignatureEncoding for Ed25519Signature {
    type Repr = [u8; 64];
}

impl From<ed25519_dalek::Signature> for Ed25519Signature {
    fn from(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }
}

impl From<Ed25519Signature> for ed25519_dalek::Signature {
    fn from(sig: Ed25519Signature) -> Self {
        ed25519_dalek::Signature::from_bytes(&sig.0)
    }
}

impl Signature for Ed25519Signature {
    type Algorithm = Ed25519;
}

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: serde_bytes::ByteBuf = Deserialize::deserialize(deserializer)?;
        Ed25519Signature::try_from(bytes.as_slice()).map_err(|_| {
            serde::de::Error::invalid_length(bytes.len(), &"64 ed25519 signature bytes")
        })
    }
}
