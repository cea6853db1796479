//! EIP-191 (Ethereum personal-message) signature algorithm configuration.

use super::SignatureAlgorithm;
use crate::signature::Signature;
use signature::SignatureEncoding;

/// The EIP-191 signature algorithm: secp256k1 over a keccak-256 digest of
/// the `"\x19Ethereum Signed Message:\n"`-prefixed payload.
///
/// Varsig preset: prefix `0xe7` (secp256k1), hash tag `0x1b` (keccak-256),
/// followed by the `0xe191` sub-tag identifying the EIP-191 wrapping. The
/// sub-tag is the one preset component whose varint occupies three bytes on
/// the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Eip191;

const EIP191_PRESET: [u64; 3] = [0xe7, 0x1b, 0xe191];

impl SignatureAlgorithm for Eip191 {
    fn prefix(&self) -> u64 {
        EIP191_PRESET[0]
    }

    fn config_tags(&self) -> Vec<u64> {
        EIP191_PRESET[1..].to_vec()
    }

    fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])> {
        if tags.get(0..3)? == EIP191_PRESET {
            Some((Eip191, tags.get(3..)?))
        } else {
            None
        }
    }
}

/// Raw EIP-191 signature bytes: `r || s || v` (65 bytes, recovery id
/// included).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Eip191Signature(#[serde(with = "serde_bytes")] Vec<u8>);

impl Eip191Signature {
    /// Signature length in bytes.
    pub const LENGTH: usize = 65;

    /// Create a signature from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when `bytes` is not exactly 65 bytes long.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, signature::Error> {
        if bytes.len() != Self::LENGTH {
            return Err(signature::Error::new());
        }
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Eip191Signature {
    type Error = signature::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes.to_vec())
    }
}

impl SignatureEncoding for Eip191Signature {
    type Repr = Box<[u8]>;
}

impl From<Eip191Signature> for Box<[u8]> {
    fn from(sig: Eip191Signature) -> Self {
        sig.0.into_boxed_slice()
    }
}

impl Signature for Eip191Signature {
    type Algorithm = Eip191;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_tag_is_three_leb128_bytes() {
        let mut buf = Vec::new();
        leb128::write::unsigned(&mut buf, 0xe191).unwrap();
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn preset_roundtrip() {
        let tags = [0xe7, 0x1b, 0xe191, 0x5f];
        let (alg, rest) = Eip191::try_from_tags(&tags).unwrap();
        assert_eq!(alg, Eip191);
        assert_eq!(rest, &[0x5f]);
    }

    #[test]
    fn preset_rejects_plain_secp256k1_tags() {
        assert!(Eip191::try_from_tags(&[0xe7, 0x12, 0x71]).is_none());
    }
}
