//! RSASSA-PKCS#1 v1.5 (RS256) signature algorithm configuration.

use super::SignatureAlgorithm;
use crate::signature::Signature;
use signature::SignatureEncoding;
use std::marker::PhantomData;

/// The RS256 signature algorithm (RSASSA-PKCS#1 v1.5 with SHA-256).
///
/// The `L` type parameter is the signature length in bytes: 256 for
/// RSA-2048, 512 for RSA-4096. Varsig preset: prefix `0x1205`
/// (rsa-pkcs1v15), hash tag `0x12` (sha2-256), then the key length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rs256<const L: usize>(PhantomData<()>);

/// RSA-2048 signature type alias.
#[cfg(feature = "rs256_2048")]
pub type Rs256_2048Signature = RsaSignature<256>;

/// RSA-4096 signature type alias.
#[cfg(feature = "rs256_4096")]
pub type Rs256_4096Signature = RsaSignature<512>;

/// RSA PKCS#1 v1.5 signature bytes.
///
/// The `L` type parameter is the signature length in bytes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RsaSignature<const L: usize>(#[serde(with = "serde_bytes")] Vec<u8>);

impl<const L: usize> RsaSignature<L> {
    /// Create a signature from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when `bytes` is not exactly `L` bytes long.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, signature::Error> {
        if bytes.len() != L {
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

impl<const L: usize> TryFrom<&[u8]> for RsaSignature<L> {
    type Error = signature::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes.to_vec())
    }
}

impl<const L: usize> SignatureEncoding for RsaSignature<L> {
    type Repr = Box<[u8]>;
}

impl<const L: usize> From<RsaSignature<L>> for Box<[u8]> {
    fn from(sig: RsaSignature<L>) -> Self {
        sig.0.into_boxed_slice()
    }
}

impl<const L: usize> From<rsa::pkcs1v15::Signature> for RsaSignature<L> {
    fn from(sig: rsa::pkcs1v15::Signature) -> Self {
        Self(sig.to_vec())
    }
}

impl<const L: usize> TryFrom<RsaSignature<L>> for rsa::pkcs1v15::Signature {
    type Error = signature::Error;

    fn try_from(sig: RsaSignature<L>) -> Result<Self, Self::Error> {
        rsa::pkcs1v15::Signature::try_from(sig.0.as_slice())
    }
}

#[cfg(feature = "rs256_2048")]
impl Signature for RsaSignature<256> {
    type Algorithm = Rs256<256>;
}

#[cfg(feature = "rs256_4096")]
impl Signature for RsaSignature<512> {
    type Algorithm = Rs256<512>;
}

#[cfg(feature = "rs256_2048")]
impl SignatureAlgorithm for Rs256<256> {
    fn prefix(&self) -> u64 {
        0x1205
    }

    fn config_tags(&self) -> Vec<u64> {
        vec![0x12, 0x0100]
    }

    fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])> {
        if tags.get(0..=2)? == [0x1205, 0x12, 0x0100] {
            Some((Rs256(PhantomData), tags.get(3..)?))
        } else {
            None
        }
    }
}

#[cfg(feature = "rs256_4096")]
impl SignatureAlgorithm for Rs256<512> {
    fn prefix(&self) -> u64 {
        0x1205
    }

    fn config_tags(&self) -> Vec<u64> {
        vec![0x12, 0x0200]
    }

    fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])> {
        if tags.get(0..=2)? == [0x1205, 0x12, 0x0200] {
            Some((Rs256(PhantomData), tags.get(3..)?))
        } else {
            None
        }
    }
}
