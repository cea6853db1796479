//! ECDSA signature algorithm configurations.
//!
//! Covers the NIST curves (ES256/ES384/ES512) and secp256k1 (ES256K).
//! Signatures are fixed-length raw `r || s` concatenations.

use super::SignatureAlgorithm;
use crate::signature::Signature;
use signature::SignatureEncoding;

/// Declare an ECDSA algorithm marker and its raw signature newtype.
macro_rules! ecdsa_algorithm {
    (
        $(#[$alg_doc:meta])*
        $feature:literal, $alg:ident, $sig:ident, $len:literal, $preset:expr
    ) => {
        $(#[$alg_doc])*
        #[cfg(feature = $feature)]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $alg;

        #[cfg(feature = $feature)]
        impl SignatureAlgorithm for $alg {
            fn prefix(&self) -> u64 {
                $preset[0]
            }

            fn config_tags(&self) -> Vec<u64> {
                $preset[1..].to_vec()
            }

            fn try_from_tags(tags: &[u64]) -> Option<(Self, &[u64])> {
                if tags.get(0..$preset.len())? == $preset {
                    Some(($alg, tags.get($preset.len()..)?))
                } else {
                    None
                }
            }
        }

        /// Raw `r || s` signature bytes for this curve.
        #[cfg(feature = $feature)]
        #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $sig(#[serde(with = "serde_bytes")] Vec<u8>);

        #[cfg(feature = $feature)]
        impl $sig {
            /// Signature length in bytes.
            pub const LENGTH: usize = $len;

            /// Create a signature from raw bytes.
            ///
            /// # Errors
            ///
            /// Returns an error when `bytes` is not exactly
            /// [`LENGTH`][Self::LENGTH] bytes long.
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

        #[cfg(feature = $feature)]
        impl TryFrom<&[u8]> for $sig {
            type Error = signature::Error;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                Self::from_bytes(bytes.to_vec())
            }
        }

        #[cfg(feature = $feature)]
        impl SignatureEncoding for $sig {
            type Repr = Box<[u8]>;
        }

        #[cfg(feature = $feature)]
        impl From<$sig> for Box<[u8]> {
            fn from(sig: $sig) -> Self {
                sig.0.into_boxed_slice()
            }
        }

        #[cfg(feature = $feature)]
        impl Signature for $sig {
            type Algorithm = $alg;
        }
    };
}

ecdsa_algorithm!(
    /// ECDSA over P-256 with SHA-256.
    ///
    /// Varsig preset: prefix `0xec`, curve tag `0x1200` (p256),
    /// hash tag `0x12` (sha2-256).
    "es256", Es256, Es256Signature, 64, [0xec, 0x1200, 0x12]
);

ecdsa_algorithm!(
    /// ECDSA over P-384 with SHA-384.
    ///
    /// Varsig preset: prefix `0xec`, curve tag `0x1201` (p384),
    /// hash tag `0x20` (sha2-384).
    "es384", Es384, Es384Signature, 96, [0xec, 0x1201, 0x20]
);

ecdsa_algorithm!(
    /// ECDSA over P-521 with SHA-512.
    ///
    /// Varsig preset: prefix `0xec`, curve tag `0x1202` (p521),
    /// hash tag `0x13` (sha2-512).
    "es512", Es512, Es512Signature, 132, [0xec, 0x1202, 0x13]
);

ecdsa_algorithm!(
    /// ECDSA over secp256k1 with SHA-256.
    ///
    /// Varsig preset: prefix `0xec`, curve tag `0xe7` (secp256k1),
    /// hash tag `0x12` (sha2-256).
    "es256k", Es256k, Es256kSignature, 64, [0xec, 0xe7, 0x12]
);

#[cfg(feature = "es256")]
impl From<p256::ecdsa::Signature> for Es256Signature {
    fn from(sig: p256::ecdsa::Signature) -> Self {
        Self(sig.to_bytes().to_vec())
    }
}

#[cfg(feature = "es256")]
impl TryFrom<Es256Signature> for p256::ecdsa::Signature {
    type Error = signature::Error;

    fn try_from(sig: Es256Signature) -> Result<Self, Self::Error> {
        p256::ecdsa::Signature::from_slice(&sig.0)
    }
}

#[cfg(feature = "es384")]
impl From<p384::ecdsa::Signature> for Es384Signature {
    fn from(sig: p384::ecdsa::Signature) -> Self {
        Self(sig.to_bytes().to_vec())
    }
}

#[cfg(feature = "es384")]
impl TryFrom<Es384Signature> for p384::ecdsa::Signature {
    type Error = signature::Error;

    fn try_from(sig: Es384Signature) -> Result<Self, Self::Error> {
        p384::ecdsa::Signature::from_slice(&sig.0)
    }
}

#[cfg(feature = "es256k")]
impl From<k256::ecdsa::Signature> for Es256kSignature {
    fn from(sig: k256::ecdsa::Signature) -> Self {
        Self(sig.to_bytes().to_vec())
    }
}

#[cfg(feature = "es256k")]
impl TryFrom<Es256kSignature> for k256::ecdsa::Signature {
    type Error = signature::Error;

    fn try_from(sig: Es256kSignature) -> Result<Self, Self::Error> {
        k256::ecdsa::Signature::from_slice(&sig.0)
    }
}
