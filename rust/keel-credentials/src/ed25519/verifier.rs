//! Ed25519 DID principal and verifier.

use super::{ED25519_PUB_PREFIX, error::Ed25519DidParseError};
use base58::{FromBase58, ToBase58};
use keel_varsig::{Did, Ed25519Signature, Principal, Verifier};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// An Ed25519 `did:key`: a public key that doubles as an identity.
///
/// The textual form is `did:key:z<base58btc(0xed 0x01 ++ key bytes)>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Verifier(pub ed25519_dalek::VerifyingKey);

impl From<ed25519_dalek::VerifyingKey> for Ed25519Verifier {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Ed25519Verifier(key)
    }
}

impl From<&ed25519_dalek::SigningKey> for Ed25519Verifier {
    fn from(key: &ed25519_dalek::SigningKey) -> Self {
        Ed25519Verifier(key.verifying_key())
    }
}

impl std::fmt::Display for Ed25519Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&ED25519_PUB_PREFIX);
        raw.extend_from_slice(self.0.as_bytes());
        write!(f, "did:key:z{}", raw.to_base58())
    }
}

impl FromStr for Ed25519Verifier {
    type Err = Ed25519DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("did:key:")
            .ok_or(Ed25519DidParseError::InvalidDidHeader)?;
        let b58 = rest
            .strip_prefix('z')
            .ok_or(Ed25519DidParseError::MissingBase58Prefix)?;
        let raw = b58
            .from_base58()
            .map_err(|_| Ed25519DidParseError::InvalidBase58)?;
        let raw: [u8; 34] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Ed25519DidParseError::InvalidKey)?;
        if raw[..2] != ED25519_PUB_PREFIX {
            return Err(Ed25519DidParseError::InvalidKey);
        }
        let key: [u8; 32] = raw[2..]
            .try_into()
            .map_err(|_| Ed25519DidParseError::InvalidKey)?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&key)
            .map_err(|_| Ed25519DidParseError::InvalidKey)?;
        Ok(Ed25519Verifier(key))
    }
}

impl Verifier<Ed25519Signature> for Ed25519Verifier {
    async fn verify(
        &self,
        msg: &[u8],
        signature: &Ed25519Signature,
    ) -> Result<(), signature::Error> {
        let dalek_sig = ed25519_dalek::Signature::from(*signature);
        signature::Verifier::verify(&self.0, msg, &dalek_sig)
    }
}

impl Principal for Ed25519Verifier {
    fn did(&self) -> Did {
        // The Display form is a well-formed did:key by construction
        #[allow(clippy::expect_used)]
        self.to_string().parse().expect("valid DID string")
    }
}

impl Serialize for Ed25519Verifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ed25519Verifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DidKeyVisitor;

        impl serde::de::Visitor<'_> for DidKeyVisitor {
            type Value = Ed25519Verifier;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a did:key string containing an ed25519 public key")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DidKeyVisitor)
    }
}
