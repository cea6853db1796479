//! Token nonces.

use serde::{Deserialize, Serialize};

/// A token nonce, serialized as a CBOR byte string.
///
/// Tokens built by this crate carry a random 12-byte nonce; decoding
/// accepts byte strings of any length so foreign tokens round-trip
/// byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Nonce {
    /// The standard 12-byte random nonce.
    Nonce12([u8; 12]),

    /// A nonce of any other length, preserved verbatim.
    Custom(Vec<u8>),
}

impl Nonce {
    /// Generate a random 12-byte nonce from the system RNG.
    ///
    /// # Errors
    ///
    /// Returns a [`getrandom::Error`] if the system RNG is unavailable.
    pub fn generate_12() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; 12];
        getrandom::getrandom(&mut bytes)?;
        Ok(Nonce::Nonce12(bytes))
    }

    /// The raw nonce bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Nonce::Nonce12(bytes) => bytes,
            Nonce::Custom(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for Nonce {
    fn from(bytes: Vec<u8>) -> Self {
        match <[u8; 12]>::try_from(bytes.as_slice()) {
            Ok(arr) => Nonce::Nonce12(arr),
            Err(_) => Nonce::Custom(bytes),
        }
    }
}

impl Serialize for Nonce {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: serde_bytes::ByteBuf = Deserialize::deserialize(deserializer)?;
        Ok(Nonce::from(bytes.into_vec()))
    }
}
