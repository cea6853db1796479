//! Varsig header, signature trait, and signing/verification re-exports.

pub mod signer;
pub mod verifier;

use super::{Codec, Format, SignatureAlgorithm};
use ::signature::SignatureEncoding;
use serde::{Deserialize, Serialize};
pub use signer::Signer;
use std::{fmt::Debug, io::Cursor, marker::PhantomData};
pub use verifier::Verifier;

/// Varsig sigil: every header starts with this tag.
pub const VARSIG_SIGIL: u64 = 0x34;

/// Varsig version tag supported by this implementation.
pub const VARSIG_VERSION: u64 = 0x01;

/// Cryptographic signature produced by a [`Signer`] and checked by a
/// [`Verifier`].
pub trait Signature: SignatureEncoding + Debug {
    /// The signature algorithm that produces this signature type.
    type Algorithm: SignatureAlgorithm + Clone;
}

/// A varsig header: the pairing of a signature algorithm with the codec
/// used to encode the payload that gets signed.
///
/// Serializes to the canonical byte layout
/// `[0x34, 0x01, <algorithm preset varints>, <codec varint>]` per the
/// [varsig] specification. Deserialization is strict: a wrong sigil or
/// version, an unknown algorithm preset, or leftover tags all fail.
///
/// [varsig]: https://github.com/ChainAgnostic/varsig/blob/main/README.md
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Varsig<A: SignatureAlgorithm, C, T> {
    algorithm: A,
    codec: C,
    _data: PhantomData<T>,
}

impl<A: SignatureAlgorithm, C, T> Varsig<A, C, T> {
    /// Create a header for the given codec; the algorithm is supplied by
    /// its `Default`.
    pub fn new(codec: C) -> Self {
        Varsig {
            algorithm: A::default(),
            codec,
            _data: PhantomData,
        }
    }

    /// The [signature algorithm] of this header.
    ///
    /// [signature algorithm]: https://github.com/ChainAgnostic/varsig/blob/main/README.md#signature-algorithm
    pub const fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// The codec used for [payload encoding] in this header.
    ///
    /// [payload encoding]: https://github.com/ChainAgnostic/varsig/blob/main/README.md#payload-encoding
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode a payload with this header's codec, producing the exact
    /// bytes to be signed or verified.
    ///
    /// # Errors
    ///
    /// Returns the codec's encoding error if encoding fails.
    pub fn encode(&self, payload: &T) -> Result<Vec<u8>, C::EncodingError>
    where
        C: Codec<T>,
        T: Serialize,
    {
        let mut buffer = Vec::new();
        self.codec.encode_payload(payload, &mut buffer)?;
        Ok(buffer)
    }

    /// The canonical header bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a varint cannot be written; this cannot
    /// happen when writing into a `Vec`.
    fn header_bytes(&self) -> std::io::Result<Vec<u8>>
    where
        C: Format,
    {
        let mut bytes = Vec::new();
        leb128::write::unsigned(&mut bytes, VARSIG_SIGIL)?;
        leb128::write::unsigned(&mut bytes, VARSIG_VERSION)?;
        leb128::write::unsigned(&mut bytes, self.algorithm.prefix())?;
        for tag in self.algorithm.config_tags() {
            leb128::write::unsigned(&mut bytes, tag)?;
        }
        leb128::write::unsigned(&mut bytes, self.codec.multicodec_code())?;
        Ok(bytes)
    }
}

impl<A: SignatureAlgorithm, C: Format, T> Serialize for Varsig<A, C, T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self
            .header_bytes()
            .map_err(|e| serde::ser::Error::custom(format!("unable to write varsig tag: {e}")))?;
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de, A: SignatureAlgorithm, C: Format, T> Deserialize<'de> for Varsig<A, C, T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let bytes: serde_bytes::ByteBuf = serde::Deserialize::deserialize(deserializer)
            .map_err(|e| D::Error::custom(format!("unable to read varsig header bytes: {e}")))?;

        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes.as_slice());

        let sigil = leb128::read::unsigned(&mut cursor)
            .map_err(|e| D::Error::custom(format!("unable to read varsig sigil: {e}")))?;
        if sigil != VARSIG_SIGIL {
            return Err(D::Error::custom(format!(
                "expected varsig sigil {VARSIG_SIGIL:#x}, found {sigil:#x}"
            )));
        }

        let version = leb128::read::unsigned(&mut cursor)
            .map_err(|e| D::Error::custom(format!("unable to read varsig version: {e}")))?;
        if version != VARSIG_VERSION {
            return Err(D::Error::custom(format!(
                "expected varsig version {VARSIG_VERSION:#x}, found {version:#x}"
            )));
        }

        let mut tags = Vec::new();
        while cursor.position() < len {
            let tag = leb128::read::unsigned(&mut cursor)
                .map_err(|e| D::Error::custom(format!("unable to read varsig tag: {e}")))?;
            tags.push(tag);
        }

        let (algorithm, rest) = A::try_from_tags(&tags).ok_or_else(|| {
            D::Error::custom("varsig tags do not match a known signature algorithm preset")
        })?;
        let codec = C::try_from_tags(rest)
            .ok_or_else(|| D::Error::custom("varsig tags do not match a known payload codec"))?;

        Ok(Varsig {
            algorithm,
            codec,
            _data: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::eddsa::{Ed25519, Ed25519Signature};
    use std::io::{BufRead, Write};
    use testresult::TestResult;

    /// Identity codec over strings, standing in for a payload encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct TextCodec;

    impl Format for TextCodec {
        fn multicodec_code(&self) -> u64 {
            0x71
        }

        fn try_from_tags(tags: &[u64]) -> Option<Self> {
            if tags.len() == 1 && tags[0] == 0x71 {
                Some(TextCodec)
            } else {
                None
            }
        }
    }

    impl Codec<String> for TextCodec {
        type EncodingError = std::io::Error;
        type DecodingError = std::io::Error;

        fn encode_payload<W: Write>(
            &self,
            payload: &String,
            buffer: &mut W,
        ) -> Result<(), Self::EncodingError> {
            buffer.write_all(payload.as_bytes())
        }

        fn decode_payload<R: BufRead>(
            &self,
            reader: &mut R,
        ) -> Result<String, Self::DecodingError> {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            String::from_utf8(buf)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }
    }

    fn header() -> Varsig<Ed25519, TextCodec, String> {
        Varsig::new(TextCodec)
    }

    #[test]
    fn header_construction() {
        let varsig = header();
        assert_eq!(varsig.algorithm(), &Ed25519);
        assert_eq!(varsig.codec(), &TextCodec);
    }

    #[test]
    fn ed25519_header_bytes_match_the_preset() -> TestResult {
        let bytes = header().header_bytes()?;
        // 0x34, 0x01, leb(0xed), leb(0xed), 0x13, 0x71
        assert_eq!(bytes, [0x34, 0x01, 0xed, 0x01, 0xed, 0x01, 0x13, 0x71]);
        Ok(())
    }

    #[test]
    fn decode_rejects_wrong_sigil() {
        let bytes = [0x35u8, 0x01, 0xed, 0x01, 0xed, 0x01, 0x13, 0x71];
        let de = serde::de::value::BytesDeserializer::<serde::de::value::Error>::new(&bytes);
        assert!(Varsig::<Ed25519, TextCodec, String>::deserialize(de).is_err());
    }

    #[test]
    fn decode_rejects_wrong_version() {
        let bytes = [0x34u8, 0x02, 0xed, 0x01, 0xed, 0x01, 0x13, 0x71];
        let de = serde::de::value::BytesDeserializer::<serde::de::value::Error>::new(&bytes);
        assert!(Varsig::<Ed25519, TextCodec, String>::deserialize(de).is_err());
    }

    #[test]
    fn decode_rejects_unknown_preset() {
        // Hash tag 0x12 instead of 0x13 — close to the Ed25519 preset but
        // not an exact match.
        let bytes = [0x34u8, 0x01, 0xed, 0x01, 0xed, 0x01, 0x12, 0x71];
        let de = serde::de::value::BytesDeserializer::<serde::de::value::Error>::new(&bytes);
        assert!(Varsig::<Ed25519, TextCodec, String>::deserialize(de).is_err());
    }

    #[test]
    fn decode_rejects_trailing_tags() {
        let bytes = [0x34u8, 0x01, 0xed, 0x01, 0xed, 0x01, 0x13, 0x71, 0x00];
        let de = serde::de::value::BytesDeserializer::<serde::de::value::Error>::new(&bytes);
        assert!(Varsig::<Ed25519, TextCodec, String>::deserialize(de).is_err());
    }

    #[tokio::test]
    async fn sign_and_verify_encoded_payload() -> TestResult {
        struct TestSigner(ed25519_dalek::SigningKey);
        struct TestVerifier(ed25519_dalek::VerifyingKey);

        impl Signer<Ed25519Signature> for TestSigner {
            async fn sign(&self, msg: &[u8]) -> Result<Ed25519Signature, signature::Error> {
                use signature::Signer as _;
                Ok(Ed25519Signature::from(self.0.try_sign(msg)?))
            }
        }

        impl Verifier<Ed25519Signature> for TestVerifier {
            async fn verify(
                &self,
                msg: &[u8],
                signature: &Ed25519Signature,
            ) -> Result<(), signature::Error> {
                use signature::Verifier as _;
                self.0.verify(msg, &ed25519_dalek::Signature::from(*signature))
            }
        }

        let key = ed25519_dalek::SigningKey::from_bytes(&[42u8; 32]);
        let sk = TestSigner(key.clone());
        let vk = TestVerifier(key.verifying_key());

        let payload = "hello varsig".to_string();
        let encoded = header().encode(&payload)?;
        let sig = sk.sign(&encoded).await?;
        vk.verify(&encoded, &sig).await?;

        Ok(())
    }
}
