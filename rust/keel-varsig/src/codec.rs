//! Payload codec traits used by varsig headers.

use std::{
    error::Error,
    io::{BufRead, Write},
};

/// Codec identity: the multicodec code and tag-based reconstruction.
///
/// This is the payload-type-independent half of a codec — everything the
/// varsig header needs in order to serialize and deserialize itself. A codec
/// that can also move payloads additionally implements [`Codec<T>`].
pub trait Format: Sized {
    /// Multicodec code for this codec.
    ///
    /// Runtime rather than `const` so that a single type may represent
    /// more than one codec.
    fn multicodec_code(&self) -> u64;

    /// Try to reconstruct the codec from the trailing header tags.
    fn try_from_tags(tags: &[u64]) -> Option<Self>;
}

/// Encode and decode payloads of type `T`.
///
/// Varsig signing always happens over encoded bytes, so the header carries
/// its codec and uses it to produce the exact byte sequence that was (or
/// will be) signed.
pub trait Codec<T>: Format {
    /// Encoding error type.
    type EncodingError: Error;

    /// Decoding error type.
    type DecodingError: Error;

    /// Encode `payload` into `buffer`.
    ///
    /// # Errors
    ///
    /// Returns `Self::EncodingError` when the payload cannot be encoded.
    fn encode_payload<W: Write>(
        &self,
        payload: &T,
        buffer: &mut W,
    ) -> Result<(), Self::EncodingError>;

    /// Decode a payload from `reader`.
    ///
    /// # Errors
    ///
    /// Returns `Self::DecodingError` when the bytes do not form a valid
    /// payload.
    fn decode_payload<R: BufRead>(&self, reader: &mut R) -> Result<T, Self::DecodingError>;
}
