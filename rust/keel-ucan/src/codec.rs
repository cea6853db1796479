//! Concrete codec types for UCAN payload encodings.

use ipld_core::codec::Codec as IpldCodec;
use keel_varsig::codec::{Codec, Format};
use serde::{Deserialize, Serialize};
use serde_ipld_dagcbor::{codec::DagCborCodec, error::CodecError};
use std::io::{BufRead, Write};

/// DAG-CBOR codec (multicodec `0x71`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CborCodec;

impl Format for CborCodec {
    fn multicodec_code(&self) -> u64 {
        <DagCborCodec as IpldCodec<()>>::CODE
    }

    fn try_from_tags(code: &[u64]) -> Option<Self> {
        if code.len() == 1 && *code.first()? == <DagCborCodec as IpldCodec<()>>::CODE {
            Some(CborCodec)
        } else {
            None
        }
    }
}

impl<T: Serialize + for<'de> Deserialize<'de>> Codec<T> for CborCodec {
    type EncodingError = CodecError;
    type DecodingError = CodecError;

    fn encode_payload<W: Write>(
        &self,
        payload: &T,
        buffer: &mut W,
    ) -> Result<(), Self::EncodingError> {
        <DagCborCodec as IpldCodec<T>>::encode(buffer, payload)
    }

    fn decode_payload<R: BufRead>(&self, reader: &mut R) -> Result<T, Self::DecodingError> {
        <DagCborCodec as IpldCodec<T>>::decode(reader)
    }
}

/// Raw codec (multicodec `0x5f`): the payload bytes are signed as-is,
/// with no structural encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCodec;

/// Multicodec code for raw byte payloads in a varsig header.
pub const RAW_CODE: u64 = 0x5f;

impl Format for RawCodec {
    fn multicodec_code(&self) -> u64 {
        RAW_CODE
    }

    fn try_from_tags(code: &[u64]) -> Option<Self> {
        if code.len() == 1 && *code.first()? == RAW_CODE {
            Some(RawCodec)
        } else {
            None
        }
    }
}

impl Codec<Vec<u8>> for RawCodec {
    type EncodingError = std::io::Error;
    type DecodingError = std::io::Error;

    fn encode_payload<W: Write>(
        &self,
        payload: &Vec<u8>,
        buffer: &mut W,
    ) -> Result<(), Self::EncodingError> {
        buffer.write_all(payload)
    }

    fn decode_payload<R: BufRead>(&self, reader: &mut R) -> Result<Vec<u8>, Self::DecodingError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
