//! Content identifiers for UCAN tokens.

use ipld_core::cid::Cid;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Multicodec code for DAG-CBOR.
const DAG_CBOR_CODE: u64 = 0x71;

/// Multihash code for sha2-256.
const SHA2_256_CODE: u64 = 0x12;

/// Compute the CIDv1 of a value's canonical DAG-CBOR encoding.
///
/// The CID uses the dag-cbor codec and a sha2-256 multihash, so two
/// tokens with identical canonical bytes always share a CID.
///
/// # Panics
///
/// Panics if the value cannot be encoded as DAG-CBOR. Token types in
/// this crate always can; their payload maps only hold encodable kinds.
#[must_use]
#[allow(clippy::expect_used)]
pub fn to_dagcbor_cid<T: Serialize>(value: &T) -> Cid {
    let bytes = serde_ipld_dagcbor::to_vec(value).expect("value is DAG-CBOR encodable");
    let digest = Sha256::digest(&bytes);
    let multihash = ipld_core::cid::multihash::Multihash::wrap(SHA2_256_CODE, &digest)
        .expect("sha2-256 digest fits in a multihash");
    Cid::new_v1(DAG_CBOR_CODE, multihash)
}
