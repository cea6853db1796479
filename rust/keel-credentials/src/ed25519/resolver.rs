//! Ed25519 DID key resolver.

use super::{error::Ed25519ResolveError, verifier::Ed25519Verifier};
use keel_varsig::{Did, Ed25519Signature, Resolver, Verifier};

/// Resolves `did:key` strings to Ed25519 verifiers.
///
/// Stateless: the key material is embedded in the DID itself, so
/// resolution is just parsing. DIDs carrying any other key type fail.
#[derive(Debug, Clone, Copy)]
pub struct Ed25519KeyResolver;

impl Resolver<Ed25519Signature> for Ed25519KeyResolver {
    type Error = Ed25519ResolveError;

    async fn resolve(&self, did: &Did) -> Result<impl Verifier<Ed25519Signature>, Self::Error> {
        let verifier: Ed25519Verifier = did.as_str().parse()?;
        Ok(verifier)
    }
}
