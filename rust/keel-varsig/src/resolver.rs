//! DID-to-verifier resolution.
//!
//! Tokens name their issuer by DID; verifying one means turning that
//! DID into key material. [`Resolver`] is the seam where a deployment
//! plugs in how that happens, and [`CompositeResolver`] chains
//! resolvers for different signature algorithms behind a single value.

use crate::{
    did::Did,
    signature::{Signature, Verifier},
};
use std::future::Future;

/// Turns a DID into a [`Verifier`] for signatures of type `S`.
///
/// Resolution is async because a DID method may require I/O (did:web
/// fetches a document; did:key only parses). The `Index` parameter is
/// plumbing for [`CompositeResolver`]'s type-level dispatch; leave it
/// at its default everywhere else.
pub trait Resolver<S: Signature, Index = Head> {
    /// How resolution can fail.
    type Error: std::error::Error;

    /// Look up or derive the verifier for `did`.
    fn resolve(&self, did: &Did) -> impl Future<Output = Result<impl Verifier<S>, Self::Error>>;

    /// Chain this resolver with one handling another signature type.
    ///
    /// The combined resolver answers for both types; the compiler picks
    /// the inner resolver from the `S` being resolved at each call
    /// site.
    fn or<R>(self, next: R) -> CompositeResolver<Self, R>
    where
        Self: Sized,
    {
        CompositeResolver {
            head: self,
            tail: next,
        }
    }
}

/// Type-level index naming the front resolver of a composite.
#[derive(Debug, Clone, Copy)]
pub struct Head;

/// Type-level index naming a resolver further down the chain.
#[derive(Debug, Clone, Copy)]
pub struct Tail<T>(std::marker::PhantomData<T>);

/// Two resolvers behind one value, each owning a signature type.
///
/// Built with [`Resolver::or`] and nests to any depth:
/// `ed25519.or(es256).or(rs256)`.
#[derive(Debug, Clone, Copy)]
pub struct CompositeResolver<A, B> {
    head: A,
    tail: B,
}

impl<S: Signature, A, B> Resolver<S, Head> for CompositeResolver<A, B>
where
    A: Resolver<S, Head>,
{
    type Error = A::Error;

    fn resolve(&self, did: &Did) -> impl Future<Output = Result<impl Verifier<S>, Self::Error>> {
        self.head.resolve(did)
    }
}

impl<S: Signature, Index, A, B> Resolver<S, Tail<Index>> for CompositeResolver<A, B>
where
    B: Resolver<S, Index>,
{
    type Error = B::Error;

    fn resolve(&self, did: &Did) -> impl Future<Output = Result<impl Verifier<S>, Self::Error>> {
        self.tail.resolve(did)
    }
}

#[cfg(all(test, feature = "ed25519", feature = "es256"))]
mod tests {
    use super::*;
    use crate::algorithm::{Ed25519Signature, Es256Signature};
    use std::convert::Infallible;
    use testresult::TestResult;

    // Single-key test resolvers: each hands out the verifier for the
    // one keypair it was built with, whatever the DID says.

    struct EdVerifier(ed25519_dalek::VerifyingKey);

    impl Verifier<Ed25519Signature> for EdVerifier {
        async fn verify(
            &self,
            payload: &[u8],
            signature: &Ed25519Signature,
        ) -> Result<(), signature::Error> {
            let signature = ed25519_dalek::Signature::from(*signature);
            signature::Verifier::verify(&self.0, payload, &signature)
        }
    }

    struct EdResolver(ed25519_dalek::VerifyingKey);

    impl Resolver<Ed25519Signature> for EdResolver {
        type Error = Infallible;

        async fn resolve(&self, _did: &Did) -> Result<impl Verifier<Ed25519Signature>, Infallible> {
            Ok(EdVerifier(self.0))
        }
    }

    struct EsVerifier(p256::ecdsa::VerifyingKey);

    impl Verifier<Es256Signature> for EsVerifier {
        async fn verify(
            &self,
            payload: &[u8],
            signature: &Es256Signature,
        ) -> Result<(), signature::Error> {
            let signature = p256::ecdsa::Signature::try_from(signature.clone())?;
            signature::Verifier::verify(&self.0, payload, &signature)
        }
    }

    struct EsResolver(p256::ecdsa::VerifyingKey);

    impl Resolver<Es256Signature> for EsResolver {
        type Error = Infallible;

        async fn resolve(&self, _did: &Did) -> Result<impl Verifier<Es256Signature>, Infallible> {
            Ok(EsVerifier(self.0))
        }
    }

    #[tokio::test]
    async fn composite_dispatches_on_the_signature_type() -> TestResult {
        let ed_key = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let es_key = p256::ecdsa::SigningKey::from_slice(&[7u8; 32])?;
        let did: Did = "did:example:multikey".parse()?;
        let payload = b"one resolver, two algorithms";

        let resolver = EdResolver(ed_key.verifying_key()).or(EsResolver(*es_key.verifying_key()));

        let ed_sig = Ed25519Signature::from(signature::Signer::try_sign(&ed_key, payload)?);
        let verifier = Resolver::<Ed25519Signature>::resolve(&resolver, &did).await?;
        verifier.verify(payload, &ed_sig).await?;

        let es_sig: p256::ecdsa::Signature = signature::Signer::try_sign(&es_key, payload)?;
        let es_sig = Es256Signature::from(es_sig);
        let verifier = Resolver::<Es256Signature, _>::resolve(&resolver, &did).await?;
        verifier.verify(payload, &es_sig).await?;
        Ok(())
    }

    #[tokio::test]
    async fn composite_verifiers_still_reject_forgeries() -> TestResult {
        let ed_key = ed25519_dalek::SigningKey::from_bytes(&[4u8; 32]);
        let other_key = ed25519_dalek::SigningKey::from_bytes(&[5u8; 32]);
        let es_key = p256::ecdsa::SigningKey::from_slice(&[8u8; 32])?;
        let did: Did = "did:example:multikey".parse()?;
        let payload = b"signed by someone else";

        let resolver = EdResolver(ed_key.verifying_key()).or(EsResolver(*es_key.verifying_key()));

        let forged = Ed25519Signature::from(signature::Signer::try_sign(&other_key, payload)?);
        let verifier = Resolver::<Ed25519Signature>::resolve(&resolver, &did).await?;
        assert!(verifier.verify(payload, &forged).await.is_err());
        Ok(())
    }
}
