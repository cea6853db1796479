//! Builder for [`Invocation`]s.

use super::{Invocation, InvocationPayload, ProofChainError};
use crate::{
    command::Command,
    crypto::nonce::Nonce,
    delegation::Delegation,
    envelope::{Envelope, EnvelopePayload},
    time::Timestamp,
};
use ipld_core::{cid::Cid, ipld::Ipld};
use keel_varsig::{Did, Principal, Signature, Signer};
use serde_ipld_dagcbor::error::CodecError;
use std::{collections::BTreeMap, marker::PhantomData, time::Duration};

/// How long an invocation stays executable when no expiry is given.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Marker for a builder without an issuer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unset;

/// Step-by-step construction of a signed [`Invocation`].
///
/// Proof delegations are handed over whole; the builder records their
/// CIDs in `prf` and re-runs the chain check before signing, so a
/// malformed chain is caught at the source rather than by the receiver.
#[derive(Debug, Clone)]
pub struct InvocationBuilder<S: Signature, I = Unset> {
    issuer: I,
    audience: Option<Did>,
    subject: Option<Did>,
    command: Option<Command>,
    arguments: BTreeMap<String, Ipld>,
    proofs: Vec<Delegation<S>>,
    cause: Option<Cid>,
    expiration: Option<Timestamp>,
    never_expires: bool,
    ttl: Duration,
    meta: Option<BTreeMap<String, Ipld>>,
    nonce: Option<Nonce>,
    signature: PhantomData<S>,
}

impl<S: Signature> InvocationBuilder<S, Unset> {
    /// A builder with nothing set.
    #[must_use]
    pub const fn new() -> Self {
        InvocationBuilder {
            issuer: Unset,
            audience: None,
            subject: None,
            command: None,
            arguments: BTreeMap::new(),
            proofs: Vec::new(),
            cause: None,
            expiration: None,
            never_expires: false,
            ttl: DEFAULT_TTL,
            meta: None,
            nonce: None,
            signature: PhantomData,
        }
    }
}

impl<S: Signature> Default for InvocationBuilder<S, Unset> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Signature, I> InvocationBuilder<S, I> {
    /// Set the signer issuing this invocation.
    pub fn issuer<I2>(self, issuer: I2) -> InvocationBuilder<S, I2>
    where
        I2: Signer<S> + Principal,
    {
        InvocationBuilder {
            issuer,
            audience: self.audience,
            subject: self.subject,
            command: self.command,
            arguments: self.arguments,
            proofs: self.proofs,
            cause: self.cause,
            expiration: self.expiration,
            never_expires: self.never_expires,
            ttl: self.ttl,
            meta: self.meta,
            nonce: self.nonce,
            signature: PhantomData,
        }
    }

    /// Address the invocation to someone other than the subject.
    #[must_use]
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Set the subject the action is about.
    #[must_use]
    pub fn subject(mut self, subject: Did) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Set the command to invoke.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Set the command's arguments. Defaults to empty.
    #[must_use]
    pub fn arguments(mut self, arguments: BTreeMap<String, Ipld>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Supply the authorizing delegation chain, leaf first.
    #[must_use]
    pub fn proofs(mut self, proofs: Vec<Delegation<S>>) -> Self {
        self.proofs = proofs;
        self
    }

    /// Record the invocation or receipt this one is a consequence of.
    #[must_use]
    pub fn cause(mut self, cause: Cid) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Set an explicit expiration, overriding the default TTL.
    #[must_use]
    pub fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self.never_expires = false;
        self
    }

    /// Issue the invocation with no expiration at all.
    ///
    /// Overrides the default TTL and any expiration set earlier; the
    /// token stays executable until a proof in its chain runs out.
    #[must_use]
    pub fn no_expiration(mut self) -> Self {
        self.expiration = None;
        self.never_expires = true;
        self
    }

    /// Set how long past now the invocation stays executable. Ignored
    /// when an explicit expiration is set.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn meta(mut self, meta: BTreeMap<String, Ipld>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Use an explicit nonce instead of a fresh random one.
    #[must_use]
    pub fn nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

impl<S: Signature, I: Signer<S> + Principal> InvocationBuilder<S, I> {
    /// Assemble the payload, check the proof chain, and sign.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, the
    /// supplied chain does not authorize the invocation, or signing
    /// fails.
    pub async fn try_build(self) -> Result<Invocation<S>, BuildError> {
        let subject = self.subject.ok_or(BuildError::MissingSubject)?;
        let command = self.command.ok_or(BuildError::MissingCommand)?;

        let expiration = if self.never_expires {
            None
        } else {
            Some(match self.expiration {
                Some(expiration) => expiration,
                None => Timestamp::now() + self.ttl,
            })
        };

        let nonce = match self.nonce {
            Some(nonce) => nonce,
            None => Nonce::generate_12().map_err(BuildError::NonceGeneration)?,
        };

        let payload = InvocationPayload {
            issuer: self.issuer.did(),
            audience: self.audience,
            subject,
            command,
            arguments: self.arguments,
            proofs: self.proofs.iter().map(Delegation::to_cid).collect(),
            cause: self.cause,
            issued_at: None,
            expiration,
            meta: self.meta,
            nonce,
        };

        payload.check_chain(&self.proofs)?;

        let envelope_payload = EnvelopePayload::from(payload);
        let bytes = envelope_payload.encode().map_err(BuildError::Encoding)?;
        let signature = self
            .issuer
            .sign(&bytes)
            .await
            .map_err(BuildError::Signing)?;

        Ok(Invocation(Envelope(signature, envelope_payload)))
    }
}

/// Error type for invocation construction.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No subject was set.
    #[error("invocation requires a subject")]
    MissingSubject,

    /// No command was set.
    #[error("invocation requires a command")]
    MissingCommand,

    /// The supplied proofs do not authorize this invocation.
    #[error(transparent)]
    Chain(#[from] ProofChainError),

    /// The system RNG failed while generating a nonce.
    #[error("nonce generation failed: {0}")]
    NonceGeneration(getrandom::Error),

    /// Payload encoding failed.
    #[error("encoding error: {0}")]
    Encoding(CodecError),

    /// The issuer's signer failed.
    #[error("signing error: {0}")]
    Signing(signature::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Subject;
    use keel_credentials::ed25519::Ed25519Signer;
    use keel_varsig::{Ed25519Signature, Principal};
    use testresult::TestResult;

    async fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).await.unwrap()
    }

    #[tokio::test]
    async fn default_expiry_is_now_plus_ttl() -> TestResult {
        let subject = test_signer(1).await;

        let before = Timestamp::now();
        let invocation = InvocationBuilder::<Ed25519Signature>::new()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/x".parse()?)
            .try_build()
            .await?;
        let after = Timestamp::now();

        let exp = invocation.expiration().unwrap();
        assert!(exp >= before + DEFAULT_TTL);
        assert!(exp <= after + DEFAULT_TTL);
        Ok(())
    }

    #[tokio::test]
    async fn no_expiration_issues_a_non_expiring_invocation() -> TestResult {
        let subject = test_signer(7).await;

        let invocation = InvocationBuilder::<Ed25519Signature>::new()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/x".parse()?)
            .no_expiration()
            .try_build()
            .await?;
        assert!(invocation.expiration().is_none());

        // A later explicit expiration wins over the opt-out
        let exp = Timestamp::now() + Duration::from_secs(60);
        let invocation = InvocationBuilder::<Ed25519Signature>::new()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/x".parse()?)
            .no_expiration()
            .expiration(exp)
            .try_build()
            .await?;
        assert_eq!(invocation.expiration(), Some(exp));
        Ok(())
    }

    #[tokio::test]
    async fn bad_chains_never_get_signed() -> TestResult {
        let subject = test_signer(2).await;
        let invoker = test_signer(3).await;

        // The grant is scoped to /narrow; invoking /other must fail at
        // build time, before any bytes leave this process.
        let grant = Delegation::<Ed25519Signature>::builder()
            .issuer(subject.clone())
            .audience(invoker.did())
            .subject(Subject::Specific(subject.did()))
            .command("/narrow".parse()?)
            .try_build()
            .await?;

        let result = InvocationBuilder::new()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/other".parse()?)
            .proofs(vec![grant])
            .try_build()
            .await;
        assert!(matches!(
            result,
            Err(BuildError::Chain(ProofChainError::CommandEscalation { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn proofs_are_recorded_leaf_first() -> TestResult {
        let subject = test_signer(4).await;
        let middle = test_signer(5).await;
        let invoker = test_signer(6).await;

        let root = Delegation::<Ed25519Signature>::builder()
            .issuer(subject.clone())
            .audience(middle.did())
            .subject(Subject::Specific(subject.did()))
            .command("/".parse()?)
            .try_build()
            .await?;
        let leaf = Delegation::<Ed25519Signature>::builder()
            .issuer(middle.clone())
            .audience(invoker.did())
            .subject(Subject::Specific(subject.did()))
            .command("/crud".parse()?)
            .try_build()
            .await?;

        let invocation = InvocationBuilder::new()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/crud/read".parse()?)
            .proofs(vec![leaf.clone(), root.clone()])
            .try_build()
            .await?;

        assert_eq!(invocation.proofs(), &vec![leaf.to_cid(), root.to_cid()]);
        Ok(())
    }
}
