//! Builder for [`Delegation`]s.

use super::{Delegation, DelegationPayload};
use crate::{
    command::Command,
    crypto::nonce::Nonce,
    envelope::{Envelope, EnvelopePayload},
    policy::Predicate,
    subject::Subject,
    time::{TimeRange, Timestamp},
};
use ipld_core::ipld::Ipld;
use keel_varsig::{Did, Principal, Signature, Signer};
use serde_ipld_dagcbor::error::CodecError;
use std::{collections::BTreeMap, marker::PhantomData};

/// Marker for a builder without an issuer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unset;

/// Step-by-step construction of a signed [`Delegation`].
///
/// The issuer is tracked in the type: [`try_build`][Self::try_build]
/// only exists once [`issuer`][Self::issuer] has provided a signer, so
/// an unsigned delegation cannot be produced by accident.
#[derive(Debug, Clone)]
pub struct DelegationBuilder<S: Signature, I = Unset> {
    issuer: I,
    audience: Option<Did>,
    subject: Option<Subject>,
    command: Option<Command>,
    policy: Vec<Predicate>,
    expiration: Option<Timestamp>,
    not_before: Option<Timestamp>,
    meta: Option<BTreeMap<String, Ipld>>,
    nonce: Option<Nonce>,
    signature: PhantomData<S>,
}

impl<S: Signature> DelegationBuilder<S, Unset> {
    /// A builder with nothing set.
    #[must_use]
    pub const fn new() -> Self {
        DelegationBuilder {
            issuer: Unset,
            audience: None,
            subject: None,
            command: None,
            policy: Vec::new(),
            expiration: None,
            not_before: None,
            meta: None,
            nonce: None,
            signature: PhantomData,
        }
    }
}

impl<S: Signature> Default for DelegationBuilder<S, Unset> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Signature, I> DelegationBuilder<S, I> {
    /// Set the signer whose key issues this delegation.
    pub fn issuer<I2>(self, issuer: I2) -> DelegationBuilder<S, I2>
    where
        I2: Signer<S> + Principal,
    {
        DelegationBuilder {
            issuer,
            audience: self.audience,
            subject: self.subject,
            command: self.command,
            policy: self.policy,
            expiration: self.expiration,
            not_before: self.not_before,
            meta: self.meta,
            nonce: self.nonce,
            signature: PhantomData,
        }
    }

    /// Set the DID the delegation grants authority to.
    #[must_use]
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Set the subject the authority is about.
    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Set the command prefix the audience may act within.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Set the policy over invocation arguments. Defaults to empty.
    #[must_use]
    pub fn policy(mut self, policy: Vec<Predicate>) -> Self {
        self.policy = policy;
        self
    }

    /// Set when the delegation expires. Unset means it never does.
    #[must_use]
    pub fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the earliest time the delegation may be used.
    #[must_use]
    pub fn not_before(mut self, not_before: Timestamp) -> Self {
        self.not_before = Some(not_before);
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

impl<S: Signature, I: Signer<S> + Principal> DelegationBuilder<S, I> {
    /// Assemble the payload and sign it with the issuer's key.
    ///
    /// A missing nonce is filled with a fresh random 12-byte one.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, the
    /// validity window is bogus, or signing fails. An expiration in the
    /// past is rejected here even though decoding tolerates it: there
    /// is no reason to mint a token that is already dead.
    pub async fn try_build(self) -> Result<Delegation<S>, BuildError> {
        let audience = self.audience.ok_or(BuildError::MissingAudience)?;
        let subject = self.subject.ok_or(BuildError::MissingSubject)?;
        let command = self.command.ok_or(BuildError::MissingCommand)?;

        let now = Timestamp::now();
        if let Some(expiration) = self.expiration {
            if expiration < now {
                return Err(BuildError::ExpirationInThePast { expiration, now });
            }
        }
        let window = TimeRange::new(self.not_before, self.expiration);
        if !window.is_valid() {
            return Err(BuildError::InvalidTimeWindow(window));
        }

        let nonce = match self.nonce {
            Some(nonce) => nonce,
            None => Nonce::generate_12().map_err(BuildError::NonceGeneration)?,
        };

        let payload = DelegationPayload {
            issuer: self.issuer.did(),
            audience,
            subject,
            command,
            policy: self.policy,
            expiration: self.expiration,
            not_before: self.not_before,
            meta: self.meta,
            nonce,
        };

        let envelope_payload = EnvelopePayload::from(payload);
        let bytes = envelope_payload.encode().map_err(BuildError::Encoding)?;
        let signature = self
            .issuer
            .sign(&bytes)
            .await
            .map_err(BuildError::Signing)?;

        Ok(Delegation(Envelope(signature, envelope_payload)))
    }
}

/// Error type for delegation construction.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No audience was set.
    #[error("delegation requires an audience")]
    MissingAudience,

    /// No subject was set.
    #[error("delegation requires a subject")]
    MissingSubject,

    /// No command was set.
    #[error("delegation requires a command")]
    MissingCommand,

    /// The requested expiration already lies in the past.
    #[error("expiration {expiration} is before the current time {now}")]
    ExpirationInThePast {
        /// The requested `exp`.
        expiration: Timestamp,
        /// The current time.
        now: Timestamp,
    },

    /// `nbf` lies after `exp`, so the token could never be used.
    #[error("validity window {0} contains no instant")]
    InvalidTimeWindow(TimeRange),

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
