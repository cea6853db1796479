//! Capability invocations.

pub mod builder;

use crate::{
    cid::to_dagcbor_cid,
    command::Command,
    crypto::nonce::Nonce,
    delegation::{
        Delegation, DelegationValidationError, RevocationOracle, SignatureVerificationError,
    },
    envelope::{Envelope, EnvelopePayload, payload_tag::PayloadTag},
    policy::Predicate,
    store::{DelegationStore, KvDriver, StoreError},
    subject::Subject,
    time::{TimeRange, Timestamp},
};
use builder::InvocationBuilder;
use ipld_core::{cid::Cid, ipld::Ipld};
use keel_varsig::{Did, Resolver, Signature, Verifier};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, Visitor},
};
use std::{borrow::Cow, collections::BTreeMap, fmt::Debug};
use thiserror::Error;

/// A request to exercise a delegated capability.
///
/// The invocation names the action (`cmd` plus `args`) and carries the
/// CIDs of the [`Delegation`] chain that authorizes it, ordered from
/// the leaf grant (whose audience is this invocation's issuer) back to
/// the self-signed root. A self-invocation by the subject itself
/// carries no proofs.
#[derive(Clone)]
pub struct Invocation<S: Signature>(Envelope<S, InvocationPayload>);

impl<S: Signature> Invocation<S> {
    /// Start building an invocation.
    #[must_use]
    pub const fn builder() -> InvocationBuilder<S> {
        InvocationBuilder::new()
    }

    /// The DID requesting the action.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// The DID expected to perform the action. Defaults to the subject
    /// when no explicit audience was set.
    #[must_use]
    pub fn audience(&self) -> &Did {
        self.payload().audience()
    }

    /// The resource the action is about.
    #[must_use]
    pub const fn subject(&self) -> &Did {
        &self.payload().subject
    }

    /// The command being invoked.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.payload().command
    }

    /// The command's arguments.
    #[must_use]
    pub const fn arguments(&self) -> &BTreeMap<String, Ipld> {
        &self.payload().arguments
    }

    /// CIDs of the authorizing delegations, leaf first.
    #[must_use]
    pub const fn proofs(&self) -> &Vec<Cid> {
        &self.payload().proofs
    }

    /// The invocation or receipt this one is a consequence of.
    #[must_use]
    pub const fn cause(&self) -> Option<Cid> {
        self.payload().cause
    }

    /// When this invocation was issued, if recorded.
    #[must_use]
    pub const fn issued_at(&self) -> Option<Timestamp> {
        self.payload().issued_at
    }

    /// When this invocation stops being executable.
    #[must_use]
    pub const fn expiration(&self) -> Option<Timestamp> {
        self.payload().expiration
    }

    /// Free-form metadata, empty when absent. Not covered by validation.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Ipld> {
        static EMPTY: BTreeMap<String, Ipld> = BTreeMap::new();
        self.payload().meta.as_ref().unwrap_or(&EMPTY)
    }

    /// The nonce distinguishing otherwise-identical requests.
    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.payload().nonce
    }

    /// The content identifier of this invocation's envelope.
    #[must_use]
    pub fn to_cid(&self) -> Cid {
        to_dagcbor_cid(&self)
    }

    const fn signature(&self) -> &S {
        &self.0.0
    }

    const fn envelope(&self) -> &EnvelopePayload<S, InvocationPayload> {
        &self.0.1
    }

    const fn payload(&self) -> &InvocationPayload {
        &self.envelope().payload
    }

    /// Verify only the envelope signature against the issuer's key.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureVerificationError`] when the payload cannot be
    /// encoded, the issuer DID cannot be resolved, or the signature does
    /// not check out.
    pub async fn verify_signature<R>(
        &self,
        resolver: &R,
    ) -> Result<(), SignatureVerificationError<R::Error>>
    where
        R: Resolver<S>,
    {
        let encoded = self
            .envelope()
            .encode()
            .map_err(SignatureVerificationError::EncodingError)?;
        let verifier = resolver
            .resolve(self.issuer())
            .await
            .map_err(SignatureVerificationError::ResolutionError)?;
        Verifier::verify(&verifier, &encoded, self.signature())
            .await
            .map_err(SignatureVerificationError::VerificationError)
    }

    /// Check that this invocation is authorized.
    ///
    /// Verifies the envelope signature, loads every proof out of the
    /// store, validates each one (signature, `nbf`, and the revocation
    /// oracle), and walks the chain with
    /// [`check_chain`][InvocationPayload::check_chain]. On success the
    /// returned window is the intersection of every validity bound in
    /// play; callers decide whether "now" falls inside it.
    ///
    /// Pass [`NeverRevoked`](crate::delegation::NeverRevoked) when no
    /// revocation channel exists.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationCheckError`] naming the failed stage.
    pub async fn check<K, R, O>(
        &self,
        store: &DelegationStore<K, S>,
        resolver: &R,
        revocation: &O,
    ) -> Result<TimeRange, InvocationCheckError<K::Error, R::Error, O::Error>>
    where
        K: KvDriver,
        R: Resolver<S>,
        O: RevocationOracle,
        S: for<'de> Deserialize<'de>,
    {
        self.verify_signature(resolver)
            .await
            .map_err(InvocationCheckError::Signature)?;

        let proofs = store
            .get_all(self.proofs())
            .await
            .map_err(InvocationCheckError::Store)?;

        let now = Timestamp::now();
        for proof in &proofs {
            proof
                .validate(resolver, revocation, now)
                .await
                .map_err(|source| InvocationCheckError::Proof {
                    cid: proof.to_cid(),
                    source,
                })?;
        }

        self.payload()
            .check_chain(&proofs)
            .map_err(InvocationCheckError::Chain)
    }

    /// Decode an invocation addressed to `receiver` and check it.
    ///
    /// The receiver must be either the invocation's audience or its
    /// subject; anything else is rejected before any cryptography runs.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationCheckError`] when the bytes do not decode,
    /// the invocation is addressed elsewhere, or any
    /// [`check`][Self::check] stage fails.
    pub async fn from_bytes<K, R, O>(
        bytes: &[u8],
        receiver: &Did,
        store: &DelegationStore<K, S>,
        resolver: &R,
        revocation: &O,
    ) -> Result<(Self, TimeRange), InvocationCheckError<K::Error, R::Error, O::Error>>
    where
        K: KvDriver,
        R: Resolver<S>,
        O: RevocationOracle,
        S: for<'de> Deserialize<'de>,
    {
        let invocation: Invocation<S> = serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| InvocationCheckError::Decode(e.to_string()))?;

        if invocation.audience() != receiver && invocation.subject() != receiver {
            return Err(InvocationCheckError::WrongAudience {
                audience: invocation.audience().clone(),
                receiver: receiver.clone(),
            });
        }

        let time_range = invocation.check(store, resolver, revocation).await?;
        Ok((invocation, time_range))
    }
}

impl<S: Signature> Debug for Invocation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Invocation").field(&self.0).finish()
    }
}

impl<S: Signature> Serialize for Invocation<S> {
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, S: Signature + for<'ze> Deserialize<'ze>> Deserialize<'de> for Invocation<S> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::<S, InvocationPayload>::deserialize(deserializer)?;
        Ok(Invocation(envelope))
    }
}

/// The unsigned content of an [`Invocation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud", skip_serializing_if = "Option::is_none")]
    pub(crate) audience: Option<Did>,

    #[serde(rename = "sub")]
    pub(crate) subject: Did,

    #[serde(rename = "cmd")]
    pub(crate) command: Command,

    #[serde(rename = "args")]
    pub(crate) arguments: BTreeMap<String, Ipld>,

    #[serde(rename = "prf")]
    pub(crate) proofs: Vec<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cause: Option<Cid>,

    #[serde(rename = "iat", skip_serializing_if = "Option::is_none")]
    pub(crate) issued_at: Option<Timestamp>,

    #[serde(rename = "exp")]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<BTreeMap<String, Ipld>>,

    pub(crate) nonce: Nonce,
}

impl InvocationPayload {
    /// The DID requesting the action.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.issuer
    }

    /// The DID expected to perform the action, falling back to the
    /// subject.
    #[must_use]
    pub fn audience(&self) -> &Did {
        self.audience.as_ref().unwrap_or(&self.subject)
    }

    /// The resource the action is about.
    #[must_use]
    pub const fn subject(&self) -> &Did {
        &self.subject
    }

    /// The command being invoked.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Walk a proof chain and decide whether it authorizes this payload.
    ///
    /// `proofs` must be the resolved delegations in the payload's `prf`
    /// order: leaf first, self-signed root last. Each link must
    ///
    /// * name the previous principal as its audience (the leaf names the
    ///   invocation issuer),
    /// * be about the invocation's subject (a powerline `sub: null`
    ///   grant matches any subject),
    /// * cover the command delegated one step leafward, and
    /// * hold its policy against the invocation's final arguments.
    ///
    /// The returned [`TimeRange`] is the intersection of the
    /// invocation's and every delegation's validity window.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProofChainError`] encountered, leaf first.
    pub fn check_chain<'a, S, I>(&self, proofs: I) -> Result<TimeRange, ProofChainError>
    where
        S: Signature + 'a,
        I: IntoIterator<Item = &'a Delegation<S>>,
    {
        let proofs: Vec<&'a Delegation<S>> = proofs.into_iter().collect();
        let mut time_range = TimeRange::from(self);

        if proofs.is_empty() {
            if self.issuer != self.subject {
                return Err(ProofChainError::MissingProofs {
                    issuer: self.issuer.clone(),
                    subject: self.subject.clone(),
                });
            }
            if !time_range.is_valid() {
                return Err(ProofChainError::InvalidTimeWindow { range: time_range });
            }
            return Ok(time_range);
        }

        if self.issuer == self.subject {
            return Err(ProofChainError::UnexpectedProofs {
                issuer: self.issuer.clone(),
            });
        }

        let args = Ipld::Map(self.arguments.clone());

        // Walk leafward-to-rootward. Each delegation must empower the
        // principal one step closer to the invocation.
        let mut claimed_principal = &self.issuer;
        let mut claimed_command = &self.command;

        for proof in &proofs {
            if proof.audience() != claimed_principal {
                return Err(ProofChainError::PrincipalMisalignment {
                    claimed: claimed_principal.clone(),
                    authorized: proof.audience().clone(),
                });
            }

            let subject = match proof.subject() {
                Subject::Specific(subject) => subject,
                Subject::Any => &self.subject,
            };
            if subject != &self.subject {
                return Err(ProofChainError::UnauthorizedSubject {
                    claimed: self.subject.clone(),
                    authorized: subject.clone(),
                });
            }

            if !claimed_command.starts_with(proof.command()) {
                return Err(ProofChainError::CommandEscalation {
                    claimed: claimed_command.clone(),
                    authorized: proof.command().clone(),
                });
            }

            // Every link's policy is judged against the invocation's
            // final arguments, not whatever was delegated in between.
            if let Err(violated) = crate::policy::validate(&args, proof.policy()) {
                return Err(ProofChainError::PolicyViolation(Box::new(violated.clone())));
            }

            time_range = time_range.intersect((*proof).into());
            claimed_principal = proof.issuer();
            claimed_command = proof.command();
        }

        // The last link must be self-signed by the subject; a powerline
        // root stands in for the invocation's subject.
        let root = proofs[proofs.len() - 1];
        let root_subject = match root.subject() {
            Subject::Specific(subject) => subject,
            Subject::Any => &self.subject,
        };
        if root.issuer() != root_subject {
            return Err(ProofChainError::RootNotSelfSigned {
                issuer: root.issuer().clone(),
                subject: root_subject.clone(),
            });
        }

        if !time_range.is_valid() {
            return Err(ProofChainError::InvalidTimeWindow { range: time_range });
        }

        Ok(time_range)
    }
}

impl From<&InvocationPayload> for TimeRange {
    fn from(payload: &InvocationPayload) -> Self {
        Self::new(None, payload.expiration)
    }
}

impl<'de> Deserialize<'de> for InvocationPayload {
    #[allow(clippy::too_many_lines)]
    fn deserialize<T>(deserializer: T) -> Result<Self, T::Error>
    where
        T: Deserializer<'de>,
    {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = InvocationPayload;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(
                    "a map with keys iss,sub,cmd,args,prf,nonce and optional aud,cause,iat,exp,meta",
                )
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut issuer: Option<Did> = None;
                let mut audience: Option<Did> = None;
                let mut subject: Option<Did> = None;
                let mut command: Option<Command> = None;
                let mut arguments: Option<BTreeMap<String, Ipld>> = None;
                let mut proofs: Option<Vec<Cid>> = None;
                let mut cause: Option<Option<Cid>> = None;
                let mut issued_at: Option<Option<Timestamp>> = None;
                let mut expiration: Option<Option<Timestamp>> = None;
                let mut meta: Option<BTreeMap<String, Ipld>> = None;
                let mut nonce: Option<Nonce> = None;

                while let Some(key) = map.next_key::<Cow<'de, str>>()? {
                    match key.as_ref() {
                        "iss" => {
                            if issuer.is_some() {
                                return Err(de::Error::duplicate_field("iss"));
                            }
                            issuer = Some(map.next_value()?);
                        }
                        "aud" => {
                            if audience.is_some() {
                                return Err(de::Error::duplicate_field("aud"));
                            }
                            audience = Some(map.next_value()?);
                        }
                        "sub" => {
                            if subject.is_some() {
                                return Err(de::Error::duplicate_field("sub"));
                            }
                            subject = Some(map.next_value()?);
                        }
                        "cmd" => {
                            if command.is_some() {
                                return Err(de::Error::duplicate_field("cmd"));
                            }
                            command = Some(map.next_value()?);
                        }
                        "args" => {
                            if arguments.is_some() {
                                return Err(de::Error::duplicate_field("args"));
                            }
                            arguments = Some(map.next_value()?);
                        }
                        "prf" => {
                            if proofs.is_some() {
                                return Err(de::Error::duplicate_field("prf"));
                            }
                            proofs = Some(map.next_value()?);
                        }
                        "cause" => {
                            if cause.is_some() {
                                return Err(de::Error::duplicate_field("cause"));
                            }
                            cause = Some(map.next_value()?);
                        }
                        "iat" => {
                            if issued_at.is_some() {
                                return Err(de::Error::duplicate_field("iat"));
                            }
                            issued_at = Some(map.next_value()?);
                        }
                        "exp" => {
                            if expiration.is_some() {
                                return Err(de::Error::duplicate_field("exp"));
                            }
                            expiration = Some(map.next_value()?);
                        }
                        "meta" => {
                            if meta.is_some() {
                                return Err(de::Error::duplicate_field("meta"));
                            }
                            meta = Some(map.next_value()?);
                        }
                        "nonce" => {
                            if nonce.is_some() {
                                return Err(de::Error::duplicate_field("nonce"));
                            }
                            let ipld: Ipld = map.next_value()?;
                            let Ipld::Bytes(bytes) = ipld else {
                                return Err(de::Error::custom("nonce must be a byte string"));
                            };
                            nonce = Some(Nonce::from(bytes));
                        }
                        other => {
                            return Err(de::Error::unknown_field(
                                other,
                                &[
                                    "iss", "aud", "sub", "cmd", "args", "prf", "cause", "iat",
                                    "exp", "meta", "nonce",
                                ],
                            ));
                        }
                    }
                }

                let issuer = issuer.ok_or_else(|| de::Error::missing_field("iss"))?;
                let subject = subject.ok_or_else(|| de::Error::missing_field("sub"))?;
                let command = command.ok_or_else(|| de::Error::missing_field("cmd"))?;
                let arguments = arguments.ok_or_else(|| de::Error::missing_field("args"))?;
                let proofs = proofs.ok_or_else(|| de::Error::missing_field("prf"))?;
                let nonce = nonce.ok_or_else(|| de::Error::missing_field("nonce"))?;

                Ok(InvocationPayload {
                    issuer,
                    audience,
                    subject,
                    command,
                    arguments,
                    proofs,
                    nonce,
                    cause: cause.unwrap_or(None),
                    issued_at: issued_at.unwrap_or(None),
                    expiration: expiration.unwrap_or(None),
                    meta,
                })
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

impl PayloadTag for InvocationPayload {
    fn spec_id() -> &'static str {
        "inv"
    }

    fn version() -> &'static str {
        "1.0.0-rc.1"
    }
}

/// Ways a proof chain can fail to authorize an invocation.
#[derive(Debug, Clone, Error)]
pub enum ProofChainError {
    /// The issuer is not the subject, yet no proofs were supplied.
    #[error("issuer '{issuer}' invokes on subject '{subject}' without proofs")]
    MissingProofs {
        /// The invocation's issuer.
        issuer: Did,
        /// The invocation's subject.
        subject: Did,
    },

    /// A self-invocation carried proofs it has no use for.
    #[error("self-invocation by '{issuer}' must not carry proofs")]
    UnexpectedProofs {
        /// The invoking subject.
        issuer: Did,
    },

    /// The chain's last delegation was not issued by the subject.
    #[error("root delegation issued by '{issuer}' instead of subject '{subject}'")]
    RootNotSelfSigned {
        /// The root delegation's issuer.
        issuer: Did,
        /// The subject the root had to be signed by.
        subject: Did,
    },

    /// A delegation's audience is not the principal it has to empower.
    #[error("principal '{claimed}' is not the delegation's audience '{authorized}'")]
    PrincipalMisalignment {
        /// The principal acting at this link.
        claimed: Did,
        /// The audience the delegation actually names.
        authorized: Did,
    },

    /// A delegation is about a different subject than the invocation.
    #[error("claimed subject '{claimed}' is not authorized by subject '{authorized}'")]
    UnauthorizedSubject {
        /// The invocation's claimed subject.
        claimed: Did,
        /// The subject the delegation is about.
        authorized: Did,
    },

    /// A command reaches outside the scope it was delegated.
    #[error("claimed command '{claimed}' is not within authorized command '{authorized}'")]
    CommandEscalation {
        /// The command claimed at this link.
        claimed: Command,
        /// The command prefix the delegation grants.
        authorized: Command,
    },

    /// The invocation's arguments violate a delegation's policy.
    #[error("invocation arguments violate delegation policy: {0:?}")]
    PolicyViolation(Box<Predicate>),

    /// The intersection of all validity windows is empty; there is no
    /// instant at which this chain could be used.
    #[error("delegation chain has no valid time window: {range}")]
    InvalidTimeWindow {
        /// The empty window that was computed.
        range: TimeRange,
    },
}

/// Errors from the full invocation check (signature, store, chain).
#[derive(Debug, Error)]
pub enum InvocationCheckError<KE: std::error::Error, RE: std::error::Error, OE: std::error::Error>
{
    /// The bytes did not decode as an invocation envelope.
    #[error("invocation envelope decoding failed: {0}")]
    Decode(String),

    /// The invocation is addressed to someone else.
    #[error("invocation for '{audience}' received by '{receiver}'")]
    WrongAudience {
        /// Who the invocation is addressed to.
        audience: Did,
        /// Who actually received it.
        receiver: Did,
    },

    /// The envelope signature did not verify.
    #[error(transparent)]
    Signature(SignatureVerificationError<RE>),

    /// A proof could not be loaded from the store.
    #[error(transparent)]
    Store(StoreError<KE>),

    /// A proof delegation failed its own validation.
    #[error("proof {cid} is invalid: {source}")]
    Proof {
        /// The failing proof.
        cid: Cid,
        /// Why it failed.
        source: DelegationValidationError<RE, OE>,
    },

    /// The proof chain does not authorize the invocation.
    #[error(transparent)]
    Chain(ProofChainError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::NeverRevoked;
    use crate::store::MemoryKv;
    use keel_credentials::ed25519::{Ed25519KeyResolver, Ed25519Signer};
    use keel_varsig::{Ed25519Signature, Principal};
    use std::collections::HashSet;
    use testresult::TestResult;

    async fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).await.unwrap()
    }

    /// Oracle backed by an in-memory set of revoked CIDs.
    struct RevokedSet(HashSet<Cid>);

    impl RevocationOracle for RevokedSet {
        type Error = std::convert::Infallible;

        async fn is_revoked(&self, cid: &Cid) -> Result<bool, Self::Error> {
            Ok(self.0.contains(cid))
        }
    }

    async fn delegate(
        issuer: &Ed25519Signer,
        audience: &Did,
        subject: Subject,
        command: &str,
        policy: Vec<Predicate>,
    ) -> Delegation<Ed25519Signature> {
        Delegation::builder()
            .issuer(issuer.clone())
            .audience(audience.clone())
            .subject(subject)
            .command(command.parse().unwrap())
            .policy(policy)
            .try_build()
            .await
            .unwrap()
    }

    fn store() -> DelegationStore<MemoryKv, Ed25519Signature> {
        DelegationStore::new(MemoryKv::default())
    }

    #[tokio::test]
    async fn single_hop_chain_is_authorized() -> TestResult {
        let subject = test_signer(1).await;
        let invoker = test_signer(2).await;

        let grant = delegate(
            &subject,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;

        let store = store();
        store.set(&grant).await?;

        let invocation = Invocation::builder()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/crud/read".parse()?)
            .proofs(vec![grant])
            .try_build()
            .await?;

        let range = invocation.check(&store, &Ed25519KeyResolver, &NeverRevoked).await?;
        assert!(range.contains(Timestamp::now()));
        Ok(())
    }

    #[tokio::test]
    async fn self_invocation_needs_no_proofs() -> TestResult {
        let subject = test_signer(3).await;

        let invocation = Invocation::builder()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/anything".parse()?)
            .try_build()
            .await?;

        assert!(invocation.proofs().is_empty());
        let store = store();
        invocation.check(&store, &Ed25519KeyResolver, &NeverRevoked).await?;
        Ok(())
    }

    #[tokio::test]
    async fn proofless_invocation_by_another_is_rejected() -> TestResult {
        let subject = test_signer(4).await;
        let invoker = test_signer(5).await;

        // Bypass the builder's own chain check by signing a raw payload
        let payload = InvocationPayload {
            issuer: invoker.did(),
            audience: None,
            subject: subject.did(),
            command: "/x".parse()?,
            arguments: BTreeMap::new(),
            proofs: vec![],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };
        let result = payload.check_chain::<Ed25519Signature, _>([]);
        assert!(matches!(result, Err(ProofChainError::MissingProofs { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn leaf_must_name_the_invoker() -> TestResult {
        let subject = test_signer(6).await;
        let delegate_to = test_signer(7).await;
        let imposter = test_signer(8).await;

        let grant = delegate(
            &subject,
            &delegate_to.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;

        let payload = InvocationPayload {
            issuer: imposter.did(),
            audience: None,
            subject: subject.did(),
            command: "/crud".parse()?,
            arguments: BTreeMap::new(),
            proofs: vec![grant.to_cid()],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };
        let result = payload.check_chain([&grant]);
        assert!(matches!(
            result,
            Err(ProofChainError::PrincipalMisalignment { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn command_escalation_is_rejected() -> TestResult {
        let subject = test_signer(9).await;
        let invoker = test_signer(10).await;

        let grant = delegate(
            &subject,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud/read",
            vec![],
        )
        .await;

        let payload = InvocationPayload {
            issuer: invoker.did(),
            audience: None,
            subject: subject.did(),
            command: "/crud/delete".parse()?,
            arguments: BTreeMap::new(),
            proofs: vec![grant.to_cid()],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };
        let result = payload.check_chain([&grant]);
        assert!(matches!(
            result,
            Err(ProofChainError::CommandEscalation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn policy_is_checked_against_final_arguments() -> TestResult {
        let subject = test_signer(11).await;
        let invoker = test_signer(12).await;

        let policy = vec![Predicate::Equal(
            ".status".parse()?,
            Ipld::String("draft".into()),
        )];
        let grant = delegate(
            &subject,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/post",
            policy,
        )
        .await;

        let store = store();
        store.set(&grant).await?;

        let mut good_args = BTreeMap::new();
        good_args.insert("status".to_string(), Ipld::String("draft".into()));
        let invocation = Invocation::builder()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/post/create".parse()?)
            .arguments(good_args)
            .proofs(vec![grant.clone()])
            .try_build()
            .await?;
        invocation.check(&store, &Ed25519KeyResolver, &NeverRevoked).await?;

        let mut bad_args = BTreeMap::new();
        bad_args.insert("status".to_string(), Ipld::String("published".into()));
        let payload = InvocationPayload {
            issuer: invoker.did(),
            audience: None,
            subject: subject.did(),
            command: "/post/create".parse()?,
            arguments: bad_args,
            proofs: vec![grant.to_cid()],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };
        let result = payload.check_chain([&grant]);
        assert!(matches!(result, Err(ProofChainError::PolicyViolation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn two_hop_chain_with_powerline_root() -> TestResult {
        let root_holder = test_signer(13).await;
        let middle = test_signer(14).await;
        let invoker = test_signer(15).await;

        // Powerline root: self-signed over any subject
        let root = delegate(&root_holder, &middle.did(), Subject::Any, "/", vec![]).await;
        let leaf = delegate(
            &middle,
            &invoker.did(),
            Subject::Specific(root_holder.did()),
            "/crud",
            vec![],
        )
        .await;

        let store = store();
        store.set(&root).await?;
        store.set(&leaf).await?;

        let invocation = Invocation::builder()
            .issuer(invoker.clone())
            .subject(root_holder.did())
            .command("/crud/read".parse()?)
            .proofs(vec![leaf, root])
            .try_build()
            .await?;

        invocation.check(&store, &Ed25519KeyResolver, &NeverRevoked).await?;
        Ok(())
    }

    #[tokio::test]
    async fn rootward_ordering_is_rejected() -> TestResult {
        let subject = test_signer(16).await;
        let middle = test_signer(17).await;
        let invoker = test_signer(18).await;

        let root = delegate(
            &subject,
            &middle.did(),
            Subject::Specific(subject.did()),
            "/",
            vec![],
        )
        .await;
        let leaf = delegate(
            &middle,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;

        let payload = InvocationPayload {
            issuer: invoker.did(),
            audience: None,
            subject: subject.did(),
            command: "/crud".parse()?,
            arguments: BTreeMap::new(),
            proofs: vec![root.to_cid(), leaf.to_cid()],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };

        // Leaf-first is the only accepted order
        assert!(payload.check_chain([&leaf, &root]).is_ok());
        assert!(matches!(
            payload.check_chain([&root, &leaf]),
            Err(ProofChainError::PrincipalMisalignment { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unrelated_root_is_rejected() -> TestResult {
        let subject = test_signer(19).await;
        let stranger = test_signer(20).await;
        let invoker = test_signer(21).await;

        // Issued by a stranger, not by the subject
        let grant = delegate(
            &stranger,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;

        let payload = InvocationPayload {
            issuer: invoker.did(),
            audience: None,
            subject: subject.did(),
            command: "/crud".parse()?,
            arguments: BTreeMap::new(),
            proofs: vec![grant.to_cid()],
            cause: None,
            issued_at: None,
            expiration: None,
            meta: None,
            nonce: Nonce::generate_12()?,
        };
        let result = payload.check_chain([&grant]);
        assert!(matches!(
            result,
            Err(ProofChainError::RootNotSelfSigned { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn tampered_invocation_fails_signature_check() -> TestResult {
        let subject = test_signer(22).await;

        let invocation = Invocation::builder()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/narrow".parse()?)
            .try_build()
            .await?;

        let mut forged = invocation.clone();
        forged.0.1.payload.command = Command::root();
        let store = store();
        let result = forged.check(&store, &Ed25519KeyResolver, &NeverRevoked).await;
        assert!(matches!(result, Err(InvocationCheckError::Signature(_))));
        Ok(())
    }

    #[tokio::test]
    async fn from_bytes_enforces_the_receiver() -> TestResult {
        let subject = test_signer(23).await;
        let bystander = test_signer(24).await;

        let invocation = Invocation::builder()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/x".parse()?)
            .try_build()
            .await?;
        let bytes = serde_ipld_dagcbor::to_vec(&invocation)?;

        let store = store();
        let (decoded, _) = Invocation::<Ed25519Signature>::from_bytes(
            &bytes,
            &subject.did(),
            &store,
            &Ed25519KeyResolver,
            &NeverRevoked,
        )
        .await?;
        assert_eq!(decoded.to_cid(), invocation.to_cid());

        let result = Invocation::<Ed25519Signature>::from_bytes(
            &bytes,
            &bystander.did(),
            &store,
            &Ed25519KeyResolver,
            &NeverRevoked,
        )
        .await;
        assert!(matches!(
            result,
            Err(InvocationCheckError::WrongAudience { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_proof_in_store_is_reported() -> TestResult {
        let subject = test_signer(25).await;
        let invoker = test_signer(26).await;

        let grant = delegate(
            &subject,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;

        let invocation = Invocation::builder()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/crud".parse()?)
            .proofs(vec![grant])
            .try_build()
            .await?;

        // Never stored the grant
        let store = store();
        let result = invocation.check(&store, &Ed25519KeyResolver, &NeverRevoked).await;
        assert!(matches!(result, Err(InvocationCheckError::Store(_))));
        Ok(())
    }

    #[tokio::test]
    async fn serialization_roundtrip() -> TestResult {
        let subject = test_signer(27).await;

        let mut args = BTreeMap::new();
        args.insert("key".to_string(), Ipld::String("value".into()));
        let invocation = Invocation::builder()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/crud/read".parse()?)
            .arguments(args)
            .try_build()
            .await?;

        let bytes = serde_ipld_dagcbor::to_vec(&invocation)?;
        let roundtripped: Invocation<Ed25519Signature> = serde_ipld_dagcbor::from_slice(&bytes)?;

        assert_eq!(roundtripped.issuer(), invocation.issuer());
        assert_eq!(roundtripped.subject(), invocation.subject());
        assert_eq!(roundtripped.command(), invocation.command());
        assert_eq!(roundtripped.arguments(), invocation.arguments());
        assert_eq!(roundtripped.expiration(), invocation.expiration());
        assert_eq!(roundtripped.to_cid(), invocation.to_cid());
        Ok(())
    }

    #[tokio::test]
    async fn non_expiring_self_invocation_stays_valid() -> TestResult {
        let subject = test_signer(28).await;

        let invocation = Invocation::builder()
            .issuer(subject.clone())
            .subject(subject.did())
            .command("/crud".parse()?)
            .no_expiration()
            .try_build()
            .await?;
        assert!(invocation.expiration().is_none());

        let store = store();
        let range = invocation
            .check(&store, &Ed25519KeyResolver, &NeverRevoked)
            .await?;
        assert_eq!(range.expiration, None);
        Ok(())
    }

    #[tokio::test]
    async fn revoked_proof_fails_the_check() -> TestResult {
        let subject = test_signer(29).await;
        let invoker = test_signer(30).await;

        let grant = delegate(
            &subject,
            &invoker.did(),
            Subject::Specific(subject.did()),
            "/crud",
            vec![],
        )
        .await;
        let store = store();
        store.set(&grant).await?;

        let invocation = Invocation::builder()
            .issuer(invoker.clone())
            .subject(subject.did())
            .command("/crud/read".parse()?)
            .proofs(vec![grant.clone()])
            .try_build()
            .await?;

        let revoked = RevokedSet(HashSet::from([grant.to_cid()]));
        let result = invocation
            .check(&store, &Ed25519KeyResolver, &revoked)
            .await;
        assert!(matches!(
            result,
            Err(InvocationCheckError::Proof {
                source: DelegationValidationError::Revoked(_),
                ..
            })
        ));

        // The same token passes once nothing is revoked
        invocation
            .check(&store, &Ed25519KeyResolver, &NeverRevoked)
            .await?;
        Ok(())
    }
}
