//! Capability delegations.

pub mod builder;

use crate::{
    cid::to_dagcbor_cid,
    command::Command,
    crypto::nonce::Nonce,
    envelope::{Envelope, EnvelopePayload, payload_tag::PayloadTag},
    policy::Predicate,
    subject::Subject,
    time::{TimeRange, Timestamp},
};
use ipld_core::{cid::Cid, ipld::Ipld};
use keel_varsig::{Did, Resolver, Signature, Verifier};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, Visitor},
};
use serde_ipld_dagcbor::error::CodecError;
use std::{borrow::Cow, collections::BTreeMap, fmt::Debug};

/// A capability grant from an issuer to an audience.
///
/// The grant is scoped by a subject, a [`Command`] prefix, and a policy
/// over future invocation arguments. Delegations are immutable signed
/// envelopes; chains of them are checked when an
/// [`Invocation`][crate::Invocation] is validated.
#[derive(Clone)]
pub struct Delegation<S: Signature>(Envelope<S, DelegationPayload>);

impl<S: Signature> Delegation<S> {
    /// Start building a delegation.
    #[must_use]
    pub const fn builder() -> builder::DelegationBuilder<S> {
        builder::DelegationBuilder::new()
    }

    /// The DID that signed this delegation.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// The DID this delegation grants authority to.
    #[must_use]
    pub const fn audience(&self) -> &Did {
        &self.payload().audience
    }

    /// The resource the granted authority is about.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.payload().subject
    }

    /// The command prefix the audience may act within.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.payload().command
    }

    /// Conditions on the arguments of any invocation under this grant.
    #[must_use]
    pub const fn policy(&self) -> &Vec<Predicate> {
        &self.payload().policy
    }

    /// When this grant expires, or `None` for a grant that never does.
    #[must_use]
    pub const fn expiration(&self) -> Option<Timestamp> {
        self.payload().expiration
    }

    /// The earliest time this grant may be used.
    #[must_use]
    pub const fn not_before(&self) -> Option<Timestamp> {
        self.payload().not_before
    }

    /// Free-form metadata, empty when absent. Not covered by validation.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Ipld> {
        static EMPTY: BTreeMap<String, Ipld> = BTreeMap::new();
        self.payload().meta.as_ref().unwrap_or(&EMPTY)
    }

    /// The nonce distinguishing otherwise-identical grants.
    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.payload().nonce
    }

    /// Whether this delegation is its own proof: issued by the subject
    /// itself, so it terminates a chain.
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        match self.subject() {
            Subject::Specific(subject) => subject == self.issuer(),
            Subject::Any => false,
        }
    }

    /// The content identifier of this delegation's envelope.
    #[must_use]
    pub fn to_cid(&self) -> Cid {
        to_dagcbor_cid(&self)
    }

    const fn signature(&self) -> &S {
        &self.0.0
    }

    const fn envelope(&self) -> &EnvelopePayload<S, DelegationPayload> {
        &self.0.1
    }

    const fn payload(&self) -> &DelegationPayload {
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
        let payload = self
            .envelope()
            .encode()
            .map_err(SignatureVerificationError::EncodingError)?;
        let verifier = resolver
            .resolve(self.issuer())
            .await
            .map_err(SignatureVerificationError::ResolutionError)?;
        Verifier::verify(&verifier, &payload, self.signature())
            .await
            .map_err(SignatureVerificationError::VerificationError)
    }

    /// Check that this delegation is usable at `now`.
    ///
    /// Verifies the signature, that `now` is not before `nbf`, and that
    /// the delegation has not been revoked. Expiry is deliberately not
    /// checked here: stores drop expired delegations on their own, and a
    /// missing `exp` means the grant never expires.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegationValidationError`] naming the failed check.
    pub async fn validate<R, O>(
        &self,
        resolver: &R,
        revocation: &O,
        now: Timestamp,
    ) -> Result<(), DelegationValidationError<R::Error, O::Error>>
    where
        R: Resolver<S>,
        O: RevocationOracle,
    {
        self.verify_signature(resolver)
            .await
            .map_err(DelegationValidationError::Signature)?;

        if let Some(not_before) = self.not_before() {
            if now < not_before {
                return Err(DelegationValidationError::NotYetValid { not_before, now });
            }
        }

        let cid = self.to_cid();
        if revocation
            .is_revoked(&cid)
            .await
            .map_err(DelegationValidationError::RevocationCheck)?
        {
            return Err(DelegationValidationError::Revoked(cid));
        }

        Ok(())
    }

    /// Decode a delegation from DAG-CBOR bytes and validate it at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegationValidationError`] when the bytes do not
    /// decode as a delegation envelope or any [`validate`][Self::validate]
    /// check fails.
    pub async fn from_bytes<R, O>(
        bytes: &[u8],
        resolver: &R,
        revocation: &O,
        now: Timestamp,
    ) -> Result<Self, DelegationValidationError<R::Error, O::Error>>
    where
        S: for<'de> Deserialize<'de>,
        R: Resolver<S>,
        O: RevocationOracle,
    {
        let delegation: Delegation<S> = serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| DelegationValidationError::Decode(e.to_string()))?;
        delegation.validate(resolver, revocation, now).await?;
        Ok(delegation)
    }
}

impl<S: Signature> Debug for Delegation<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Delegation").field(&self.0).finish()
    }
}

impl<S: Signature> Serialize for Delegation<S> {
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, S: Signature + for<'ze> Deserialize<'ze>> Deserialize<'de> for Delegation<S> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::<S, DelegationPayload>::deserialize(deserializer)?;
        Ok(Delegation(envelope))
    }
}

/// Answers whether a delegation has been revoked by its CID.
///
/// Issuers may retract grants out of band; chain validation consults
/// this oracle for every link. Use [`NeverRevoked`] when no revocation
/// channel exists.
pub trait RevocationOracle {
    /// Error the oracle's backing lookup may produce.
    type Error: std::error::Error;

    /// Whether the delegation with this CID has been revoked.
    fn is_revoked(&self, cid: &Cid) -> impl Future<Output = Result<bool, Self::Error>>;
}

/// The oracle that revokes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRevoked;

impl RevocationOracle for NeverRevoked {
    type Error = std::convert::Infallible;

    async fn is_revoked(&self, _cid: &Cid) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl<O: RevocationOracle> RevocationOracle for &O {
    type Error = O::Error;

    async fn is_revoked(&self, cid: &Cid) -> Result<bool, Self::Error> {
        (*self).is_revoked(cid).await
    }
}

/// The unsigned content of a [`Delegation`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud")]
    pub(crate) audience: Did,

    #[serde(rename = "sub")]
    pub(crate) subject: Subject,

    #[serde(rename = "cmd")]
    pub(crate) command: Command,

    #[serde(rename = "pol")]
    pub(crate) policy: Vec<Predicate>,

    #[serde(rename = "exp")]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(rename = "nbf", skip_serializing_if = "Option::is_none")]
    pub(crate) not_before: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<BTreeMap<String, Ipld>>,

    pub(crate) nonce: Nonce,
}

impl<'de> Deserialize<'de> for DelegationPayload {
    fn deserialize<T>(deserializer: T) -> Result<Self, T::Error>
    where
        T: Deserializer<'de>,
    {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = DelegationPayload;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map with keys iss,aud,sub,cmd,pol,exp,nbf,meta,nonce")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut issuer: Option<Did> = None;
                let mut audience: Option<Did> = None;
                let mut subject: Option<Subject> = None;
                let mut command: Option<Command> = None;
                let mut policy: Option<Vec<Predicate>> = None;
                let mut expiration: Option<Option<Timestamp>> = None;
                let mut not_before: Option<Option<Timestamp>> = None;
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
                        "pol" => {
                            if policy.is_some() {
                                return Err(de::Error::duplicate_field("pol"));
                            }
                            policy = Some(map.next_value()?);
                        }
                        "exp" => {
                            if expiration.is_some() {
                                return Err(de::Error::duplicate_field("exp"));
                            }
                            expiration = Some(map.next_value()?);
                        }
                        "nbf" => {
                            if not_before.is_some() {
                                return Err(de::Error::duplicate_field("nbf"));
                            }
                            not_before = Some(map.next_value()?);
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
                                    "iss", "aud", "sub", "cmd", "pol", "exp", "nbf", "meta",
                                    "nonce",
                                ],
                            ));
                        }
                    }
                }

                let issuer = issuer.ok_or_else(|| de::Error::missing_field("iss"))?;
                let audience = audience.ok_or_else(|| de::Error::missing_field("aud"))?;
                let subject = subject.ok_or_else(|| de::Error::missing_field("sub"))?;
                let command = command.ok_or_else(|| de::Error::missing_field("cmd"))?;
                let policy = policy.ok_or_else(|| de::Error::missing_field("pol"))?;
                let nonce = nonce.ok_or_else(|| de::Error::missing_field("nonce"))?;

                Ok(DelegationPayload {
                    issuer,
                    audience,
                    subject,
                    command,
                    policy,
                    nonce,
                    expiration: expiration.unwrap_or(None),
                    not_before: not_before.unwrap_or(None),
                    meta,
                })
            }
        }

        deserializer.deserialize_map(PayloadVisitor)
    }
}

/// Error type for delegation signature verification.
#[derive(Debug, thiserror::Error)]
pub enum SignatureVerificationError<E: std::error::Error = signature::Error> {
    /// Payload encoding failed.
    #[error("encoding error: {0}")]
    EncodingError(CodecError),

    /// DID resolution failed.
    #[error("resolution error: {0}")]
    ResolutionError(E),

    /// Cryptographic verification failed.
    #[error("verification error: {0}")]
    VerificationError(signature::Error),
}

/// Error type for full delegation validation.
#[derive(Debug, thiserror::Error)]
pub enum DelegationValidationError<R: std::error::Error, O: std::error::Error> {
    /// The bytes did not decode as a delegation envelope.
    #[error("delegation envelope decoding failed: {0}")]
    Decode(String),

    /// The envelope signature did not verify.
    #[error(transparent)]
    Signature(SignatureVerificationError<R>),

    /// The delegation's `nbf` lies in the future.
    #[error("delegation is not valid before {not_before} (checked at {now})")]
    NotYetValid {
        /// The delegation's `nbf` field.
        not_before: Timestamp,
        /// The time the check ran at.
        now: Timestamp,
    },

    /// The delegation has been revoked.
    #[error("delegation {0} has been revoked")]
    Revoked(Cid),

    /// The revocation oracle's lookup failed.
    #[error("revocation check failed: {0}")]
    RevocationCheck(O),
}

impl<S: Signature> From<&Delegation<S>> for TimeRange {
    fn from(delegation: &Delegation<S>) -> Self {
        Self::new(delegation.not_before(), delegation.expiration())
    }
}

impl PayloadTag for DelegationPayload {
    fn spec_id() -> &'static str {
        "dlg"
    }

    fn version() -> &'static str {
        "1.0.0-rc.1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Subject;
    use base64::prelude::*;
    use keel_credentials::ed25519::{Ed25519KeyResolver, Ed25519Signer};
    use keel_varsig::{Ed25519Signature, Principal};
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use testresult::TestResult;

    async fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).await.unwrap()
    }

    async fn test_did(seed: u8) -> Did {
        test_signer(seed).await.did()
    }

    /// Oracle backed by an in-memory set of revoked CIDs.
    struct SetOracle(HashSet<Cid>);

    impl RevocationOracle for SetOracle {
        type Error = std::convert::Infallible;

        async fn is_revoked(&self, cid: &Cid) -> Result<bool, Self::Error> {
            Ok(self.0.contains(cid))
        }
    }

    #[tokio::test]
    async fn delegation_has_correct_fields() -> TestResult {
        let iss = test_signer(10).await;
        let aud = test_did(20).await;
        let sub = test_did(30).await;
        let cmd: Command = "/storage/read".parse()?;

        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(iss.clone())
            .audience(aud.clone())
            .subject(Subject::Specific(sub.clone()))
            .command(cmd.clone())
            .try_build()
            .await?;

        assert_eq!(delegation.issuer(), &iss.did());
        assert_eq!(delegation.audience(), &aud);
        assert_eq!(delegation.subject(), &Subject::Specific(sub));
        assert_eq!(delegation.command(), &cmd);
        assert!(delegation.policy().is_empty());
        assert!(delegation.meta().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delegation_signature_verifies() -> TestResult {
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(42).await)
            .audience(test_did(43).await)
            .subject(Subject::Specific(test_did(44).await))
            .command("/test".parse()?)
            .try_build()
            .await?;

        delegation.verify_signature(&Ed25519KeyResolver).await?;
        Ok(())
    }

    #[tokio::test]
    async fn serialization_roundtrip() -> TestResult {
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(50).await)
            .audience(test_did(51).await)
            .subject(Subject::Any)
            .command("/roundtrip".parse()?)
            .try_build()
            .await?;

        let bytes = serde_ipld_dagcbor::to_vec(&delegation)?;
        let roundtripped: Delegation<Ed25519Signature> = serde_ipld_dagcbor::from_slice(&bytes)?;

        assert_eq!(roundtripped.issuer(), delegation.issuer());
        assert_eq!(roundtripped.audience(), delegation.audience());
        assert_eq!(roundtripped.subject(), &Subject::Any);
        assert_eq!(roundtripped.command(), delegation.command());
        assert_eq!(roundtripped.nonce(), delegation.nonce());
        assert_eq!(roundtripped.to_cid(), delegation.to_cid());
        Ok(())
    }

    #[test]
    fn delegation_b64_fixture_roundtrip() -> TestResult {
        // Powerline delegation with sub: null, cmd: "/", exp: null, meta: {}
        let b64 = "glhA0rict5hwniXnh54Y7b0v/ZEDNSlPdBx0rsoWDYC2Ylv+UzDr00s7ojPsfvNwrofqKItK911ZGJggZSkeQIB3DqJhaEg0Ae0B7QETcXN1Y2FuL2RsZ0AxLjAuMC1yYy4xqWNhdWR4OGRpZDprZXk6ejZNa2ZGSkJ4U0JGZ29BcVRRTFM3YlRmUDhNZ3lEeXB2YTVpNkNMNVBKTjhSSlpyY2NtZGEvY2V4cPZjaXNzeDhkaWQ6a2V5Ono2TWtyQXNxMU03dEVmUHZXNWRSMlVGQ3daU3pSTU5YWWVUVzh0R1pTS3ZVbTlFWmNuYmYaaSTxp2Nwb2yAY3N1YvZkbWV0YaBlbm9uY2VMVkDFeab+58p8SMpW";
        let bytes = BASE64_STANDARD.decode(b64)?;

        let delegation: Delegation<Ed25519Signature> = serde_ipld_dagcbor::from_slice(&bytes)?;

        assert_eq!(delegation.subject(), &Subject::Any);
        assert_eq!(delegation.command(), &Command::root());
        assert_eq!(delegation.expiration(), None);
        assert!(delegation.not_before().is_some());
        assert_eq!(delegation.nonce().as_bytes().len(), 12);

        let reserialized = serde_ipld_dagcbor::to_vec(&delegation)?;
        assert_eq!(bytes, reserialized);
        Ok(())
    }

    #[tokio::test]
    async fn future_not_before_is_rejected() -> TestResult {
        let now = Timestamp::now();
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(60).await)
            .audience(test_did(61).await)
            .subject(Subject::Any)
            .command("/test".parse()?)
            .not_before(now + std::time::Duration::from_secs(3600))
            .try_build()
            .await?;

        let result = delegation
            .validate(&Ed25519KeyResolver, &NeverRevoked, now)
            .await;
        assert!(matches!(
            result,
            Err(DelegationValidationError::NotYetValid { .. })
        ));

        // Valid once the window opens
        delegation
            .validate(
                &Ed25519KeyResolver,
                &NeverRevoked,
                now + std::time::Duration::from_secs(7200),
            )
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn revoked_delegation_is_rejected() -> TestResult {
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(70).await)
            .audience(test_did(71).await)
            .subject(Subject::Any)
            .command("/test".parse()?)
            .try_build()
            .await?;

        let oracle = SetOracle(HashSet::from([delegation.to_cid()]));
        let result = delegation
            .validate(&Ed25519KeyResolver, &oracle, Timestamp::now())
            .await;
        assert!(matches!(result, Err(DelegationValidationError::Revoked(_))));

        let oracle = SetOracle(HashSet::new());
        delegation
            .validate(&Ed25519KeyResolver, &oracle, Timestamp::now())
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn from_bytes_rejects_garbage_and_accepts_valid_tokens() -> TestResult {
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(80).await)
            .audience(test_did(81).await)
            .subject(Subject::Any)
            .command("/test".parse()?)
            .try_build()
            .await?;
        let bytes = serde_ipld_dagcbor::to_vec(&delegation)?;

        let decoded = Delegation::<Ed25519Signature>::from_bytes(
            &bytes,
            &Ed25519KeyResolver,
            &NeverRevoked,
            Timestamp::now(),
        )
        .await?;
        assert_eq!(decoded.to_cid(), delegation.to_cid());

        let result = Delegation::<Ed25519Signature>::from_bytes(
            b"not a delegation",
            &Ed25519KeyResolver,
            &NeverRevoked,
            Timestamp::now(),
        )
        .await;
        assert!(matches!(result, Err(DelegationValidationError::Decode(_))));
        Ok(())
    }

    #[tokio::test]
    async fn tampered_payload_fails_verification() -> TestResult {
        let delegation = Delegation::<Ed25519Signature>::builder()
            .issuer(test_signer(90).await)
            .audience(test_did(91).await)
            .subject(Subject::Any)
            .command("/narrow".parse()?)
            .try_build()
            .await?;

        // Splice the signature onto a payload with a broader command
        let mut forged = delegation.clone();
        forged.0.1.payload.command = Command::root();
        let result = forged.verify_signature(&Ed25519KeyResolver).await;
        assert!(matches!(
            result,
            Err(SignatureVerificationError::VerificationError(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn explicit_nonce_makes_builds_deterministic() -> TestResult {
        let iss = test_signer(100).await;
        let aud = test_did(101).await;
        let nonce = Nonce::generate_12()?;

        let build = || async {
            Delegation::<Ed25519Signature>::builder()
                .issuer(iss.clone())
                .audience(aud.clone())
                .subject(Subject::Any)
                .command("/compare".parse().unwrap())
                .nonce(nonce.clone())
                .try_build()
                .await
        };

        let first = build().await?;
        let second = build().await?;

        // Ed25519 signing is deterministic, so the envelopes match bytewise
        let bytes1 = serde_ipld_dagcbor::to_vec(&first)?;
        let bytes2 = serde_ipld_dagcbor::to_vec(&second)?;
        assert_eq!(bytes1, bytes2);
        assert_eq!(first.to_cid(), second.to_cid());
        Ok(())
    }
}
