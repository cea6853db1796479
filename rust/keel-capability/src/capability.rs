//! The capability facade.

use crate::schema::{Schema, SchemaError};
use ipld_core::ipld::Ipld;
use keel_ucan::{
    Command, Delegation, Invocation, Issuer, Subject,
    delegation::builder::BuildError as DelegationBuildError,
    invocation::builder::BuildError as InvocationBuildError,
    policy::Predicate,
    store::{ChainSearchError, DelegationStore, KvDriver},
    time::Timestamp,
};
use keel_varsig::{Did, Signature};
use serde::Deserialize;
use std::collections::BTreeMap;

/// A command bound to the argument schema it expects.
///
/// The facade hides the two-step dance of proof discovery and token
/// construction: [`invoke`][Capability::invoke] goes from plain
/// arguments to a signed, chain-checked [`Invocation`] in one call, and
/// [`delegate`][Capability::delegate] mints a [`Delegation`] scoped to
/// this command.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    command: Command,
    schema: Schema,
}

impl Capability {
    /// Bind a command to its argument schema.
    #[must_use]
    pub const fn new(command: Command, schema: Schema) -> Self {
        Capability { command, schema }
    }

    /// The command this capability exercises.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// The argument schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Build and sign an invocation of this capability.
    ///
    /// Arguments are validated against the schema first. When the
    /// issuer is not the subject, a proof chain authorizing the issuer
    /// is resolved from `store` and attached leaf first; a
    /// self-invocation carries no proofs.
    ///
    /// # Errors
    ///
    /// Returns an [`InvokeError`] when the arguments do not fit the
    /// schema, no proof chain connects the issuer to the subject, or
    /// the invocation cannot be built and signed.
    pub async fn invoke<S, I, K>(
        &self,
        issuer: I,
        subject: Did,
        arguments: BTreeMap<String, Ipld>,
        store: &DelegationStore<K, S>,
    ) -> Result<Invocation<S>, InvokeError<K::Error>>
    where
        S: Signature + for<'de> Deserialize<'de>,
        I: Issuer<S>,
        K: KvDriver,
    {
        self.schema.validate(&arguments)?;

        let issuer_did = issuer.did();
        let proofs = if issuer_did == subject {
            Vec::new()
        } else {
            store
                .chain(&issuer_did, &subject, &self.command)
                .await
                .map_err(InvokeError::Chain)?
                .into_iter()
                .collect()
        };

        let invocation = Invocation::builder()
            .issuer(issuer)
            .subject(subject)
            .command(self.command.clone())
            .arguments(arguments)
            .proofs(proofs)
            .try_build()
            .await?;

        Ok(invocation)
    }

    /// Build and sign a delegation of this capability.
    ///
    /// The grant is scoped to this capability's command. `subject` may
    /// be [`Subject::Any`] for a powerline grant, and a `None`
    /// expiration never expires.
    ///
    /// # Errors
    ///
    /// Returns a [`DelegationBuildError`] when the validity window is
    /// bogus or signing fails.
    pub async fn delegate<S, I>(
        &self,
        issuer: I,
        audience: Did,
        subject: Subject,
        policy: Vec<Predicate>,
        expiration: Option<Timestamp>,
    ) -> Result<Delegation<S>, DelegationBuildError>
    where
        S: Signature,
        I: Issuer<S>,
    {
        let mut builder = Delegation::builder()
            .issuer(issuer)
            .audience(audience)
            .subject(subject)
            .command(self.command.clone())
            .policy(policy);
        if let Some(expiration) = expiration {
            builder = builder.expiration(expiration);
        }
        builder.try_build().await
    }
}

/// Error type for [`Capability::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError<E: std::error::Error> {
    /// The arguments do not fit the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No proof chain authorizes the issuer.
    #[error("proof resolution failed: {0}")]
    Chain(ChainSearchError<E>),

    /// The invocation could not be assembled or signed.
    #[error("invocation build failed: {0}")]
    Build(#[from] InvocationBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Kind};
    use keel_credentials::ed25519::{Ed25519KeyResolver, Ed25519Signer};
    use keel_ucan::delegation::NeverRevoked;
    use keel_ucan::store::MemoryKv;
    use keel_varsig::{Ed25519Signature, Principal};
    use testresult::TestResult;

    async fn signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).await.unwrap()
    }

    fn create_account() -> Capability {
        Capability::new(
            "/account/create".parse().unwrap(),
            Schema::new().field("name", Field::required(Kind::String)),
        )
    }

    fn account_args() -> BTreeMap<String, Ipld> {
        BTreeMap::from([("name".to_string(), Ipld::String("pet project".to_string()))])
    }

    async fn two_hop_store(
        alice: &Ed25519Signer,
        bob: &Ed25519Signer,
        carol: &Ed25519Signer,
    ) -> TestResult<DelegationStore<MemoryKv, Ed25519Signature>> {
        let account: Command = "/account".parse()?;
        let store = DelegationStore::new(MemoryKv::default());

        // Root: alice grants bob everything under /account on herself
        let root = Delegation::builder()
            .issuer(alice.clone())
            .audience(bob.did())
            .subject(Subject::Specific(alice.did()))
            .command(account.clone())
            .try_build()
            .await?;
        store.set(&root).await?;

        // Bob passes the grant on to carol
        let onward = Delegation::builder()
            .issuer(bob.clone())
            .audience(carol.did())
            .subject(Subject::Specific(alice.did()))
            .command(account)
            .try_build()
            .await?;
        store.set(&onward).await?;

        Ok(store)
    }

    #[tokio::test]
    async fn invoke_round_trips_through_the_wire() -> TestResult {
        let alice = signer(1).await;
        let bob = signer(2).await;
        let carol = signer(3).await;
        let store = two_hop_store(&alice, &bob, &carol).await?;

        let invocation = create_account()
            .invoke(carol.clone(), alice.did(), account_args(), &store)
            .await?;

        assert_eq!(invocation.issuer(), &carol.did());
        assert_eq!(invocation.proofs().len(), 2);

        // The subject can receive and fully check the encoded token
        let bytes = serde_ipld_dagcbor::to_vec(&invocation)?;
        let (received, time_range) = Invocation::from_bytes(
            &bytes,
            &alice.did(),
            &store,
            &Ed25519KeyResolver,
            &NeverRevoked,
        )
        .await?;

        assert!(time_range.is_valid());
        assert_eq!(received.command(), invocation.command());
        assert_eq!(received.arguments(), invocation.arguments());
        Ok(())
    }

    #[tokio::test]
    async fn self_invocations_need_no_proofs() -> TestResult {
        let alice = signer(1).await;
        let store: DelegationStore<MemoryKv, Ed25519Signature> =
            DelegationStore::new(MemoryKv::default());

        let invocation = create_account()
            .invoke(alice.clone(), alice.did(), account_args(), &store)
            .await?;

        assert!(invocation.proofs().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn bad_arguments_fail_before_proof_discovery() -> TestResult {
        let alice = signer(1).await;
        let carol = signer(3).await;
        // Even an empty store is never consulted
        let store: DelegationStore<MemoryKv, Ed25519Signature> =
            DelegationStore::new(MemoryKv::default());

        let args = BTreeMap::from([("name".to_string(), Ipld::Integer(7))]);
        let result = create_account()
            .invoke(carol.clone(), alice.did(), args, &store)
            .await;

        assert!(matches!(result, Err(InvokeError::Schema(_))));
        Ok(())
    }

    #[tokio::test]
    async fn missing_chains_surface_as_errors() -> TestResult {
        let alice = signer(1).await;
        let mallory = signer(9).await;
        let store: DelegationStore<MemoryKv, Ed25519Signature> =
            DelegationStore::new(MemoryKv::default());

        let result = create_account()
            .invoke(mallory.clone(), alice.did(), account_args(), &store)
            .await;

        assert!(matches!(
            result,
            Err(InvokeError::Chain(ChainSearchError::NotFound { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn delegate_scopes_the_grant_to_the_command() -> TestResult {
        let alice = signer(1).await;
        let bob = signer(2).await;

        let capability = create_account();
        let delegation: Delegation<Ed25519Signature> = capability
            .delegate(
                alice.clone(),
                bob.did(),
                Subject::Specific(alice.did()),
                Vec::new(),
                None,
            )
            .await?;

        assert_eq!(delegation.command(), capability.command());
        assert_eq!(delegation.issuer(), &alice.did());
        assert_eq!(delegation.audience(), &bob.did());
        assert!(delegation.expiration().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn powerline_delegations_are_allowed() -> TestResult {
        let alice = signer(1).await;
        let bob = signer(2).await;

        let delegation: Delegation<Ed25519Signature> = create_account()
            .delegate(alice.clone(), bob.did(), Subject::Any, Vec::new(), None)
            .await?;

        assert_eq!(delegation.subject(), &Subject::Any);
        Ok(())
    }
}
