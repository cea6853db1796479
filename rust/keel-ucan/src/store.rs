//! Delegation storage and chain discovery.
//!
//! Delegations live in a key-value store behind the [`KvDriver`] trait.
//! Each one is written twice: the envelope bytes under its CID, and an
//! index entry under `(subject, audience)` so that
//! [`chain`][DelegationStore::chain] can walk rootward from an invoker
//! without scanning everything. Entries carry the delegation's `exp` as
//! a TTL, so expired grants fall out of the store instead of being
//! re-checked forever.

use crate::{
    command::Command,
    delegation::Delegation,
    subject::Subject,
    time::Timestamp,
};
use futures::future::LocalBoxFuture;
use ipld_core::cid::Cid;
use keel_varsig::{Did, Signature};
use nonempty::NonEmpty;
use serde::Deserialize;
use serde_ipld_dagcbor::error::CodecError;
use std::{
    collections::{BTreeMap, HashSet},
    marker::PhantomData,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, trace};

/// Chains longer than this are assumed to be cyclic garbage.
const MAX_CHAIN_DEPTH: usize = 128;

/// Storage driver for hierarchical keys.
///
/// Keys are segment vectors rather than flat strings so that prefix
/// scans need no escaping. Values expire at `expires_at` if one is set.
pub trait KvDriver {
    /// Error the backing storage may produce.
    type Error: std::error::Error;

    /// Read the value at `key`, if any.
    fn get(&self, key: &[String]) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>>;

    /// Write `value` at `key`, expiring it at `expires_at` if set.
    fn set(
        &self,
        key: Vec<String>,
        value: Vec<u8>,
        expires_at: Option<Timestamp>,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Remove the value at `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[String]) -> impl Future<Output = Result<(), Self::Error>>;

    /// Whether a live value exists at `key`.
    fn has(&self, key: &[String]) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Drop everything.
    fn clear(&self) -> impl Future<Output = Result<(), Self::Error>>;

    /// All live entries whose key starts with `prefix`, in key order.
    fn scan_prefix(
        &self,
        prefix: &[String],
    ) -> impl Future<Output = Result<Vec<(Vec<String>, Vec<u8>)>, Self::Error>>;
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Timestamp>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// In-memory [`KvDriver`] over a sorted map.
///
/// Expiry is lazy: dead entries are dropped when a read or scan touches
/// them, not by a background task.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<Vec<String>, MemoryEntry>>,
}

impl KvDriver for MemoryKv {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &[String]) -> Result<Option<Vec<u8>>, Self::Error> {
        let now = Timestamp::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: Vec<String>,
        value: Vec<u8>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &[String]) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    async fn has(&self, key: &[String]) -> Result<bool, Self::Error> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &[String],
    ) -> Result<Vec<(Vec<String>, Vec<u8>)>, Self::Error> {
        let now = Timestamp::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(entries
            .iter()
            .filter(|(key, _)| key.len() >= prefix.len() && key[..prefix.len()] == *prefix)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}

/// Delegation persistence and proof-chain search over a [`KvDriver`].
pub struct DelegationStore<K: KvDriver, S: Signature> {
    kv: K,
    signature: PhantomData<S>,
}

/// Index key segment standing in for a powerline (`sub: null`) subject.
const POWERLINE: &str = "*";

impl<K, S> DelegationStore<K, S>
where
    K: KvDriver,
    S: Signature + for<'de> Deserialize<'de>,
{
    /// Wrap a driver.
    pub const fn new(kv: K) -> Self {
        DelegationStore {
            kv,
            signature: PhantomData,
        }
    }

    fn primary_key(cid: &Cid) -> Vec<String> {
        vec!["dlg".to_string(), cid.to_string()]
    }

    fn index_key(delegation: &Delegation<S>, cid: &Cid) -> Vec<String> {
        let subject = match delegation.subject() {
            Subject::Specific(did) => did.as_str().to_string(),
            Subject::Any => POWERLINE.to_string(),
        };
        vec![
            "idx".to_string(),
            subject,
            delegation.audience().as_str().to_string(),
            cid.to_string(),
        ]
    }

    /// Persist a delegation, indexed by subject and audience.
    ///
    /// Both entries expire with the delegation's `exp`, so the store
    /// never serves a dead grant.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when encoding or the driver fails.
    pub async fn set(&self, delegation: &Delegation<S>) -> Result<Cid, StoreError<K::Error>> {
        let bytes =
            serde_ipld_dagcbor::to_vec(delegation).map_err(|e| StoreError::Encode(e.into()))?;
        let cid = delegation.to_cid();
        let expires_at = delegation.expiration();

        self.kv
            .set(Self::primary_key(&cid), bytes, expires_at)
            .await
            .map_err(StoreError::Driver)?;
        self.kv
            .set(
                Self::index_key(delegation, &cid),
                cid.to_string().into_bytes(),
                expires_at,
            )
            .await
            .map_err(StoreError::Driver)?;

        debug!(cid = %cid, audience = %delegation.audience(), "stored delegation");
        Ok(cid)
    }

    /// Load the delegation with this CID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for absent or expired entries,
    /// and decode or driver errors otherwise.
    pub async fn get(&self, cid: &Cid) -> Result<Delegation<S>, StoreError<K::Error>> {
        let bytes = self
            .kv
            .get(&Self::primary_key(cid))
            .await
            .map_err(StoreError::Driver)?
            .ok_or(StoreError::NotFound(*cid))?;
        serde_ipld_dagcbor::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Load a batch of delegations, preserving order.
    ///
    /// # Errors
    ///
    /// Fails on the first CID that cannot be loaded.
    pub async fn get_all(&self, cids: &[Cid]) -> Result<Vec<Delegation<S>>, StoreError<K::Error>> {
        let mut delegations = Vec::with_capacity(cids.len());
        for cid in cids {
            delegations.push(self.get(cid).await?);
        }
        Ok(delegations)
    }

    /// Remove a delegation and its index entry.
    ///
    /// # Errors
    ///
    /// Returns driver errors; removing an absent delegation is fine.
    pub async fn delete(&self, cid: &Cid) -> Result<(), StoreError<K::Error>> {
        if let Ok(delegation) = self.get(cid).await {
            self.kv
                .delete(&Self::index_key(&delegation, cid))
                .await
                .map_err(StoreError::Driver)?;
        }
        self.kv
            .delete(&Self::primary_key(cid))
            .await
            .map_err(StoreError::Driver)?;
        debug!(cid = %cid, "deleted delegation");
        Ok(())
    }

    /// All live delegations granting `audience` authority over
    /// `subject`, powerline grants included.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when a scan or load fails.
    pub async fn proofs(
        &self,
        subject: &Did,
        audience: &Did,
    ) -> Result<Vec<Delegation<S>>, StoreError<K::Error>> {
        let mut delegations = Vec::new();
        for subject_key in [subject.as_str(), POWERLINE] {
            let prefix = vec![
                "idx".to_string(),
                subject_key.to_string(),
                audience.as_str().to_string(),
            ];
            for (_, value) in self
                .kv
                .scan_prefix(&prefix)
                .await
                .map_err(StoreError::Driver)?
            {
                let cid: Cid = String::from_utf8(value)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| StoreError::Decode("malformed index entry".to_string()))?;
                // The index can outlive the primary entry by a scan; a
                // missing body just means the grant expired.
                match self.get(&cid).await {
                    Ok(delegation) => delegations.push(delegation),
                    Err(StoreError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(delegations)
    }

    /// Find a proof chain authorizing `audience` to run `command` on
    /// `subject`, returned leaf first.
    ///
    /// Depth-first search rootward: at each step, keep the candidates
    /// whose command covers the one being exercised, stop at a
    /// self-signed grant, and otherwise look for whoever empowered the
    /// candidate's issuer. Already-visited `(subject, audience,
    /// command)` states are skipped, and chains deeper than
    /// [`MAX_CHAIN_DEPTH`] are abandoned, so delegation cycles cannot
    /// hang the search.
    ///
    /// # Errors
    ///
    /// Returns [`ChainSearchError::NotFound`] when no chain exists, and
    /// store errors from the underlying lookups.
    pub async fn chain(
        &self,
        audience: &Did,
        subject: &Did,
        command: &Command,
    ) -> Result<NonEmpty<Delegation<S>>, ChainSearchError<K::Error>> {
        let mut visited = HashSet::new();
        let links = self
            .search(
                audience.clone(),
                subject.clone(),
                command.clone(),
                &mut visited,
                0,
            )
            .await
            .map_err(ChainSearchError::Store)?;

        links
            .and_then(NonEmpty::from_vec)
            .ok_or_else(|| ChainSearchError::NotFound {
                audience: audience.clone(),
                subject: subject.clone(),
                command: command.clone(),
            })
    }

    fn search<'a>(
        &'a self,
        audience: Did,
        subject: Did,
        command: Command,
        visited: &'a mut HashSet<(Did, Did, Command)>,
        depth: usize,
    ) -> LocalBoxFuture<'a, Result<Option<Vec<Delegation<S>>>, StoreError<K::Error>>> {
        Box::pin(async move {
            if depth >= MAX_CHAIN_DEPTH {
                trace!(depth, "abandoning chain search at depth limit");
                return Ok(None);
            }
            if !visited.insert((subject.clone(), audience.clone(), command.clone())) {
                trace!(%subject, %audience, "skipping already-visited search state");
                return Ok(None);
            }

            for candidate in self.proofs(&subject, &audience).await? {
                // A grant covers the command when its own command is one
                // of the command's ancestors.
                if !command
                    .ancestors()
                    .any(|scope| &scope == candidate.command())
                {
                    continue;
                }

                let resolved_subject = match candidate.subject() {
                    Subject::Specific(did) => did.clone(),
                    Subject::Any => subject.clone(),
                };

                if candidate.issuer() == &resolved_subject {
                    trace!(cid = %candidate.to_cid(), "reached self-signed root");
                    return Ok(Some(vec![candidate]));
                }

                let rest = self
                    .search(
                        candidate.issuer().clone(),
                        resolved_subject,
                        candidate.command().clone(),
                        visited,
                        depth + 1,
                    )
                    .await?;
                if let Some(rootward) = rest {
                    let mut links = vec![candidate];
                    links.extend(rootward);
                    return Ok(Some(links));
                }
            }

            Ok(None)
        })
    }
}

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError<E: std::error::Error> {
    /// The backing driver failed.
    #[error("storage driver error: {0}")]
    Driver(E),

    /// No live delegation exists under this CID.
    #[error("delegation {0} not found")]
    NotFound(Cid),

    /// Stored bytes did not decode as a delegation.
    #[error("stored delegation is malformed: {0}")]
    Decode(String),

    /// The delegation could not be encoded for storage.
    #[error("delegation encoding failed: {0}")]
    Encode(CodecError),
}

/// Error type for proof-chain discovery.
#[derive(Debug, thiserror::Error)]
pub enum ChainSearchError<E: std::error::Error> {
    /// A store lookup failed mid-search.
    #[error(transparent)]
    Store(StoreError<E>),

    /// No chain connects the subject to the audience for this command.
    #[error("no proof chain grants '{audience}' command '{command}' on '{subject}'")]
    NotFound {
        /// Who needed the authority.
        audience: Did,
        /// The subject the authority is about.
        subject: Did,
        /// The command that had to be covered.
        command: Command,
    },
}
