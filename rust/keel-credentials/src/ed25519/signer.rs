//! Ed25519 signer implementation.

use super::{error::Ed25519SignerError, verifier::Ed25519Verifier};
use keel_varsig::{Did, Ed25519Signature, Principal, Signer};
use serde::Serialize;

/// An Ed25519 `did:key` signer wrapping an `ed25519_dalek::SigningKey`.
///
/// The verifier half is derived once at construction so that
/// [`did`][Principal::did] never recomputes the public key.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    did: Ed25519Verifier,
    signer: ed25519_dalek::SigningKey,
}

impl From<ed25519_dalek::SigningKey> for Ed25519Signer {
    fn from(signer: ed25519_dalek::SigningKey) -> Self {
        let did = Ed25519Verifier::from(&signer);
        Self { did, signer }
    }
}

impl Ed25519Signer {
    /// Generate a fresh keypair from the system RNG.
    ///
    /// # Errors
    ///
    /// Returns an [`Ed25519SignerError`] if the RNG fails.
    #[allow(clippy::unused_async)]
    pub async fn generate() -> Result<Self, Ed25519SignerError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(Ed25519SignerError::Rng)?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&seed).into())
    }

    /// Import a keypair from its 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an [`Ed25519SignerError`] if the seed has the wrong length.
    #[allow(clippy::unused_async)]
    pub async fn import(seed: impl AsRef<[u8]>) -> Result<Self, Ed25519SignerError> {
        let seed = seed.as_ref();
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519SignerError::InvalidSeedLength(seed.len()))?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&seed).into())
    }

    /// Export the 32-byte seed.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.signer.to_bytes()
    }

    /// The verifier half of this keypair.
    #[must_use]
    pub const fn verifier(&self) -> &Ed25519Verifier {
        &self.did
    }
}

impl std::fmt::Display for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.did)
    }
}

impl Signer<Ed25519Signature> for Ed25519Signer {
    async fn sign(&self, msg: &[u8]) -> Result<Ed25519Signature, signature::Error> {
        let sig = signature::Signer::try_sign(&self.signer, msg)?;
        Ok(Ed25519Signature::from(sig))
    }
}

impl Principal for Ed25519Signer {
    fn did(&self) -> Did {
        self.did.did()
    }
}

impl Serialize for Ed25519Signer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.did.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_varsig::Verifier;
    use testresult::TestResult;

    async fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).await.unwrap()
    }

    #[tokio::test]
    async fn did_roundtrips_through_its_string_form() -> TestResult {
        let signer = test_signer(0).await;
        let parsed: Ed25519Verifier = signer.verifier().to_string().parse()?;
        assert_eq!(&parsed, signer.verifier());
        Ok(())
    }

    #[tokio::test]
    async fn signatures_verify_with_the_matching_key() -> TestResult {
        let signer = test_signer(42).await;
        let msg = b"test message for async signing";

        let signature = signer.sign(msg).await?;
        signer.verifier().verify(msg, &signature).await?;

        // A different message must not verify
        assert!(
            signer
                .verifier()
                .verify(b"tampered message", &signature)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn cross_verification_fails() -> TestResult {
        let signer1 = test_signer(1).await;
        let signer2 = test_signer(2).await;
        let msg = b"same message";

        let sig1 = signer1.sign(msg).await?;
        let sig2 = signer2.sign(msg).await?;
        assert_ne!(sig1, sig2);

        assert!(signer1.verifier().verify(msg, &sig2).await.is_err());
        assert!(signer2.verifier().verify(msg, &sig1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn export_import_roundtrip_preserves_the_key() -> TestResult {
        let signer = test_signer(77).await;

        let seed = signer.export();
        assert_eq!(seed, [77u8; 32]);

        let restored = Ed25519Signer::import(&seed).await?;
        assert_eq!(restored.did(), signer.did());

        let msg = b"roundtrip signing test";
        let signature = restored.sign(msg).await?;
        signer.verifier().verify(msg, &signature).await?;
        Ok(())
    }

    #[tokio::test]
    async fn wrong_seed_lengths_are_rejected() {
        let result = Ed25519Signer::import([0u8; 16]).await;
        assert!(matches!(
            result,
            Err(Ed25519SignerError::InvalidSeedLength(16))
        ));
    }

    #[tokio::test]
    async fn generated_keys_differ() -> TestResult {
        let a = Ed25519Signer::generate().await?;
        let b = Ed25519Signer::generate().await?;
        assert_ne!(a.did(), b.did());
        Ok(())
    }
}
