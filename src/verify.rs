//! Manifest verification pipeline
//!
//! Structure, proof gates, key resolution, canonical hash, signature and
//! temporal checks run in that order, each failure typed.

use crate::crypto::{sha256, verify, SIGNATURE_LENGTH};
use crate::error::{AuthError, Result};
use crate::manifest::{
    AgentManifest, MANIFEST_PROOF_PURPOSE, MANIFEST_PROOF_TYPE, MAX_MANIFEST_VALIDITY_DAYS,
};
use crate::multibase;
use crate::resolver::DidResolver;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Verifier for signed agent manifests
pub struct ManifestVerifier {
    resolver: Arc<DidResolver>,
    clock_skew: Duration,
}

impl ManifestVerifier {
    /// Create a verifier. `clock_skew_secs` is applied in the past
    /// direction only: slightly stale manifests pass, future-dated ones
    /// gain nothing.
    pub fn new(resolver: Arc<DidResolver>, clock_skew_secs: u64) -> Self {
        Self {
            resolver,
            clock_skew: Duration::seconds(clock_skew_secs as i64),
        }
    }

    /// Verify a manifest against the current time.
    pub async fn verify(&self, manifest: &AgentManifest) -> Result<()> {
        self.verify_at(manifest, Utc::now()).await
    }

    /// Verify a manifest against an explicit `now`.
    pub async fn verify_at(&self, manifest: &AgentManifest, now: DateTime<Utc>) -> Result<()> {
        manifest.validate_schema()?;

        let proof = manifest.proof.as_ref().ok_or_else(|| {
            AuthError::InvalidManifestSignature("manifest carries no proof".to_string())
        })?;

        if proof.proof_type != MANIFEST_PROOF_TYPE {
            return Err(AuthError::InvalidManifestSignature(format!(
                "unsupported proof type: {}",
                proof.proof_type
            )));
        }
        if proof.proof_purpose != MANIFEST_PROOF_PURPOSE {
            return Err(AuthError::InvalidManifestSignature(format!(
                "unsupported proof purpose: {}",
                proof.proof_purpose
            )));
        }
        if !proof.proof_value.starts_with('z') {
            return Err(AuthError::InvalidManifestSignature(
                "proof_value is not multibase base58btc".to_string(),
            ));
        }
        if !proof.verification_method.starts_with(&manifest.id) {
            return Err(AuthError::InvalidManifestSignature(
                "verification_method is not controlled by the manifest id".to_string(),
            ));
        }

        let public_key = self
            .resolver
            .resolve(&manifest.id, Some(&proof.verification_method))
            .await?;

        let digest = sha256(&manifest.signing_bytes()?);

        let signature = multibase::decode(&proof.proof_value).map_err(|_| {
            AuthError::InvalidManifestSignature("proof_value is not valid base58btc".to_string())
        })?;
        if signature.len() != SIGNATURE_LENGTH {
            return Err(AuthError::InvalidManifestSignature(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                signature.len()
            )));
        }

        if !verify(&signature, &digest, &public_key)? {
            debug!(did = %manifest.id, sequence = manifest.sequence, "manifest signature rejected");
            return Err(AuthError::InvalidManifestSignature(
                "signature does not verify against the resolved key".to_string(),
            ));
        }

        let valid_until = manifest.valid_until()?;
        if valid_until + self.clock_skew < now {
            return Err(AuthError::ManifestExpired);
        }
        if valid_until > now + Duration::days(MAX_MANIFEST_VALIDITY_DAYS) {
            return Err(AuthError::InvalidRequest(format!(
                "valid_until lies more than {} days ahead",
                MAX_MANIFEST_VALIDITY_DAYS
            )));
        }

        Ok(())
    }
}
