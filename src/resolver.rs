//! DID resolution
//!
//! Maps a DID to a 32-byte Ed25519 public key. `did:key` resolves
//! offline from the identifier itself; `did:web` fetches the DID
//! Document under the configured fetch budget. Every network, size,
//! redirect, parse or structural failure collapses into
//! `DidResolutionFailed`; the underlying cause is logged, never
//! surfaced to clients.

use crate::crypto::PUBLIC_KEY_LENGTH;
use crate::did::{
    did_key_to_public_key, split_did_url, Did, DidDocument, DidMethod, VerificationMethod,
};
use crate::error::{AuthError, Result};
use crate::fetch::{FetchBudget, HttpFetch};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::debug;

/// Resolver for the `key` and `web` DID methods
pub struct DidResolver {
    fetcher: Arc<dyn HttpFetch>,
    budget: FetchBudget,
}

impl DidResolver {
    /// Create a resolver over an injected fetcher and budget.
    pub fn new(fetcher: Arc<dyn HttpFetch>, budget: FetchBudget) -> Self {
        Self { fetcher, budget }
    }

    /// Resolve a DID (or DID URL) to an Ed25519 public key.
    ///
    /// `verification_method` is the DID URL from a manifest proof, if
    /// any; for did:web it selects the matching document entry. Without
    /// it the first `assertionMethod` reference wins, then the first
    /// `verificationMethod` entry.
    pub async fn resolve(
        &self,
        did: &str,
        verification_method: Option<&str>,
    ) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
        let (did_part, _fragment) = split_did_url(did);
        let parsed = Did::parse(did_part)?;

        match parsed.method {
            DidMethod::Key => did_key_to_public_key(&parsed.identifier),
            DidMethod::Web => self.resolve_web(&parsed, verification_method).await,
        }
    }

    async fn resolve_web(
        &self,
        did: &Did,
        verification_method: Option<&str>,
    ) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
        let url = did_web_document_url(&did.identifier)?;

        let body = self
            .fetcher
            .get_json(&url, &self.budget)
            .await
            .map_err(|e| {
                debug!(did = %did.did, error = %e, "did:web document fetch failed");
                AuthError::DidResolutionFailed("could not fetch DID document".to_string())
            })?;

        let document: DidDocument = serde_json::from_value(body).map_err(|e| {
            debug!(did = %did.did, error = %e, "did:web document malformed");
            AuthError::DidResolutionFailed("malformed DID document".to_string())
        })?;

        let method = select_verification_method(&document, verification_method).ok_or_else(
            || AuthError::DidResolutionFailed("no usable verification method".to_string()),
        )?;

        let multibase_key = method.public_key_multibase.as_deref().ok_or_else(|| {
            AuthError::DidResolutionFailed("verification method has no publicKeyMultibase".into())
        })?;

        did_key_to_public_key(multibase_key)
    }
}

/// Build the DID Document URL for a did:web identifier.
///
/// `:` becomes `/`, percent escapes are decoded, and the well-known path
/// is appended: `did:web:example.com:user:alice` maps to
/// `https://example.com/user/alice/.well-known/did.json`.
pub fn did_web_document_url(identifier: &str) -> Result<String> {
    let host_and_path = decode_web_identifier(identifier)?;
    Ok(format!("https://{}/.well-known/did.json", host_and_path))
}

/// The host (first identifier segment, percent-decoded) of a did:web DID.
///
/// Used for the optional remote manifest at
/// `https://<host>/.well-known/agent-manifest.json`.
pub fn did_web_host(identifier: &str) -> Result<String> {
    let first = identifier.split(':').next().unwrap_or_default();
    if first.is_empty() {
        return Err(AuthError::DidResolutionFailed(
            "empty did:web identifier".to_string(),
        ));
    }
    percent_decode_str(first)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|_| AuthError::DidResolutionFailed("invalid percent encoding".to_string()))
}

fn decode_web_identifier(identifier: &str) -> Result<String> {
    if identifier.is_empty() {
        return Err(AuthError::DidResolutionFailed(
            "empty did:web identifier".to_string(),
        ));
    }
    let slashed = identifier.replace(':', "/");
    percent_decode_str(&slashed)
        .decode_utf8()
        .map(|s| s.to_string())
        .map_err(|_| AuthError::DidResolutionFailed("invalid percent encoding".to_string()))
}

/// Pick the document entry a proof points at, or the assertion default.
fn select_verification_method<'a>(
    document: &'a DidDocument,
    hint: Option<&str>,
) -> Option<&'a VerificationMethod> {
    if let Some(hint) = hint {
        let (_, hint_fragment) = split_did_url(hint);
        return document.verification_method.iter().find(|vm| {
            vm.id == hint
                || match (hint_fragment, split_did_url(&vm.id).1) {
                    (Some(h), Some(v)) => h == v,
                    _ => false,
                }
        });
    }

    if let Some(reference) = document.assertion_method.first() {
        let found = document.verification_method.iter().find(|vm| {
            vm.id == *reference
                || (reference.starts_with('#') && vm.id.ends_with(reference.as_str()))
        });
        if found.is_some() {
            return found;
        }
    }

    document.verification_method.first()
}
