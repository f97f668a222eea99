//! Decentralized Identifiers
//!
//! Parsing for `did:<method>:<identifier>`, the did:key codec
//! (multicodec `0xED 0x01` + multibase base58btc), and the DID Document
//! wire types consumed by did:web resolution.

use crate::crypto::PUBLIC_KEY_LENGTH;
use crate::error::{AuthError, Result};
use crate::multibase;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ed25519 public key multicodec prefix (varint-encoded 0xed).
const ED25519_MULTICODEC: [u8; 2] = [0xED, 0x01];

/// Supported DID methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    /// Identifier encodes the public key directly; resolvable offline
    Key,
    /// Identifier names a domain (and optional path); resolution fetches
    /// the DID Document over HTTPS
    Web,
}

impl fmt::Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DidMethod::Key => write!(f, "key"),
            DidMethod::Web => write!(f, "web"),
        }
    }
}

/// A parsed DID
///
/// The identifier is opaque at this level; method-specific resolvers
/// interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Did {
    /// The full DID string as presented
    pub did: String,
    /// Parsed method
    pub method: DidMethod,
    /// Method-specific identifier (everything after the second colon)
    pub identifier: String,
}

impl Did {
    /// Parse a `did:<method>:<identifier>` string.
    ///
    /// A DID URL fragment (`#key-1`) is not part of a DID; strip it with
    /// [`split_did_url`] first.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let identifier = parts.next().unwrap_or_default();

        if scheme != "did" || method.is_empty() || identifier.is_empty() {
            return Err(AuthError::InvalidRequest(format!(
                "malformed DID: {}",
                s
            )));
        }

        let method = match method {
            "key" => DidMethod::Key,
            "web" => DidMethod::Web,
            other => return Err(AuthError::UnsupportedDidMethod(other.to_string())),
        };

        Ok(Self {
            did: s.to_string(),
            method,
            identifier: identifier.to_string(),
        })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.did)
    }
}

/// Split a DID URL into its DID part and optional fragment.
pub fn split_did_url(did_url: &str) -> (&str, Option<&str>) {
    match did_url.split_once('#') {
        Some((did, fragment)) => (did, Some(fragment)),
        None => (did_url, None),
    }
}

/// Encode an Ed25519 public key as a did:key string.
///
/// Layout: `did:key:z` + base58btc(`0xED 0x01` + 32 key bytes).
pub fn public_key_to_did_key(public_key: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    let mut bytes = [0u8; 2 + PUBLIC_KEY_LENGTH];
    bytes[..2].copy_from_slice(&ED25519_MULTICODEC);
    bytes[2..].copy_from_slice(public_key);
    format!("did:key:{}", multibase::encode(&bytes))
}

/// Extract the Ed25519 public key from a did:key identifier.
///
/// The identifier must be `z`-prefixed base58btc decoding to exactly 34
/// bytes with the Ed25519 multicodec prefix. Any other key type is a
/// resolution failure, not a parse error.
pub fn did_key_to_public_key(identifier: &str) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
    if !identifier.starts_with('z') {
        return Err(AuthError::DidResolutionFailed(
            "did:key identifier must be multibase base58btc (z prefix)".to_string(),
        ));
    }

    let bytes = multibase::decode(identifier)
        .map_err(|_| AuthError::DidResolutionFailed("invalid base58btc in did:key".to_string()))?;

    if bytes.len() != 2 + PUBLIC_KEY_LENGTH {
        return Err(AuthError::DidResolutionFailed(format!(
            "did:key must decode to 34 bytes, got {}",
            bytes.len()
        )));
    }

    if bytes[..2] != ED25519_MULTICODEC {
        return Err(AuthError::DidResolutionFailed(
            "did:key multicodec is not Ed25519 (expected 0xed01)".to_string(),
        ));
    }

    let mut key = [0u8; PUBLIC_KEY_LENGTH];
    key.copy_from_slice(&bytes[2..]);
    Ok(key)
}

/// A DID Document as served at `/.well-known/did.json`
///
/// Only the members did:web resolution needs; everything else in the
/// document is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    /// The DID this document describes
    pub id: String,

    /// Cryptographic keys associated with this DID
    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationMethod>,

    /// References to verification methods usable for assertions
    #[serde(rename = "assertionMethod", default)]
    pub assertion_method: Vec<String>,
}

/// A verification method entry in a DID Document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// DID URL identifying this method (usually `<did>#<fragment>`)
    pub id: String,

    /// Key suite type (e.g. "Ed25519VerificationKey2020")
    #[serde(rename = "type")]
    pub method_type: String,

    /// The DID that controls this key
    pub controller: String,

    /// Public key in multibase form (`z` + base58btc of multicodec + key)
    #[serde(rename = "publicKeyMultibase", default)]
    pub public_key_multibase: Option<String>,
}
