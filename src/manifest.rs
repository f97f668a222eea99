//! Agent manifests
//!
//! The manifest is the self-describing, self-signed document an agent
//! presents at verification time. Wire shape, length caps and field
//! regexes live here as `validator` rules; the signature pipeline itself
//! is in [`crate::verify`].
//!
//! Timestamps stay `String` on the type and are parsed on demand: the
//! signing input is the canonical form of the document *as signed*, so
//! round-tripping through a normalizing type would break verification
//! for any client that signs with a non-UTC offset.

use crate::canonical::to_jcs_bytes_without;
use crate::crypto::{sign, sha256};
use crate::did::Did;
use crate::error::{AuthError, Result};
use crate::multibase;
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_compact::KeyPair;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Proof suite accepted for manifest signatures
pub const MANIFEST_PROOF_TYPE: &str = "Ed25519Signature2020";

/// Proof purpose accepted for manifest signatures
pub const MANIFEST_PROOF_PURPOSE: &str = "assertionMethod";

/// Upper bound on how far in the future `valid_until` may lie
pub const MAX_MANIFEST_VALIDITY_DAYS: i64 = 365;

/// Bitcoin base58 alphabet (no `0`, `O`, `I`, `l`)
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A signed agent manifest
///
/// Immutable once signed; any structural change invalidates the proof.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AgentManifest {
    /// Semver of the manifest schema used
    #[validate(custom(function = "validate_semver"))]
    pub version: String,

    /// The agent's DID
    #[validate(custom(function = "validate_did"))]
    pub id: String,

    /// Strictly monotonic per-DID counter, starting at 1
    #[validate(range(min = 1))]
    pub sequence: u64,

    /// RFC 3339 creation timestamp (with offset)
    #[validate(custom(function = "validate_rfc3339"))]
    pub created_at: String,

    /// RFC 3339 last-update timestamp (with offset)
    #[validate(custom(function = "validate_rfc3339"))]
    pub updated_at: String,

    /// RFC 3339 expiry timestamp (with offset)
    #[validate(custom(function = "validate_rfc3339"))]
    pub valid_until: String,

    /// Optional revocation endpoint declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub revocation: Option<RevocationPolicy>,

    /// Descriptive metadata
    #[validate(nested)]
    pub metadata: ManifestMetadata,

    /// Declared interfaces and categories
    #[validate(nested)]
    pub capabilities: ManifestCapabilities,

    /// Ed25519Signature2020 proof; absent from the signing input
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub proof: Option<ManifestProof>,
}

impl AgentManifest {
    /// Structural validation, mapped into the wire error taxonomy.
    pub fn validate_schema(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AuthError::InvalidRequest(format!("manifest schema: {}", e)))
    }

    /// Canonical signing input: JCS bytes with the `proof` member absent.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        to_jcs_bytes_without(self, "proof")
    }

    /// Parsed `valid_until`.
    pub fn valid_until(&self) -> Result<DateTime<Utc>> {
        parse_rfc3339(&self.valid_until)
    }
}

/// Declared revocation endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RevocationPolicy {
    /// HTTPS endpoint returning `{revoked, reason?}`
    #[validate(custom(function = "validate_https_url"))]
    pub endpoint: String,

    /// Suggested polling interval in seconds, at least 60
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 60))]
    pub check_interval: Option<u64>,
}

/// Descriptive manifest metadata
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestMetadata {
    /// Display name
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    /// Free-text description
    #[validate(length(min = 1, max = 1024))]
    pub description: String,

    /// Agent software version (semver)
    #[validate(custom(function = "validate_semver"))]
    pub agent_version: String,

    /// Up to 10 tags of up to 32 characters each
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 10), custom(function = "validate_short_strings"))]
    pub tags: Option<Vec<String>>,

    /// Project homepage
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub homepage: Option<String>,

    /// Logo URL
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub logo: Option<String>,

    /// Operating organization or individual
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 256))]
    pub operator: Option<String>,
}

/// Declared interfaces and categories
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestCapabilities {
    /// At least one reachable interface
    #[validate(length(min = 1), nested)]
    pub interfaces: Vec<InterfaceDecl>,

    /// Up to 5 category labels
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 5), custom(function = "validate_short_strings"))]
    pub categories: Option<Vec<String>>,

    /// Permissions the agent expects to be granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions_required: Option<Vec<String>>,
}

/// One declared interface endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDecl {
    /// Transport protocol
    pub protocol: InterfaceProtocol,

    /// Endpoint URL
    #[validate(url)]
    pub url: String,

    /// API standard identifier (e.g. "openapi-3.1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_standard: Option<String>,

    /// Supported methods or operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,

    /// Reference to a machine-readable schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
}

/// Interface transport protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceProtocol {
    /// Plain HTTPS
    Https,
    /// Secure WebSocket
    Wss,
}

/// Ed25519Signature2020 proof attached to a manifest
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestProof {
    /// Proof suite; must be "Ed25519Signature2020"
    #[serde(rename = "type")]
    pub proof_type: String,

    /// RFC 3339 signing timestamp
    #[validate(custom(function = "validate_rfc3339"))]
    pub created: String,

    /// DID URL of the signing key; must begin with the manifest's `id`
    #[validate(length(min = 1))]
    pub verification_method: String,

    /// Proof purpose; must be "assertionMethod"
    #[validate(length(min = 1))]
    pub proof_purpose: String,

    /// `z`-prefixed base58btc of the 64-byte signature
    #[validate(custom(function = "validate_multibase"))]
    pub proof_value: String,
}

/// Sign a manifest in place.
///
/// Clears any existing proof, hashes the canonical form, and attaches a
/// fresh Ed25519Signature2020 proof. `verification_method` defaults to
/// `<id>#key-1`.
pub fn sign_manifest(
    manifest: &mut AgentManifest,
    keypair: &KeyPair,
    verification_method: Option<String>,
) -> Result<()> {
    manifest.proof = None;
    let digest = sha256(&manifest.signing_bytes()?);
    let signature = sign(&digest, keypair);

    manifest.proof = Some(ManifestProof {
        proof_type: MANIFEST_PROOF_TYPE.to_string(),
        created: format_rfc3339(Utc::now()),
        verification_method: verification_method
            .unwrap_or_else(|| format!("{}#key-1", manifest.id)),
        proof_purpose: MANIFEST_PROOF_PURPOSE.to_string(),
        proof_value: multibase::encode(&signature),
    });

    Ok(())
}

/// Render a timestamp the way this crate does everywhere on the wire.
pub fn format_rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp with offset, normalizing to UTC.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AuthError::InvalidRequest(format!("invalid RFC 3339 timestamp: {}", e)))
}

pub(crate) fn validate_did(value: &str) -> std::result::Result<(), ValidationError> {
    Did::parse(value).map(|_| ()).map_err(|_| ValidationError::new("did"))
}

fn validate_rfc3339(value: &str) -> std::result::Result<(), ValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("rfc3339"))
}

fn validate_semver(value: &str) -> std::result::Result<(), ValidationError> {
    // Pre-release / build suffixes are allowed but not inspected.
    let core = value.split(['-', '+']).next().unwrap_or(value);

    let mut parts = 0;
    for part in core.split('.') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::new("semver"));
        }
        parts += 1;
    }
    if parts != 3 {
        return Err(ValidationError::new("semver"));
    }
    Ok(())
}

pub(crate) fn validate_multibase(value: &str) -> std::result::Result<(), ValidationError> {
    let rest = value
        .strip_prefix('z')
        .ok_or_else(|| ValidationError::new("multibase"))?;
    if rest.is_empty() || !rest.chars().all(|c| BASE58_ALPHABET.contains(c)) {
        return Err(ValidationError::new("multibase"));
    }
    Ok(())
}

fn validate_https_url(value: &str) -> std::result::Result<(), ValidationError> {
    if !value.starts_with("https://") || value.len() <= "https://".len() {
        return Err(ValidationError::new("https_url"));
    }
    Ok(())
}

fn validate_short_strings(values: &Vec<String>) -> std::result::Result<(), ValidationError> {
    if values.iter().any(|v| v.is_empty() || v.len() > 32) {
        return Err(ValidationError::new("short_string"));
    }
    Ok(())
}
