//! Error types for AMP authentication

use serde::{Deserialize, Serialize};

/// Result type for AMP operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// AMP-specific errors
///
/// Every variant maps to a wire error code (`AUTH_*`) and an HTTP status.
/// `DidPending` is not strictly an error but travels through the error
/// channel so the handler can surface a 202 with `retry_after`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Request body failed schema validation, or the operation is disabled
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Challenge signature did not verify against the agent's key
    #[error("Challenge signature verification failed")]
    InvalidSignature,

    /// Manifest proof did not verify
    #[error("Manifest signature verification failed: {0}")]
    InvalidManifestSignature(String),

    /// Challenge exists but its lifetime has elapsed
    #[error("Challenge has expired")]
    ExpiredChallenge,

    /// No challenge record for the presented value
    #[error("Challenge not found")]
    ChallengeNotFound,

    /// Challenge was already consumed by a successful verification
    #[error("Challenge has already been used")]
    ChallengeAlreadyUsed,

    /// DID in the request does not match the DID bound to the record
    #[error("DID mismatch: {0}")]
    DidMismatch(String),

    /// Manifest `valid_until` is in the past
    #[error("Manifest has expired")]
    ManifestExpired,

    /// Manifest sequence does not advance past the highest accepted one
    #[error("Manifest sequence rollback: submitted {submitted}, current {current}")]
    ManifestRollback {
        /// Sequence carried by the submitted manifest
        submitted: u64,
        /// Highest sequence accepted so far
        current: u64,
    },

    /// DID method is not `key` or `web`
    #[error("Unsupported DID method: {0}")]
    UnsupportedDidMethod(String),

    /// DID could not be resolved to an Ed25519 public key
    #[error("DID resolution failed: {0}")]
    DidResolutionFailed(String),

    /// Bearer token failed validation
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// DID has no ACL entry
    #[error("DID not registered")]
    DidNotFound {
        /// Whether self-registration is open (changes the hint, not the status)
        registration_open: bool,
    },

    /// ACL entry is rejected
    #[error("DID has been rejected")]
    DidRejected,

    /// ACL entry is banned
    #[error("DID has been banned")]
    DidBanned,

    /// Revocation endpoint reported the manifest revoked
    #[error("Manifest has been revoked")]
    ManifestRevoked {
        /// Reason reported by the revocation endpoint, if any
        reason: Option<String>,
    },

    /// ACL entry is awaiting operator approval
    #[error("DID registration is pending approval")]
    DidPending {
        /// Advisory seconds before the client should retry
        retry_after: u64,
    },

    /// Rate limit exceeded for this client and endpoint
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Advisory seconds before the client should retry
        retry_after: u64,
    },

    /// Internal failure; the message is generic by policy
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Wire error code for the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "AUTH_INVALID_REQUEST",
            AuthError::InvalidSignature => "AUTH_INVALID_SIGNATURE",
            AuthError::InvalidManifestSignature(_) => "AUTH_INVALID_MANIFEST_SIGNATURE",
            AuthError::ExpiredChallenge => "AUTH_EXPIRED_CHALLENGE",
            AuthError::ChallengeNotFound => "AUTH_CHALLENGE_NOT_FOUND",
            AuthError::ChallengeAlreadyUsed => "AUTH_CHALLENGE_ALREADY_USED",
            AuthError::DidMismatch(_) => "AUTH_DID_MISMATCH",
            AuthError::ManifestExpired => "AUTH_MANIFEST_EXPIRED",
            AuthError::ManifestRollback { .. } => "AUTH_MANIFEST_ROLLBACK",
            AuthError::UnsupportedDidMethod(_) => "AUTH_UNSUPPORTED_DID_METHOD",
            AuthError::DidResolutionFailed(_) => "AUTH_DID_RESOLUTION_FAILED",
            AuthError::InvalidToken(_) => "AUTH_INVALID_TOKEN",
            AuthError::DidNotFound { .. } => "AUTH_DID_NOT_FOUND",
            AuthError::DidRejected => "AUTH_DID_REJECTED",
            AuthError::DidBanned => "AUTH_DID_BANNED",
            AuthError::ManifestRevoked { .. } => "AUTH_MANIFEST_REVOKED",
            AuthError::DidPending { .. } => "AUTH_DID_PENDING",
            AuthError::RateLimited { .. } => "AUTH_RATE_LIMITED",
            AuthError::Internal(_) => "AUTH_INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidRequest(_) => 400,
            AuthError::InvalidSignature => 400,
            AuthError::InvalidManifestSignature(_) => 400,
            AuthError::ExpiredChallenge => 400,
            AuthError::ChallengeNotFound => 400,
            AuthError::ChallengeAlreadyUsed => 400,
            AuthError::DidMismatch(_) => 400,
            AuthError::ManifestExpired => 400,
            AuthError::ManifestRollback { .. } => 400,
            AuthError::UnsupportedDidMethod(_) => 400,
            AuthError::DidResolutionFailed(_) => 400,
            AuthError::InvalidToken(_) => 401,
            AuthError::DidNotFound { .. } => 403,
            AuthError::DidRejected => 403,
            AuthError::DidBanned => 403,
            AuthError::ManifestRevoked { .. } => 403,
            AuthError::DidPending { .. } => 202,
            AuthError::RateLimited { .. } => 429,
            AuthError::Internal(_) => 500,
        }
    }

    /// Build the wire error envelope: `{"error": {code, message, details?}}`
    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            AuthError::DidNotFound { registration_open: true } => Some(serde_json::json!({
                "hint": "unknown DID; submit a signed manifest via the register operation"
            })),
            AuthError::DidPending { retry_after } | AuthError::RateLimited { retry_after } => {
                Some(serde_json::json!({ "retry_after": retry_after }))
            }
            AuthError::ManifestRollback { submitted, current } => Some(serde_json::json!({
                "submitted_sequence": submitted,
                "current_sequence": current,
            })),
            AuthError::ManifestRevoked { reason: Some(reason) } => {
                Some(serde_json::json!({ "reason": reason }))
            }
            _ => None,
        };

        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

/// Wire envelope for non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The error payload
    pub error: ErrorDetail,
}

/// Inner error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code (`AUTH_*`)
    pub code: String,

    /// Human-readable message; never carries secret material
    pub message: String,

    /// Optional non-sensitive context (validation paths, retry_after)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Internal(format!("JSON error: {}", err))
    }
}
