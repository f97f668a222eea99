//! # amp-auth: Agent Manifest Protocol (AMP) Implementation
//!
//! This crate implements the AMP v1 server-side authentication engine:
//! DID-bound challenge-response auth for autonomous agents, with signed
//! manifests instead of shared API keys.
//!
//! ## Features
//!
//! - **Challenge-Response**: 256-bit single-use challenges with TTL
//! - **Signed Manifests**: self-describing agent documents, verified via
//!   RFC 8785 canonicalization + Ed25519
//! - **DID Resolution**: `did:key` (offline) and `did:web` (budgeted HTTPS)
//! - **Access Control**: per-DID status with manifest rollback protection
//! - **Bearer Tokens**: self-contained JWTs (HS256 or EdDSA)
//! - **Auxiliaries**: sliding-window rate limiting, fail-open revocation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           AGENT (key holder)                            │
//! │  Holds an Ed25519 key bound to its DID                  │
//! └─────────────────────────────────────────────────────────┘
//!                       ↓ POST /auth/challenge
//!         ┌─────────────────────────────┐
//!         │   AUTH HANDLER              │
//!         │   ACL gate → fresh nonce    │
//!         └─────────────────────────────┘
//!                       ↓ POST /auth/verify
//!         ┌─────────────────────────────┐
//!         │   VERIFICATION PIPELINE     │
//!         │   challenge sig → manifest  │
//!         │   (JCS ∖ proof → SHA-256 →  │
//!         │    Ed25519) → sequence      │
//!         └─────────────────────────────┘
//!                       ↓
//!         ┌─────────────────────────────┐
//!         │   TOKEN ISSUER              │
//!         │   JWT: sub = DID, scope     │
//!         └─────────────────────────────┘
//!                       ↓ Authorization: Bearer
//!         ┌─────────────────────────────┐
//!         │   PROTECTED RESOURCES       │
//!         └─────────────────────────────┘
//! ```
//!
//! The handler owns no process-wide state: stores, fetcher, signer,
//! rate limiter and revocation checker are all injected at construction.

#![warn(missing_docs)]

pub mod acl;
pub mod cache;
pub mod canonical;
pub mod challenge;
pub mod config;
pub mod crypto;
pub mod did;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod manifest;
pub mod multibase;
pub mod rate_limit;
pub mod resolver;
pub mod revocation;
pub mod token;
pub mod verify;

// Re-exports for convenience
pub use acl::{AclEntry, AclMetadata, AclStore, AgentStatus, InMemoryAclStore};
pub use challenge::{
    challenge_signing_input, sign_challenge, ChallengeRecord, ChallengeStore,
    InMemoryChallengeStore,
};
pub use config::AuthConfig;
pub use error::{AuthError, ErrorBody, Result};
pub use fetch::{BudgetedFetcher, FetchBudget, HttpFetch};
pub use handler::{
    AuthHandler, ChallengeRequest, ChallengeResponse, RegisterRequest, RegisterResponse,
    ScopePolicy, VerifyRequest, VerifyResponse,
};
pub use manifest::{sign_manifest, AgentManifest};
pub use rate_limit::{RateLimitConfig, SlidingWindowLimiter};
pub use resolver::DidResolver;
pub use revocation::RevocationChecker;
pub use token::{TokenClaims, TokenSigner};
pub use verify::ManifestVerifier;

/// AMP protocol version
pub const AMP_VERSION: &str = "AMP/1.0";

/// Length in bytes of a challenge nonce
pub const CHALLENGE_BYTES: usize = 32;
