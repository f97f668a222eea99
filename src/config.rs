//! Handler configuration
//!
//! Flat, owner-provided settings. The host is responsible for
//! provisioning (env, files, secret stores); this crate only clamps the
//! tunables into their allowed ranges.

use crate::fetch::FetchBudget;
use std::time::Duration;

/// Default challenge lifetime in seconds
pub const DEFAULT_CHALLENGE_LIFETIME_SECS: u64 = 300;

/// Allowed challenge lifetime range in seconds
pub const CHALLENGE_LIFETIME_RANGE_SECS: (u64, u64) = (30, 600);

/// Default clock skew allowance in seconds (past direction only)
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

/// Advisory retry interval for pending registrations
pub const DEFAULT_PENDING_RETRY_AFTER_SECS: u64 = 3_600;

/// Advisory retry interval after a rate-limit rejection
pub const DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

/// Configuration for [`crate::handler::AuthHandler`]
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token issuer; must match the signer's issuer
    pub issuer: String,

    /// Route prefix the host mounts the three operations under
    pub route_prefix: String,

    /// How long an issued challenge stays valid
    pub challenge_lifetime: Duration,

    /// Skew allowance applied to temporal checks, past direction only
    pub clock_skew: Duration,

    /// Whether the `register` operation is available
    pub enable_registration: bool,

    /// Whether did:web subjects get the remote-manifest preference
    pub fetch_remote_manifest: bool,

    /// Hard-fail instead of falling back when a fetched remote manifest
    /// does not verify
    pub strict_remote_manifest: bool,

    /// Budget for did:web and remote-manifest fetches
    pub fetch_budget: FetchBudget,

    /// Advisory retry interval returned with `DidPending`
    pub pending_retry_after_secs: u64,

    /// Advisory retry interval returned with `RateLimited`
    pub rate_limit_retry_after_secs: u64,
}

impl AuthConfig {
    /// Config with defaults for everything but the issuer.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            route_prefix: "/auth".to_string(),
            challenge_lifetime: Duration::from_secs(DEFAULT_CHALLENGE_LIFETIME_SECS),
            clock_skew: Duration::from_secs(DEFAULT_CLOCK_SKEW_SECS),
            enable_registration: false,
            fetch_remote_manifest: true,
            strict_remote_manifest: false,
            fetch_budget: FetchBudget::default(),
            pending_retry_after_secs: DEFAULT_PENDING_RETRY_AFTER_SECS,
            rate_limit_retry_after_secs: DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS,
        }
    }

    /// Set the challenge lifetime, clamped to 30..=600 seconds.
    pub fn with_challenge_lifetime_secs(mut self, secs: u64) -> Self {
        let (min, max) = CHALLENGE_LIFETIME_RANGE_SECS;
        self.challenge_lifetime = Duration::from_secs(secs.clamp(min, max));
        self
    }

    /// Allow agents to self-register into `pending_approval`.
    pub fn with_registration_enabled(mut self, enabled: bool) -> Self {
        self.enable_registration = enabled;
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new("amp-auth")
    }
}
