//! Manifest revocation checking
//!
//! If a manifest declares a revocation endpoint, the checker polls it
//! for `{revoked, reason?}` under a tight budget and caches the verdict
//! per DID. The trade-off is explicit and deliberate: any I/O, timeout
//! or parse failure is treated as *not revoked* (fail open), choosing
//! availability over deny-by-default. Deployments wanting the opposite
//! wrap the checker.

use crate::cache::TtlCache;
use crate::fetch::{FetchBudget, HttpFetch};
use crate::manifest::RevocationPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-DID verdict cache TTL in seconds
pub const DEFAULT_REVOCATION_CACHE_TTL_SECS: u64 = 300;

/// Verdict returned by a revocation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationVerdict {
    /// Whether the manifest has been revoked
    pub revoked: bool,
    /// Optional operator-supplied reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RevocationVerdict {
    fn not_revoked() -> Self {
        Self {
            revoked: false,
            reason: None,
        }
    }
}

/// Fail-open revocation checker with per-DID caching
pub struct RevocationChecker {
    fetcher: Arc<dyn HttpFetch>,
    budget: FetchBudget,
    cache: TtlCache<String, RevocationVerdict>,
    cache_ttl: Duration,
}

impl RevocationChecker {
    /// Create a checker with the tight revocation budget (≤ 2 s,
    /// ≤ 10 KiB) and the default cache TTL.
    pub fn new(fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            fetcher,
            budget: FetchBudget::revocation(),
            cache: TtlCache::new(),
            cache_ttl: Duration::from_secs(DEFAULT_REVOCATION_CACHE_TTL_SECS),
        }
    }

    /// Override the verdict cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Check a DID's revocation status against its declared endpoint.
    ///
    /// Only a successfully fetched and parsed body is cached; fail-open
    /// verdicts are recomputed on the next call.
    pub async fn check(&self, did: &str, policy: &RevocationPolicy) -> RevocationVerdict {
        if let Some(cached) = self.cache.get(&did.to_string()) {
            return cached;
        }

        let body = match self.fetcher.get_json(&policy.endpoint, &self.budget).await {
            Ok(body) => body,
            Err(e) => {
                debug!(did, error = %e, "revocation fetch failed; failing open");
                return RevocationVerdict::not_revoked();
            }
        };

        match serde_json::from_value::<RevocationVerdict>(body) {
            Ok(verdict) => {
                self.cache
                    .insert(did.to_string(), verdict.clone(), self.cache_ttl);
                verdict
            }
            Err(e) => {
                debug!(did, error = %e, "revocation body malformed; failing open");
                RevocationVerdict::not_revoked()
            }
        }
    }

    /// Drop every cached verdict.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
