//! Challenge store
//!
//! Single-use challenge lifecycle: issued with a TTL, consumed exactly
//! once, reclaimed in the background after expiry. The store keeps
//! expired records readable through [`ChallengeStore::peek`] until the
//! reclaim sweep so the handler can tell an expired challenge apart from
//! one that never existed.

use crate::crypto::{sha256, sign};
use crate::error::{AuthError, Result};
use crate::multibase;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ed25519_compact::KeyPair;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tracing::debug;

/// How often the in-memory store sweeps expired records
pub const DEFAULT_RECLAIM_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// A single issued challenge
#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    /// 64 lowercase hex characters (32 random bytes)
    pub challenge: String,
    /// DID the challenge was issued to
    pub did: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
    /// The exact expiry string sent on the wire; the signing input is
    /// rebuilt from this byte-for-byte
    pub expires_at_raw: String,
    /// Whether a successful verification consumed this challenge
    pub used: bool,
}

/// Challenge persistence contract
///
/// Implementations must make `mark_used` atomic with respect to
/// concurrent reads (mutex or compare-and-swap) so a challenge is
/// consumed at most once.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Insert a fresh record. A key collision is an error; the handler
    /// prevents it by drawing 32 random bytes per challenge.
    async fn store(&self, record: ChallengeRecord) -> Result<()>;

    /// Fetch a record, returning `None` once it has expired (with the
    /// configured skew) even if it has not been reclaimed yet.
    async fn get(&self, challenge: &str) -> Result<Option<ChallengeRecord>>;

    /// Fetch a record regardless of expiry, as long as it has not been
    /// reclaimed. Lets the caller distinguish expired from unknown.
    async fn peek(&self, challenge: &str) -> Result<Option<ChallengeRecord>>;

    /// Mark a challenge consumed. Idempotent; unknown keys are a no-op.
    async fn mark_used(&self, challenge: &str) -> Result<()>;

    /// Remove expired records; returns how many were removed.
    async fn cleanup(&self) -> Result<usize>;

    /// Stop any background reclaim and release resources.
    fn dispose(&self);
}

/// In-memory reference implementation with periodic reclaim
pub struct InMemoryChallengeStore {
    records: Arc<Mutex<HashMap<String, ChallengeRecord>>>,
    clock_skew: Duration,
    reclaim: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl InMemoryChallengeStore {
    /// Create a store and start its reclaim task. Must be called from
    /// within a tokio runtime.
    pub fn new(clock_skew_secs: u64) -> Self {
        Self::with_reclaim_interval(clock_skew_secs, DEFAULT_RECLAIM_INTERVAL)
    }

    /// Create a store with a custom reclaim cadence.
    pub fn with_reclaim_interval(clock_skew_secs: u64, interval: StdDuration) -> Self {
        let records: Arc<Mutex<HashMap<String, ChallengeRecord>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let clock_skew = Duration::seconds(clock_skew_secs as i64);

        let sweep_records = Arc::clone(&records);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = sweep(&sweep_records, clock_skew);
                if removed > 0 {
                    debug!(removed, "reclaimed expired challenges");
                }
            }
        });

        Self {
            records,
            clock_skew,
            reclaim: Mutex::new(Some(handle)),
        }
    }

    fn expired(&self, record: &ChallengeRecord) -> bool {
        record.expires_at + self.clock_skew < Utc::now()
    }
}

fn sweep(records: &Mutex<HashMap<String, ChallengeRecord>>, clock_skew: Duration) -> usize {
    let now = Utc::now();
    let mut records = records.lock().expect("challenge lock poisoned");
    let before = records.len();
    records.retain(|_, record| record.expires_at + clock_skew >= now);
    before - records.len()
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn store(&self, record: ChallengeRecord) -> Result<()> {
        let mut records = self.records.lock().expect("challenge lock poisoned");
        if records.contains_key(&record.challenge) {
            return Err(AuthError::Internal("challenge collision".to_string()));
        }
        records.insert(record.challenge.clone(), record);
        Ok(())
    }

    async fn get(&self, challenge: &str) -> Result<Option<ChallengeRecord>> {
        let records = self.records.lock().expect("challenge lock poisoned");
        Ok(records
            .get(challenge)
            .filter(|record| !self.expired(record))
            .cloned())
    }

    async fn peek(&self, challenge: &str) -> Result<Option<ChallengeRecord>> {
        let records = self.records.lock().expect("challenge lock poisoned");
        Ok(records.get(challenge).cloned())
    }

    async fn mark_used(&self, challenge: &str) -> Result<()> {
        let mut records = self.records.lock().expect("challenge lock poisoned");
        if let Some(record) = records.get_mut(challenge) {
            record.used = true;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize> {
        Ok(sweep(&self.records, self.clock_skew))
    }

    fn dispose(&self) {
        if let Some(handle) = self.reclaim.lock().expect("challenge lock poisoned").take() {
            handle.abort();
        }
        self.records.lock().expect("challenge lock poisoned").clear();
    }
}

impl Drop for InMemoryChallengeStore {
    fn drop(&mut self) {
        if let Some(handle) = self.reclaim.lock().expect("challenge lock poisoned").take() {
            handle.abort();
        }
    }
}

/// SHA-256 over the exact challenge proof string:
/// `challenge + "." + did + "." + expires_at`.
///
/// `expires_at` must be the exact string returned by the challenge
/// operation; neither side may normalize it.
pub fn challenge_signing_input(challenge: &str, did: &str, expires_at: &str) -> [u8; 32] {
    sha256(format!("{}.{}.{}", challenge, did, expires_at).as_bytes())
}

/// Client-side half of the wire contract: sign a challenge and encode
/// the signature as multibase base58btc.
pub fn sign_challenge(challenge: &str, did: &str, expires_at: &str, keypair: &KeyPair) -> String {
    let digest = challenge_signing_input(challenge, did, expires_at);
    multibase::encode(&sign(&digest, keypair))
}
