//! Access control and sequence tracking
//!
//! One entry per DID carrying its approval status, plus a monotonic
//! record of the highest manifest sequence ever accepted. Authorization
//! decisions look only at the status; the sequence map is what makes
//! manifest rollback detectable.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Approval status of a registered DID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Awaiting operator approval
    PendingApproval,
    /// Allowed to authenticate
    Approved,
    /// Denied by an operator
    Rejected,
    /// Blocked outright
    Banned,
}

impl AgentStatus {
    /// Wire string for response bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::PendingApproval => "pending_approval",
            AgentStatus::Approved => "approved",
            AgentStatus::Rejected => "rejected",
            AgentStatus::Banned => "banned",
        }
    }
}

/// ACL entry for a single DID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    /// The agent's DID
    pub did: String,
    /// Approval status
    pub status: AgentStatus,
    /// Manifest sequence captured at registration time
    pub manifest_sequence: u64,
    /// When the entry was created
    pub registered_at: DateTime<Utc>,
    /// When the entry last changed
    pub updated_at: DateTime<Utc>,
    /// Free-text reason supplied at registration or by an operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Metadata captured from the registering manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AclMetadata>,
}

/// Manifest metadata snapshot kept with the ACL entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclMetadata {
    /// Agent display name
    pub name: String,
    /// Agent description
    pub description: String,
    /// Agent software version
    pub agent_version: String,
}

/// ACL and sequence persistence contract
#[async_trait]
pub trait AclStore: Send + Sync {
    /// Fetch the entry for a DID.
    async fn get(&self, did: &str) -> Result<Option<AclEntry>>;

    /// Insert or replace an entry.
    async fn set(&self, entry: AclEntry) -> Result<()>;

    /// List entries, optionally filtered by status.
    async fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AclEntry>>;

    /// Remove an entry; returns whether one existed. Sequence history is
    /// kept so a re-registered DID cannot roll back.
    async fn delete(&self, did: &str) -> Result<bool>;

    /// Highest accepted manifest sequence for a DID, 0 if unknown.
    async fn get_max_sequence(&self, did: &str) -> Result<u64>;

    /// Raise the stored sequence. Monotonic: a lower value is a no-op,
    /// and concurrent raises settle on the maximum.
    async fn update_sequence(&self, did: &str, sequence: u64) -> Result<()>;
}

/// In-memory reference implementation
#[derive(Default)]
pub struct InMemoryAclStore {
    entries: Mutex<HashMap<String, AclEntry>>,
    sequences: Mutex<HashMap<String, u64>>,
}

impl InMemoryAclStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AclStore for InMemoryAclStore {
    async fn get(&self, did: &str) -> Result<Option<AclEntry>> {
        Ok(self.entries.lock().expect("acl lock poisoned").get(did).cloned())
    }

    async fn set(&self, entry: AclEntry) -> Result<()> {
        self.entries
            .lock()
            .expect("acl lock poisoned")
            .insert(entry.did.clone(), entry);
        Ok(())
    }

    async fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AclEntry>> {
        let entries = self.entries.lock().expect("acl lock poisoned");
        Ok(entries
            .values()
            .filter(|entry| status.map_or(true, |s| entry.status == s))
            .cloned()
            .collect())
    }

    async fn delete(&self, did: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .expect("acl lock poisoned")
            .remove(did)
            .is_some())
    }

    async fn get_max_sequence(&self, did: &str) -> Result<u64> {
        Ok(*self
            .sequences
            .lock()
            .expect("acl lock poisoned")
            .get(did)
            .unwrap_or(&0))
    }

    async fn update_sequence(&self, did: &str, sequence: u64) -> Result<()> {
        let mut sequences = self.sequences.lock().expect("acl lock poisoned");
        let current = sequences.entry(did.to_string()).or_insert(0);
        if sequence > *current {
            *current = sequence;
        }
        Ok(())
    }
}
