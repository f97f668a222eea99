//! Common test utilities shared across integration tests
#![allow(dead_code)]

use amp_auth::challenge::sign_challenge;
use amp_auth::fetch::{FetchBudget, FetchError, HttpFetch};
use amp_auth::manifest::{
    format_rfc3339, sign_manifest, AgentManifest, InterfaceDecl, InterfaceProtocol,
    ManifestCapabilities, ManifestMetadata,
};
use amp_auth::{
    AclEntry, AclStore, AgentStatus, AuthConfig, AuthHandler, InMemoryAclStore,
    InMemoryChallengeStore, TokenSigner,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ed25519_compact::KeyPair;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Scripted in-memory fetcher: serves canned JSON bodies per URL,
/// 404s everything else.
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, serde_json::Value>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
        }
    }

    pub fn serve(&self, url: &str, body: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
    }

    pub fn forget(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetcher {
    async fn get_json(
        &self,
        url: &str,
        _budget: &FetchBudget,
    ) -> std::result::Result<serde_json::Value, FetchError> {
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

/// A test agent: an Ed25519 keypair bound to a DID
pub struct TestAgent {
    pub keypair: KeyPair,
    pub did: String,
}

impl TestAgent {
    /// Agent with a did:key identity (offline resolvable).
    pub fn new_key() -> Self {
        let keypair = amp_auth::crypto::generate_keypair();
        let did = amp_auth::did::public_key_to_did_key(&public_key_array(&keypair));
        Self { keypair, did }
    }

    /// Agent with a did:web identity on the given host.
    pub fn new_web(host: &str) -> Self {
        let keypair = amp_auth::crypto::generate_keypair();
        Self {
            keypair,
            did: format!("did:web:{}", host),
        }
    }

    /// The agent's public key as a DID Document `publicKeyMultibase`
    /// value.
    pub fn public_key_multibase(&self) -> String {
        amp_auth::did::public_key_to_did_key(&public_key_array(&self.keypair))
            .strip_prefix("did:key:")
            .unwrap()
            .to_string()
    }

    /// The DID Document this agent would serve at `.well-known/did.json`.
    pub fn did_document(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.did,
            "verificationMethod": [{
                "id": format!("{}#key-1", self.did),
                "type": "Ed25519VerificationKey2020",
                "controller": self.did,
                "publicKeyMultibase": self.public_key_multibase(),
            }],
            "assertionMethod": [format!("{}#key-1", self.did)],
        })
    }

    /// A signed manifest with the given sequence, valid for 30 days.
    pub fn manifest(&self, sequence: u64) -> AgentManifest {
        self.manifest_named(sequence, "test-agent")
    }

    /// A signed manifest with a chosen display name.
    pub fn manifest_named(&self, sequence: u64, name: &str) -> AgentManifest {
        let now = Utc::now();
        let mut manifest = AgentManifest {
            version: "1.0.0".to_string(),
            id: self.did.clone(),
            sequence,
            created_at: format_rfc3339(now),
            updated_at: format_rfc3339(now),
            valid_until: format_rfc3339(now + Duration::days(30)),
            revocation: None,
            metadata: ManifestMetadata {
                name: name.to_string(),
                description: "Integration test agent".to_string(),
                agent_version: "0.1.0".to_string(),
                tags: None,
                homepage: None,
                logo: None,
                operator: None,
            },
            capabilities: ManifestCapabilities {
                interfaces: vec![InterfaceDecl {
                    protocol: InterfaceProtocol::Https,
                    url: "https://api.example.com".to_string(),
                    api_standard: None,
                    methods: None,
                    schema_ref: None,
                }],
                categories: None,
                permissions_required: None,
            },
            proof: None,
        };
        sign_manifest(&mut manifest, &self.keypair, None).unwrap();
        manifest
    }

    /// Client half of the challenge proof.
    pub fn sign_challenge(&self, challenge: &str, expires_at: &str) -> String {
        sign_challenge(challenge, &self.did, expires_at, &self.keypair)
    }
}

fn public_key_array(keypair: &KeyPair) -> [u8; 32] {
    let mut pk = [0u8; 32];
    pk.copy_from_slice(keypair.pk.as_ref());
    pk
}

/// A fully wired handler plus handles to its collaborators
pub struct TestHarness {
    pub handler: AuthHandler,
    pub challenges: Arc<InMemoryChallengeStore>,
    pub acl: Arc<InMemoryAclStore>,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl TestHarness {
    /// Harness with default config (registration closed).
    pub fn new() -> Self {
        Self::with_config(AuthConfig::new("https://auth.example.com"))
    }

    /// Harness with a caller-tweaked config.
    pub fn with_config(config: AuthConfig) -> Self {
        let skew = config.clock_skew.as_secs();
        let challenges = Arc::new(InMemoryChallengeStore::new(skew));
        let acl = Arc::new(InMemoryAclStore::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let signer = TokenSigner::hs256(config.issuer.clone(), b"integration-secret", 3600, skew);

        let handler = AuthHandler::new(
            config,
            signer,
            challenges.clone(),
            acl.clone(),
            fetcher.clone(),
        );

        Self {
            handler,
            challenges,
            acl,
            fetcher,
        }
    }

    /// Insert an approved ACL entry for the agent.
    pub async fn approve(&self, agent: &TestAgent) {
        self.set_status(agent, AgentStatus::Approved).await;
    }

    /// Insert an entry with an arbitrary status.
    pub async fn set_status(&self, agent: &TestAgent, status: AgentStatus) {
        let now = Utc::now();
        self.acl
            .set(AclEntry {
                did: agent.did.clone(),
                status,
                manifest_sequence: 0,
                registered_at: now,
                updated_at: now,
                reason: None,
                metadata: None,
            })
            .await
            .unwrap();
    }

    /// Serve the agent's DID Document for did:web resolution.
    pub fn serve_did_document(&self, agent: &TestAgent) {
        let host = agent.did.strip_prefix("did:web:").unwrap();
        self.fetcher.serve(
            &format!("https://{}/.well-known/did.json", host),
            agent.did_document(),
        );
    }
}
