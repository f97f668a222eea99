//! Auth handler
//!
//! Orchestrates the three wire operations (`challenge`, `verify`,
//! `register`) over injected stores, resolvers and signers. The
//! handler owns no process-wide state: everything it touches is passed
//! in at construction, so hosts can swap any collaborator (durable
//! stores, HSM-backed signers, deny-by-default revocation wrappers)
//! without touching this code.

use crate::acl::{AclEntry, AclMetadata, AclStore, AgentStatus};
use crate::cache::TtlCache;
use crate::challenge::{challenge_signing_input, ChallengeRecord, ChallengeStore};
use crate::config::AuthConfig;
use crate::crypto::{self, random_hex, SIGNATURE_LENGTH};
use crate::error::{AuthError, Result};
use crate::fetch::HttpFetch;
use crate::manifest::{format_rfc3339, AgentManifest};
use crate::multibase;
use crate::rate_limit::SlidingWindowLimiter;
use crate::resolver::{did_web_host, DidResolver};
use crate::revocation::RevocationChecker;
use crate::token::{parse_bearer, TokenClaims, TokenSigner};
use crate::verify::ManifestVerifier;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

/// Scope assignment for verified agents
#[derive(Clone)]
pub enum ScopePolicy {
    /// Same scope string for every agent
    Static(String),
    /// Computed per `(did, manifest)`
    Dynamic(Arc<dyn Fn(&str, &AgentManifest) -> String + Send + Sync>),
}

impl ScopePolicy {
    fn scope_for(&self, did: &str, manifest: &AgentManifest) -> String {
        match self {
            ScopePolicy::Static(scope) => scope.clone(),
            ScopePolicy::Dynamic(f) => f(did, manifest),
        }
    }
}

impl Default for ScopePolicy {
    fn default() -> Self {
        ScopePolicy::Static("agent".to_string())
    }
}

/// Observer invoked after a successful registration insert
pub type RegistrationObserver = Arc<dyn Fn(&AclEntry) + Send + Sync>;

/// Body of `POST <prefix>/challenge`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ChallengeRequest {
    /// The agent's DID
    #[validate(custom(function = "crate::manifest::validate_did"))]
    pub did: String,
}

/// Successful challenge response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// 64 lowercase hex characters
    pub challenge: String,
    /// RFC 3339 expiry; clients sign this exact string
    pub expires_at: String,
}

/// Body of `POST <prefix>/verify`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VerifyRequest {
    /// The agent's DID
    #[validate(custom(function = "crate::manifest::validate_did"))]
    pub did: String,

    /// The challenge previously issued to this DID
    #[validate(custom(function = "validate_challenge_hex"))]
    pub challenge: String,

    /// Multibase signature over the challenge proof string
    #[validate(custom(function = "crate::manifest::validate_multibase"))]
    pub signature: String,

    /// The agent's signed manifest
    #[validate(nested)]
    pub manifest: AgentManifest,
}

/// Successful verify response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    /// RFC 3339 token expiry
    pub expires_at: String,
    /// Summary of the authenticated agent
    pub agent: AgentSummary,
}

/// Agent summary returned with a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    /// The agent's DID
    pub did: String,
    /// Display name from the verified manifest
    pub name: String,
    /// Granted scope, split on spaces
    pub capabilities: Vec<String>,
}

/// Body of `POST <prefix>/register`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    /// The agent's signed manifest
    #[validate(nested)]
    pub manifest: AgentManifest,

    /// Optional note for the approving operator
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1024))]
    pub reason: Option<String>,
}

/// Successful register response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The registered DID
    pub did: String,
    /// Current ACL status
    pub status: AgentStatus,
    /// Human-readable status explanation
    pub message: String,
    /// Advisory seconds before polling again, when pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// The AMP authentication handler
pub struct AuthHandler {
    config: AuthConfig,
    signer: TokenSigner,
    challenges: Arc<dyn ChallengeStore>,
    acl: Arc<dyn AclStore>,
    fetcher: Arc<dyn HttpFetch>,
    resolver: Arc<DidResolver>,
    verifier: ManifestVerifier,
    manifest_cache: TtlCache<String, AgentManifest>,
    rate_limiter: Option<SlidingWindowLimiter>,
    revocation: Option<RevocationChecker>,
    on_registration: Option<RegistrationObserver>,
    scope: ScopePolicy,
}

impl AuthHandler {
    /// Wire up a handler from its injected collaborators.
    pub fn new(
        config: AuthConfig,
        signer: TokenSigner,
        challenges: Arc<dyn ChallengeStore>,
        acl: Arc<dyn AclStore>,
        fetcher: Arc<dyn HttpFetch>,
    ) -> Self {
        let resolver = Arc::new(DidResolver::new(
            Arc::clone(&fetcher),
            config.fetch_budget.clone(),
        ));
        let verifier = ManifestVerifier::new(Arc::clone(&resolver), config.clock_skew.as_secs());

        Self {
            config,
            signer,
            challenges,
            acl,
            fetcher,
            resolver,
            verifier,
            manifest_cache: TtlCache::new(),
            rate_limiter: None,
            revocation: None,
            on_registration: None,
            scope: ScopePolicy::default(),
        }
    }

    /// Enable rate limiting. Without a limiter every request passes.
    pub fn with_rate_limiter(mut self, limiter: SlidingWindowLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Enable revocation checking for manifests that declare an endpoint.
    pub fn with_revocation_checker(mut self, checker: RevocationChecker) -> Self {
        self.revocation = Some(checker);
        self
    }

    /// Set how token scopes are computed.
    pub fn with_scope_policy(mut self, scope: ScopePolicy) -> Self {
        self.scope = scope;
        self
    }

    /// Observe successful registrations (notifications, audit, webhooks).
    pub fn with_registration_observer(
        mut self,
        observer: impl Fn(&AclEntry) + Send + Sync + 'static,
    ) -> Self {
        self.on_registration = Some(Arc::new(observer));
        self
    }

    /// The configuration this handler runs with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The ACL store, for operator tooling (approve, reject, ban).
    pub fn acl(&self) -> &Arc<dyn AclStore> {
        &self.acl
    }

    /// The manifest most recently verified for a DID, if still cached.
    pub fn cached_manifest(&self, did: &str) -> Option<AgentManifest> {
        self.manifest_cache.get(&did.to_string())
    }

    /// Release background timers and clear in-memory state.
    pub fn dispose(&self) {
        self.challenges.dispose();
        if let Some(limiter) = &self.rate_limiter {
            limiter.dispose();
        }
        if let Some(checker) = &self.revocation {
            checker.clear_cache();
        }
        self.manifest_cache.clear();
    }

    /// Operation: issue a challenge for an approved DID.
    pub async fn challenge(
        &self,
        request: &ChallengeRequest,
        client_id: Option<&str>,
    ) -> Result<ChallengeResponse> {
        self.check_rate_limit("challenge", client_id)?;
        request
            .validate()
            .map_err(|e| AuthError::InvalidRequest(format!("challenge request: {}", e)))?;
        self.record_rate_limit("challenge", client_id);

        match self.acl.get(&request.did).await?.map(|entry| entry.status) {
            None => {
                return Err(AuthError::DidNotFound {
                    registration_open: self.config.enable_registration,
                })
            }
            Some(AgentStatus::PendingApproval) => {
                return Err(AuthError::DidPending {
                    retry_after: self.config.pending_retry_after_secs,
                })
            }
            Some(AgentStatus::Rejected) => return Err(AuthError::DidRejected),
            Some(AgentStatus::Banned) => return Err(AuthError::DidBanned),
            Some(AgentStatus::Approved) => {}
        }

        let challenge = random_hex(32);
        let expires_at =
            Utc::now() + Duration::seconds(self.config.challenge_lifetime.as_secs() as i64);
        let expires_at_raw = format_rfc3339(expires_at);

        self.challenges
            .store(ChallengeRecord {
                challenge: challenge.clone(),
                did: request.did.clone(),
                expires_at,
                expires_at_raw: expires_at_raw.clone(),
                used: false,
            })
            .await?;

        info!(did = %request.did, "challenge issued");
        Ok(ChallengeResponse {
            challenge,
            expires_at: expires_at_raw,
        })
    }

    /// Operation: verify a signed challenge and manifest, mint a token.
    ///
    /// The challenge record moves `Issued → Consumed` only after every
    /// check passes; a failed attempt leaves it available.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
        client_id: Option<&str>,
    ) -> Result<VerifyResponse> {
        self.check_rate_limit("verify", client_id)?;
        request
            .validate()
            .map_err(|e| AuthError::InvalidRequest(format!("verify request: {}", e)))?;
        self.record_rate_limit("verify", client_id);

        let manifest = self.select_manifest(request).await?;

        let record = self
            .challenges
            .peek(&request.challenge)
            .await?
            .ok_or(AuthError::ChallengeNotFound)?;
        if record.used {
            return Err(AuthError::ChallengeAlreadyUsed);
        }
        if record.did != request.did {
            return Err(AuthError::DidMismatch(
                "challenge was issued to a different DID".to_string(),
            ));
        }
        let skew = Duration::seconds(self.config.clock_skew.as_secs() as i64);
        if record.expires_at + skew < Utc::now() {
            return Err(AuthError::ExpiredChallenge);
        }

        let public_key = self.resolver.resolve(&request.did, None).await?;
        let digest =
            challenge_signing_input(&record.challenge, &record.did, &record.expires_at_raw);
        let signature =
            multibase::decode(&request.signature).map_err(|_| AuthError::InvalidSignature)?;
        if signature.len() != SIGNATURE_LENGTH {
            return Err(AuthError::InvalidSignature);
        }
        if !crypto::verify(&signature, &digest, &public_key)? {
            debug!(did = %request.did, "challenge signature rejected");
            return Err(AuthError::InvalidSignature);
        }

        self.verifier.verify(&manifest).await?;

        if let (Some(checker), Some(policy)) = (&self.revocation, &manifest.revocation) {
            let verdict = checker.check(&manifest.id, policy).await;
            if verdict.revoked {
                warn!(did = %manifest.id, "manifest revoked by issuer endpoint");
                return Err(AuthError::ManifestRevoked {
                    reason: verdict.reason,
                });
            }
        }

        if manifest.id != request.did {
            return Err(AuthError::DidMismatch(
                "manifest id does not match the authenticating DID".to_string(),
            ));
        }

        let current = self.acl.get_max_sequence(&request.did).await?;
        if manifest.sequence <= current {
            return Err(AuthError::ManifestRollback {
                submitted: manifest.sequence,
                current,
            });
        }
        self.acl
            .update_sequence(&request.did, manifest.sequence)
            .await?;
        self.manifest_cache.insert(
            request.did.clone(),
            manifest.clone(),
            self.signer.lifetime(),
        );

        // Only now, with every check passed, is the challenge consumed.
        self.challenges.mark_used(&request.challenge).await?;

        let scope = self.scope.scope_for(&request.did, &manifest);
        let (token, claims) = self.signer.issue(
            &request.did,
            &scope,
            &manifest.metadata.name,
            &manifest.metadata.agent_version,
            manifest.sequence,
        )?;

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("token expiry out of range".to_string()))?;

        info!(did = %request.did, sequence = manifest.sequence, "agent verified");
        Ok(VerifyResponse {
            token,
            expires_at: format_rfc3339(expires_at),
            agent: AgentSummary {
                did: request.did.clone(),
                name: manifest.metadata.name.clone(),
                capabilities: scope.split_whitespace().map(str::to_string).collect(),
            },
        })
    }

    /// Operation: self-register a DID into `pending_approval`.
    pub async fn register(
        &self,
        request: &RegisterRequest,
        client_id: Option<&str>,
    ) -> Result<RegisterResponse> {
        if !self.config.enable_registration {
            return Err(AuthError::InvalidRequest(
                "registration is disabled".to_string(),
            ));
        }

        self.check_rate_limit("register", client_id)?;
        request
            .validate()
            .map_err(|e| AuthError::InvalidRequest(format!("register request: {}", e)))?;
        self.record_rate_limit("register", client_id);

        // Signature only; registration never consults the ACL for authorization.
        self.verifier.verify(&request.manifest).await?;

        let did = request.manifest.id.clone();
        if let Some(existing) = self.acl.get(&did).await? {
            // Idempotent: report the current status, mutate nothing.
            return Ok(RegisterResponse {
                did,
                status: existing.status,
                message: status_message(existing.status).to_string(),
                retry_after: match existing.status {
                    AgentStatus::PendingApproval => Some(self.config.pending_retry_after_secs),
                    _ => None,
                },
            });
        }

        let now = Utc::now();
        let entry = AclEntry {
            did: did.clone(),
            status: AgentStatus::PendingApproval,
            manifest_sequence: request.manifest.sequence,
            registered_at: now,
            updated_at: now,
            reason: request.reason.clone(),
            metadata: Some(AclMetadata {
                name: request.manifest.metadata.name.clone(),
                description: request.manifest.metadata.description.clone(),
                agent_version: request.manifest.metadata.agent_version.clone(),
            }),
        };
        self.acl.set(entry.clone()).await?;

        if let Some(observer) = &self.on_registration {
            observer(&entry);
        }

        info!(did = %did, "agent registered, pending approval");
        Ok(RegisterResponse {
            did,
            status: AgentStatus::PendingApproval,
            message: status_message(AgentStatus::PendingApproval).to_string(),
            retry_after: Some(self.config.pending_retry_after_secs),
        })
    }

    /// Bearer guard: validate an `Authorization` header value and expose
    /// the token claims to downstream handlers.
    pub fn verify_bearer(&self, authorization: &str) -> Result<TokenClaims> {
        let token = parse_bearer(authorization)
            .ok_or_else(|| AuthError::InvalidToken("missing bearer token".to_string()))?;
        self.signer.validate(token)
    }

    /// Remote-manifest preference: for did:web subjects, a manifest
    /// served at `/.well-known/agent-manifest.json` that verifies wins
    /// over the request body. Fetch failures always fall back silently;
    /// verification failures fall back unless `strict_remote_manifest`.
    async fn select_manifest(&self, request: &VerifyRequest) -> Result<AgentManifest> {
        if !self.config.fetch_remote_manifest {
            return Ok(request.manifest.clone());
        }
        let identifier = match request.did.strip_prefix("did:web:") {
            Some(identifier) => identifier,
            None => return Ok(request.manifest.clone()),
        };
        let host = match did_web_host(identifier) {
            Ok(host) => host,
            Err(_) => return Ok(request.manifest.clone()),
        };

        let url = format!("https://{}/.well-known/agent-manifest.json", host);
        let body = match self.fetcher.get_json(&url, &self.config.fetch_budget).await {
            Ok(body) => body,
            Err(e) => {
                debug!(did = %request.did, error = %e, "remote manifest fetch failed");
                return Ok(request.manifest.clone());
            }
        };

        let remote: AgentManifest = match serde_json::from_value(body) {
            Ok(manifest) => manifest,
            Err(e) => {
                if self.config.strict_remote_manifest {
                    return Err(AuthError::InvalidRequest(
                        "remote manifest is malformed".to_string(),
                    ));
                }
                debug!(did = %request.did, error = %e, "remote manifest malformed");
                return Ok(request.manifest.clone());
            }
        };

        match self.verifier.verify(&remote).await {
            Ok(()) => {
                debug!(did = %request.did, "remote manifest preferred over request body");
                Ok(remote)
            }
            Err(e) if self.config.strict_remote_manifest => Err(e),
            Err(e) => {
                debug!(did = %request.did, error = %e, "remote manifest failed verification");
                Ok(request.manifest.clone())
            }
        }
    }

    fn check_rate_limit(&self, endpoint: &str, client_id: Option<&str>) -> Result<()> {
        if let (Some(limiter), Some(client)) = (&self.rate_limiter, client_id) {
            if !limiter.check(endpoint, client) {
                return Err(AuthError::RateLimited {
                    retry_after: self.config.rate_limit_retry_after_secs,
                });
            }
        }
        Ok(())
    }

    fn record_rate_limit(&self, endpoint: &str, client_id: Option<&str>) {
        if let (Some(limiter), Some(client)) = (&self.rate_limiter, client_id) {
            limiter.record(endpoint, client);
        }
    }
}

fn status_message(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::PendingApproval => "registration received; awaiting operator approval",
        AgentStatus::Approved => "agent is approved",
        AgentStatus::Rejected => "registration was rejected",
        AgentStatus::Banned => "agent is banned",
    }
}

fn validate_challenge_hex(value: &str) -> std::result::Result<(), validator::ValidationError> {
    if value.len() != 64
        || !value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(validator::ValidationError::new("challenge_hex"));
    }
    Ok(())
}
