//! End-to-end tests for the challenge → verify → token flow

mod common;

use amp_auth::{
    AclStore, AgentStatus, AuthConfig, AuthError, ChallengeRequest, ChallengeStore, VerifyRequest,
};
use common::{setup_test_logging, TestAgent, TestHarness};
use std::time::Duration;

async fn run_verify(
    harness: &TestHarness,
    agent: &TestAgent,
    sequence: u64,
) -> amp_auth::Result<amp_auth::VerifyResponse> {
    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await?;

    harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: agent.sign_challenge(&challenge.challenge, &challenge.expires_at),
                manifest: agent.manifest(sequence),
            },
            None,
        )
        .await
}

#[tokio::test]
async fn test_full_happy_path() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();
    assert_eq!(challenge.challenge.len(), 64);
    assert!(challenge
        .challenge
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let response = harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: agent.sign_challenge(&challenge.challenge, &challenge.expires_at),
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.agent.did, agent.did);
    assert_eq!(response.agent.name, "test-agent");
    assert_eq!(response.agent.capabilities, vec!["agent".to_string()]);

    // The issued token round-trips through the bearer guard.
    let claims = harness
        .handler
        .verify_bearer(&format!("Bearer {}", response.token))
        .unwrap();
    assert_eq!(claims.sub, agent.did);
    assert_eq!(claims.exp - claims.iat, 3600);
    assert_eq!(claims.manifest_sequence, 1);
    assert_eq!(claims.jti.len(), 32);

    // The verified manifest is cached under the DID.
    assert!(harness.handler.cached_manifest(&agent.did).is_some());

    harness.handler.dispose();
}

#[tokio::test]
async fn test_replay_rejected() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();
    let request = VerifyRequest {
        did: agent.did.clone(),
        challenge: challenge.challenge.clone(),
        signature: agent.sign_challenge(&challenge.challenge, &challenge.expires_at),
        manifest: agent.manifest(1),
    };

    harness.handler.verify(&request, None).await.unwrap();

    // Same challenge, same signature: the replay must be rejected even
    // with a fresh manifest sequence.
    let mut replay = request.clone();
    replay.manifest = agent.manifest(2);
    assert!(matches!(
        harness.handler.verify(&replay, None).await.unwrap_err(),
        AuthError::ChallengeAlreadyUsed
    ));

    harness.handler.dispose();
}

#[tokio::test]
async fn test_sequence_rollback_rejected() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    run_verify(&harness, &agent, 1).await.unwrap();

    // Same sequence again: rollback.
    let err = run_verify(&harness, &agent, 1).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::ManifestRollback { submitted: 1, current: 1 }
    ));

    // The next sequence is accepted.
    let response = run_verify(&harness, &agent, 2).await.unwrap();
    let claims = harness
        .handler
        .verify_bearer(&format!("Bearer {}", response.token))
        .unwrap();
    assert_eq!(claims.manifest_sequence, 2);

    harness.handler.dispose();
}

#[tokio::test]
async fn test_expired_challenge() {
    setup_test_logging();
    let mut config = AuthConfig::new("https://auth.example.com");
    config.challenge_lifetime = Duration::from_millis(10);
    config.clock_skew = Duration::ZERO;
    let harness = TestHarness::with_config(config);
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: agent.sign_challenge(&challenge.challenge, &challenge.expires_at),
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ExpiredChallenge));

    // The expired record is no longer readable through get.
    assert!(harness
        .challenges
        .get(&challenge.challenge)
        .await
        .unwrap()
        .is_none());

    harness.handler.dispose();
}

#[tokio::test]
async fn test_tampered_manifest_burns_nothing() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();
    let signature = agent.sign_challenge(&challenge.challenge, &challenge.expires_at);

    let mut tampered = agent.manifest(1);
    tampered.metadata.name = "impostor".to_string();

    let err = harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: signature.clone(),
                manifest: tampered,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidManifestSignature(_)));

    // No sequence was recorded and the challenge was not consumed: the
    // same challenge still verifies with the untampered manifest.
    assert_eq!(harness.acl.get_max_sequence(&agent.did).await.unwrap(), 0);
    harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge,
                signature,
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap();

    harness.handler.dispose();
}

#[tokio::test]
async fn test_banned_did_gets_no_challenge() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.set_status(&agent, AgentStatus::Banned).await;

    let err = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DidBanned));
    assert_eq!(err.status_code(), 403);

    harness.handler.dispose();
}

#[tokio::test]
async fn test_wrong_key_signature_rejected() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    let impostor = TestAgent::new_key();
    harness.approve(&agent).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();

    // The impostor signs the correct proof string with the wrong key.
    let signature = amp_auth::sign_challenge(
        &challenge.challenge,
        &agent.did,
        &challenge.expires_at,
        &impostor.keypair,
    );

    let err = harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge,
                signature,
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));

    harness.handler.dispose();
}

#[tokio::test]
async fn test_challenge_bound_to_did() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    let other = TestAgent::new_key();
    harness.approve(&agent).await;
    harness.approve(&other).await;

    let challenge = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();

    // The other agent presents the first agent's challenge.
    let err = harness
        .handler
        .verify(
            &VerifyRequest {
                did: other.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: other.sign_challenge(&challenge.challenge, &challenge.expires_at),
                manifest: other.manifest(1),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DidMismatch(_)));

    harness.handler.dispose();
}

#[tokio::test]
async fn test_unknown_challenge() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let err = harness
        .handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: "ab".repeat(32),
                signature: agent.sign_challenge(&"ab".repeat(32), "2026-01-01T00:00:00.000Z"),
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ChallengeNotFound));

    harness.handler.dispose();
}

#[tokio::test]
async fn test_registration_flow() {
    setup_test_logging();
    let harness = TestHarness::with_config(
        AuthConfig::new("https://auth.example.com").with_registration_enabled(true),
    );
    let agent = TestAgent::new_key();

    // Unknown DID asking for a challenge gets pointed at register.
    let err = harness
        .handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::DidNotFound { registration_open: true }
    ));

    let response = harness
        .handler
        .register(
            &amp_auth::RegisterRequest {
                manifest: agent.manifest(1),
                reason: Some("first deployment".to_string()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.status, AgentStatus::PendingApproval);
    assert!(response.retry_after.is_some());

    // Registering again reports status without mutating the entry.
    let again = harness
        .handler
        .register(
            &amp_auth::RegisterRequest {
                manifest: agent.manifest(2),
                reason: None,
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(again.status, AgentStatus::PendingApproval);
    let entry = harness.acl.get(&agent.did).await.unwrap().unwrap();
    assert_eq!(entry.manifest_sequence, 1);
    assert_eq!(entry.reason.as_deref(), Some("first deployment"));

    // A challenge is still gated until an operator approves.
    assert!(matches!(
        harness
            .handler
            .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
            .await
            .unwrap_err(),
        AuthError::DidPending { retry_after: 3600 }
    ));

    // Approve, then the full flow works.
    harness.approve(&agent).await;
    run_verify(&harness, &agent, 1).await.unwrap();

    harness.handler.dispose();
}

#[tokio::test]
async fn test_dynamic_scope_policy() {
    setup_test_logging();
    let harness = TestHarness::new();
    let agent = TestAgent::new_key();
    harness.approve(&agent).await;

    let handler = harness
        .handler
        .with_scope_policy(amp_auth::ScopePolicy::Dynamic(std::sync::Arc::new(
            |_did, manifest| format!("agent agent:{}", manifest.metadata.name),
        )));

    let challenge = handler
        .challenge(&ChallengeRequest { did: agent.did.clone() }, None)
        .await
        .unwrap();
    let response = handler
        .verify(
            &VerifyRequest {
                did: agent.did.clone(),
                challenge: challenge.challenge.clone(),
                signature: agent.sign_challenge(&challenge.challenge, &challenge.expires_at),
                manifest: agent.manifest(1),
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        response.agent.capabilities,
        vec!["agent".to_string(), "agent:test-agent".to_string()]
    );
    let claims = handler
        .verify_bearer(&format!("Bearer {}", response.token))
        .unwrap();
    assert_eq!(claims.scope, "agent agent:test-agent");

    handler.dispose();
}

#[tokio::test]
async fn test_registration_observer_fires() {
    setup_test_logging();
    let observed = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let seen = observed.clone();

    let config =
        AuthConfig::new("https://auth.example.com").with_registration_enabled(true);
    let harness = TestHarness::with_config(config);
    let handler = harness
        .handler
        .with_registration_observer(move |entry| seen.lock().unwrap().push(entry.did.clone()));

    let agent = TestAgent::new_key();
    handler
        .register(
            &amp_auth::RegisterRequest {
                manifest: agent.manifest(1),
                reason: None,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(observed.lock().unwrap().as_slice(), &[agent.did.clone()]);
    handler.dispose();
}
