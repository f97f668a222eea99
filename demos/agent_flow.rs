//! End-to-end AMP flow against in-memory stores.
//!
//! Plays both sides: the server (handler with in-memory stores) and an
//! agent holding an Ed25519 key behind a did:key identity.
//!
//! Run with: cargo run --example agent_flow

use amp_auth::manifest::{
    format_rfc3339, sign_manifest, AgentManifest, InterfaceDecl, InterfaceProtocol,
    ManifestCapabilities, ManifestMetadata,
};
use amp_auth::{
    AuthConfig, AuthHandler, BudgetedFetcher, ChallengeRequest, InMemoryAclStore,
    InMemoryChallengeStore, RegisterRequest, TokenSigner, VerifyRequest,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    // Server side: handler over in-memory stores, registration open.
    let config = AuthConfig::new("https://auth.example.com").with_registration_enabled(true);
    let skew = config.clock_skew.as_secs();
    let handler = AuthHandler::new(
        config,
        TokenSigner::hs256("https://auth.example.com", b"demo-secret", 3600, skew),
        Arc::new(InMemoryChallengeStore::new(skew)),
        Arc::new(InMemoryAclStore::new()),
        Arc::new(BudgetedFetcher::new("amp-auth-demo/0.1")?),
    );

    // Agent side: a fresh keypair bound to a did:key.
    let keypair = amp_auth::crypto::generate_keypair();
    let mut public_key = [0u8; 32];
    public_key.copy_from_slice(keypair.pk.as_ref());
    let did = amp_auth::did::public_key_to_did_key(&public_key);
    println!("agent DID: {}", did);

    let now = Utc::now();
    let mut manifest = AgentManifest {
        version: "1.0.0".to_string(),
        id: did.clone(),
        sequence: 1,
        created_at: format_rfc3339(now),
        updated_at: format_rfc3339(now),
        valid_until: format_rfc3339(now + Duration::days(30)),
        revocation: None,
        metadata: ManifestMetadata {
            name: "demo-agent".to_string(),
            description: "Walks the full authentication flow".to_string(),
            agent_version: "0.1.0".to_string(),
            tags: Some(vec!["demo".to_string()]),
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
    sign_manifest(&mut manifest, &keypair, None)?;

    // Register, then approve out-of-band (normally an operator action).
    let registered = handler
        .register(
            &RegisterRequest {
                manifest: manifest.clone(),
                reason: Some("demo run".to_string()),
            },
            None,
        )
        .await?;
    println!("registered: {} ({})", registered.did, registered.message);

    let mut entry = handler.acl().get(&did).await?.expect("entry just created");
    entry.status = amp_auth::AgentStatus::Approved;
    entry.updated_at = Utc::now();
    handler.acl().set(entry).await?;
    println!("operator approved the agent");

    // Challenge-response.
    let challenge = handler
        .challenge(&ChallengeRequest { did: did.clone() }, None)
        .await?;
    println!("challenge: {}..", &challenge.challenge[..16]);

    let signature =
        amp_auth::sign_challenge(&challenge.challenge, &did, &challenge.expires_at, &keypair);

    let verified = handler
        .verify(
            &VerifyRequest {
                did: did.clone(),
                challenge: challenge.challenge,
                signature,
                manifest,
            },
            None,
        )
        .await?;
    println!(
        "token issued for {} (capabilities: {:?}, expires {})",
        verified.agent.name, verified.agent.capabilities, verified.expires_at
    );

    // Bearer use on a protected resource.
    let claims = handler.verify_bearer(&format!("Bearer {}", verified.token))?;
    println!(
        "bearer accepted: sub={} seq={} jti={}",
        claims.sub, claims.manifest_sequence, claims.jti
    );

    handler.dispose();
    Ok(())
}
