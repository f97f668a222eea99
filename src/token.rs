//! Bearer token issuance and validation
//!
//! Tokens are self-contained JWTs: no server-side session state. Two
//! algorithms are supported, picked by how the signer is constructed:
//! HS256 over a shared secret, or EdDSA over an injected Ed25519 key
//! (injection keeps the door open for HSM-backed keys).

use crate::crypto::random_hex;
use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use ed25519_compact::KeyPair;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default token lifetime in seconds
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3_600;

/// Allowed token lifetime range in seconds
pub const TOKEN_LIFETIME_RANGE_SECS: (u64, u64) = (60, 43_200);

/// Claims carried by every issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Configured issuer
    pub iss: String,
    /// The authenticated agent's DID
    pub sub: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// 16 random bytes, hex-encoded
    pub jti: String,
    /// Space-separated capability scope
    pub scope: String,
    /// Agent display name from the verified manifest
    pub agent_name: String,
    /// Agent software version from the verified manifest
    pub agent_version: String,
    /// Sequence of the manifest that earned this token
    pub manifest_sequence: u64,
}

/// JWT issuer/validator
pub struct TokenSigner {
    issuer: String,
    lifetime_secs: u64,
    clock_skew_secs: u64,
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenSigner {
    /// HS256 signer over a symmetric secret.
    pub fn hs256(
        issuer: impl Into<String>,
        secret: &[u8],
        lifetime_secs: u64,
        clock_skew_secs: u64,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime_secs: clamp_lifetime(lifetime_secs),
            clock_skew_secs,
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// EdDSA signer over an Ed25519 keypair.
    pub fn eddsa(
        issuer: impl Into<String>,
        keypair: &KeyPair,
        lifetime_secs: u64,
        clock_skew_secs: u64,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime_secs: clamp_lifetime(lifetime_secs),
            clock_skew_secs,
            algorithm: Algorithm::EdDSA,
            encoding: EncodingKey::from_ed_der(&keypair.sk.to_der()),
            decoding: DecodingKey::from_ed_der(keypair.pk.as_ref()),
        }
    }

    /// Configured token lifetime.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Mint a token for a verified agent.
    pub fn issue(
        &self,
        did: &str,
        scope: &str,
        agent_name: &str,
        agent_version: &str,
        manifest_sequence: u64,
    ) -> Result<(String, TokenClaims)> {
        self.issue_at(Utc::now(), did, scope, agent_name, agent_version, manifest_sequence)
    }

    /// Mint a token against an explicit `now`.
    pub fn issue_at(
        &self,
        now: DateTime<Utc>,
        did: &str,
        scope: &str,
        agent_name: &str,
        agent_version: &str,
        manifest_sequence: u64,
    ) -> Result<(String, TokenClaims)> {
        let iat = now.timestamp();
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: did.to_string(),
            iat,
            exp: iat + self.lifetime_secs as i64,
            jti: random_hex(16),
            scope: scope.to_string(),
            agent_name: agent_name.to_string(),
            agent_version: agent_version.to_string(),
            manifest_sequence,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))?;

        Ok((token, claims))
    }

    /// Validate a bearer token and hand back its claims.
    ///
    /// Rejects on wrong issuer, bad signature, expiry (with the
    /// configured skew) and empty `sub`/`scope`. Every failure surfaces
    /// as `InvalidToken`.
    pub fn validate(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = self.clock_skew_secs;

        let data = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("missing sub claim".to_string()));
        }
        if claims.scope.is_empty() {
            return Err(AuthError::InvalidToken("missing scope claim".to_string()));
        }

        Ok(claims)
    }
}

fn clamp_lifetime(lifetime_secs: u64) -> u64 {
    lifetime_secs.clamp(TOKEN_LIFETIME_RANGE_SECS.0, TOKEN_LIFETIME_RANGE_SECS.1)
}

/// Pull the token out of an `Authorization: Bearer <token>` value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;
    use chrono::Duration as ChronoDuration;

    fn hs_signer() -> TokenSigner {
        TokenSigner::hs256("https://auth.example.com", b"test-secret", 3600, 60)
    }

    #[test]
    fn test_hs256_roundtrip() {
        let signer = hs_signer();
        let (token, issued) = signer
            .issue("did:key:zabc", "read write", "indexer", "1.0.0", 3)
            .unwrap();

        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, "did:key:zabc");
        assert_eq!(claims.scope, "read write");
        assert_eq!(claims.manifest_sequence, 3);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_eddsa_roundtrip() {
        let kp = generate_keypair();
        let signer = TokenSigner::eddsa("https://auth.example.com", &kp, 3600, 60);

        let (token, _) = signer
            .issue("did:key:zabc", "agent", "indexer", "1.0.0", 1)
            .unwrap();
        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, "did:key:zabc");
    }

    #[test]
    fn test_jti_is_16_random_bytes_hex() {
        let signer = hs_signer();
        let (_, a) = signer.issue("did:key:za", "s", "n", "1.0.0", 1).unwrap();
        let (_, b) = signer.issue("did:key:za", "s", "n", "1.0.0", 1).unwrap();
        assert_eq!(a.jti.len(), 32);
        assert!(a.jti.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = hs_signer();
        let (token, _) = signer
            .issue_at(
                Utc::now() - ChronoDuration::hours(2),
                "did:key:zabc",
                "agent",
                "indexer",
                "1.0.0",
                1,
            )
            .unwrap();
        assert!(matches!(
            signer.validate(&token).unwrap_err(),
            AuthError::InvalidToken(_)
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let issuing = hs_signer();
        let validating =
            TokenSigner::hs256("https://other.example.com", b"test-secret", 3600, 60);

        let (token, _) = issuing.issue("did:key:za", "agent", "n", "1.0.0", 1).unwrap();
        assert!(validating.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuing = hs_signer();
        let validating =
            TokenSigner::hs256("https://auth.example.com", b"another-secret", 3600, 60);

        let (token, _) = issuing.issue("did:key:za", "agent", "n", "1.0.0", 1).unwrap();
        assert!(validating.validate(&token).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = hs_signer();
        let (token, _) = signer.issue("did:key:za", "agent", "n", "1.0.0", 1).unwrap();
        let mut tampered = token.into_bytes();
        let mid = tampered.len() / 2;
        tampered[mid] = if tampered[mid] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(signer.validate(&tampered).is_err());
    }

    #[test]
    fn test_empty_scope_rejected() {
        let signer = hs_signer();
        let (token, _) = signer.issue("did:key:za", "", "n", "1.0.0", 1).unwrap();
        assert!(matches!(
            signer.validate(&token).unwrap_err(),
            AuthError::InvalidToken(msg) if msg.contains("scope")
        ));
    }

    #[test]
    fn test_lifetime_clamped() {
        let short = TokenSigner::hs256("iss", b"s", 5, 60);
        assert_eq!(short.lifetime(), Duration::from_secs(60));

        let long = TokenSigner::hs256("iss", b"s", 1_000_000, 60);
        assert_eq!(long.lifetime(), Duration::from_secs(43_200));
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer(""), None);
    }
}
