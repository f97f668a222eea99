//! Ed25519 primitives, hashing and randomness
//!
//! Thin wrappers over `ed25519-compact`, `sha2` and the OS RNG. Wrapping
//! keeps every signing operation in one auditable place and gives the
//! rest of the crate byte-slice seams that map cleanly onto wire data.

use crate::error::{AuthError, Result};
use ed25519_compact::{KeyPair, Noise, PublicKey, Seed, Signature};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of an Ed25519 public key in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Length of an Ed25519 detached signature in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Generate a fresh Ed25519 keypair from the OS CSPRNG.
pub fn generate_keypair() -> KeyPair {
    KeyPair::generate()
}

/// Derive a keypair deterministically from a 32-byte seed.
pub fn keypair_from_seed(seed: [u8; 32]) -> KeyPair {
    KeyPair::from_seed(Seed::new(seed))
}

/// Sign a message, producing a 64-byte detached signature.
///
/// Deterministic per RFC 8032: the same key and message always produce
/// byte-identical output (no noise parameter).
pub fn sign(message: &[u8], keypair: &KeyPair) -> [u8; SIGNATURE_LENGTH] {
    *keypair.sk.sign(message, None::<Noise>)
}

/// Verify a detached Ed25519 signature.
///
/// Returns `Ok(false)` for well-sized but invalid inputs (bad point
/// encodings included); only wrong lengths produce an error.
pub fn verify(signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(AuthError::InvalidRequest(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }
    if public_key.len() != PUBLIC_KEY_LENGTH {
        return Err(AuthError::InvalidRequest(format!(
            "public key must be {} bytes, got {}",
            PUBLIC_KEY_LENGTH,
            public_key.len()
        )));
    }

    let pk = match PublicKey::from_slice(public_key) {
        Ok(pk) => pk,
        Err(_) => return Ok(false),
    };
    let sig = match Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };

    Ok(pk.verify(message, &sig).is_ok())
}

/// Fill a buffer of `n` bytes from the OS CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// `n` random bytes, hex-encoded (lowercase).
pub fn random_hex(n: usize) -> String {
    hex::encode(random_bytes(n))
}

/// SHA-256 digest as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
