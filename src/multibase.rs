//! Multibase codec (base58btc, `z` prefix)
//!
//! The only multibase encoding AMP uses: Bitcoin base58 with the `z`
//! multibase prefix. Signatures and did:key identifiers travel in this
//! form.

use crate::error::{AuthError, Result};

/// Multibase prefix marking base58btc
const BASE58BTC_PREFIX: char = 'z';

/// Encode bytes as `z` + base58btc.
///
/// Empty input encodes to the bare prefix `"z"`.
pub fn encode(bytes: &[u8]) -> String {
    format!("{}{}", BASE58BTC_PREFIX, bs58::encode(bytes).into_string())
}

/// Decode a base58btc string, with or without the leading `z`.
///
/// Rejects any character outside the Bitcoin alphabet (which excludes
/// `0`, `O`, `I` and `l`).
pub fn decode(s: &str) -> Result<Vec<u8>> {
    let encoded = s.strip_prefix(BASE58BTC_PREFIX).unwrap_or(s);
    bs58::decode(encoded)
        .into_vec()
        .map_err(|e| AuthError::InvalidRequest(format!("invalid base58btc: {}", e)))
}
