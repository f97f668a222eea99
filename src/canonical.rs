//! JSON canonicalization (RFC 8785 JCS)
//!
//! Signing inputs are always computed over the canonical byte form of a
//! JSON value, so that structurally equal documents hash identically no
//! matter how they were serialized on the wire.

use crate::error::{AuthError, Result};
use serde::Serialize;

/// Canonicalize any serializable value to RFC 8785 bytes.
///
/// Member names are sorted by UTF-16 code units, insignificant whitespace
/// is dropped, and numbers use the ECMA-262 shortest round-trip form.
/// Two structurally equal values produce byte-identical output.
pub fn to_jcs_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value)
        .map_err(|e| AuthError::Internal(format!("canonicalization failed: {}", e)))
}

/// Canonicalize a JSON object with one top-level member removed.
///
/// This is the signing-input rule for manifests: the `proof` member is
/// absent from the signed bytes (not present with `null`).
pub fn to_jcs_bytes_without<T: Serialize>(value: &T, member: &str) -> Result<Vec<u8>> {
    let mut json = serde_json::to_value(value)?;
    if let Some(object) = json.as_object_mut() {
        object.remove(member);
    }
    to_jcs_bytes(&json)
}
