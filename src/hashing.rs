/// Deterministic content-hash binding
///
/// The data hash written to the registry is `keccak256(serialized ":" salt)`,
/// where `serialized` is the input itself when it is already a string and its
/// canonical JSON otherwise. An empty salt and "no salt" produce the same
/// digest; callers that want per-deployment separation configure a salt.
use serde::Serialize;
use serde_json::Value;
use sha3::{Digest, Keccak256};

use crate::error::{ArcIdError, ArcIdResult};

/// 32-byte Keccak-256 digest
pub type Digest32 = [u8; 32];

/// Keccak-256 over raw bytes
pub fn keccak256(data: &[u8]) -> Digest32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Render a digest as 0x-prefixed lowercase hex
pub fn digest_to_hex(digest: &Digest32) -> String {
    format!("0x{}", hex::encode(digest))
}

/// Parse a 0x-prefixed 64-hex-digit digest
pub fn digest_from_hex(s: &str) -> ArcIdResult<Digest32> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| ArcIdError::Validation(format!("Invalid digest hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(ArcIdError::Validation(format!(
            "Digest must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Canonical JSON: object keys sorted, no insignificant whitespace
///
/// Going through `Value` sorts keys regardless of struct field order.
pub fn canonical_json<T: Serialize + ?Sized>(input: &T) -> ArcIdResult<String> {
    let value = serde_json::to_value(input)
        .map_err(|e| ArcIdError::Internal(format!("Failed to serialize for hashing: {}", e)))?;
    serde_json::to_string(&value)
        .map_err(|e| ArcIdError::Internal(format!("Failed to encode canonical JSON: {}", e)))
}

/// Text form of a hash input: strings as-is, everything else canonical JSON
pub fn serialize_input(input: &Value) -> ArcIdResult<String> {
    match input {
        Value::String(s) => Ok(s.clone()),
        other => canonical_json(other),
    }
}

/// Build the data hash for `(input, salt)`
pub fn build_data_hash(input: &Value, salt: &str) -> ArcIdResult<Digest32> {
    let serialized = serialize_input(input)?;
    Ok(hash_text(&serialized, salt))
}

/// Build the data hash for an input that is already text
pub fn hash_text(serialized: &str, salt: &str) -> Digest32 {
    let preimage = format!("{}:{}", serialized, salt);
    keccak256(preimage.as_bytes())
}
