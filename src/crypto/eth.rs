/// secp256k1 signing and signer recovery
///
/// `EthSigner` holds the server key that authenticates registry writes.
/// `recover_personal_signer` recovers the address behind an EIP-191
/// personal-message signature produced by a user's wallet.
use crate::{
    address::Address,
    error::{ArcIdError, ArcIdResult},
    hashing::{keccak256, Digest32},
};
use k256::{
    ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    SecretKey,
};

/// Recoverable signature split into its transaction fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1
    pub recovery_id: u8,
}

/// Server signer for registry transactions
pub struct EthSigner {
    signing_key: SigningKey,
    address: Address,
}

impl EthSigner {
    /// Create a new signer from a private key (32 bytes)
    pub fn new(private_key: &[u8]) -> ArcIdResult<Self> {
        if private_key.len() != 32 {
            return Err(ArcIdError::Validation(
                "Private key must be exactly 32 bytes".to_string(),
            ));
        }

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|e| ArcIdError::Validation(format!("Invalid private key: {}", e)))?;
        let signing_key = SigningKey::from(secret_key);
        let address = address_of(signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Create a signer from a hex-encoded private key (0x prefix optional)
    pub fn from_hex(hex_key: &str) -> ArcIdResult<Self> {
        let trimmed = hex_key.trim();
        let key_bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| ArcIdError::Validation(format!("Invalid hex private key: {}", e)))?;

        Self::new(&key_bytes)
    }

    /// Address controlled by this key
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sign a 32-byte prehash, returning low-s r/s and the recovery id
    pub fn sign_prehash(&self, prehash: &Digest32) -> ArcIdResult<RecoverableSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| ArcIdError::Internal(format!("Signing failed: {}", e)))?;

        let (signature, recovery_id) = normalize(signature, recovery_id);
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// Sign a personal message the way a wallet would (65 bytes, v = 27/28)
    pub fn sign_personal_message(&self, message: &str) -> ArcIdResult<String> {
        let sig = self.sign_prehash(&personal_message_hash(message))?;
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&sig.r);
        out.extend_from_slice(&sig.s);
        out.push(27 + sig.recovery_id);
        Ok(format!("0x{}", hex::encode(out)))
    }
}

/// Derive the address for a public key: last 20 bytes of keccak(x || y)
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address::from_bytes(out)
}

/// EIP-191 hash: keccak("\x19Ethereum Signed Message:\n" || len || message)
pub fn personal_message_hash(message: &str) -> Digest32 {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message.as_bytes());
    keccak256(&data)
}

/// Recover the address that produced `signature` over `message`
pub fn recover_personal_signer(message: &str, signature: &str) -> ArcIdResult<Address> {
    let trimmed = signature.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| ArcIdError::Validation(format!("Signature is not valid hex: {}", e)))?;
    if bytes.len() != 65 {
        return Err(ArcIdError::Validation(format!(
            "Signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }

    let v = match bytes[64] {
        0 | 1 => bytes[64],
        27 | 28 => bytes[64] - 27,
        other => {
            return Err(ArcIdError::Validation(format!(
                "Unsupported signature recovery byte: {}",
                other
            )))
        }
    };

    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| ArcIdError::Validation(format!("Malformed signature: {}", e)))?;
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| ArcIdError::Validation("Invalid recovery id".to_string()))?;
    let (signature, recovery_id) = normalize(signature, recovery_id);

    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id)
        .map_err(|_| ArcIdError::Authentication("Invalid signature".to_string()))?;

    Ok(address_of(&key))
}

/// Low-s form; flipping s mirrors the point, so the y parity flips too
fn normalize(signature: Signature, recovery_id: RecoveryId) -> (Signature, RecoveryId) {
    match signature.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    }
}
