/// Proof-of-personhood adjudication
///
/// A proof is a transient artifact: it is checked once, summarized into the
/// credit score and published metadata, and never stored or logged raw.

pub mod policy;
pub mod verifier;

pub use policy::AssurancePolicy;
pub use verifier::{HttpProofVerifier, ProofVerifierConfig};

use crate::error::ArcIdResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Assurance tier of a proof-of-personhood check, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    Device,
    Document,
    SecureDocument,
    Orb,
}

impl VerificationLevel {
    /// The strongest tier earns the top score boost
    pub fn is_strongest(self) -> bool {
        self == VerificationLevel::Orb
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationLevel::Device => "device",
            VerificationLevel::Document => "document",
            VerificationLevel::SecureDocument => "secure_document",
            VerificationLevel::Orb => "orb",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" => Some(VerificationLevel::Device),
            "document" => Some(VerificationLevel::Document),
            "secure_document" => Some(VerificationLevel::SecureDocument),
            "orb" => Some(VerificationLevel::Orb),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof-of-personhood artifact as produced by the wallet-side widget
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullifier_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    pub verification_level: VerificationLevel,
    /// Opaque zero-knowledge proof, forwarded untouched to the verifier
    #[serde(default, rename = "proof", skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Proof {
    pub fn has_merkle_root(&self) -> bool {
        self.merkle_root.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_nullifier_hash(&self) -> bool {
        self.nullifier_hash.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

// Raw proof material stays out of logs.
impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proof")
            .field("verification_level", &self.verification_level)
            .field("has_nullifier_hash", &self.has_nullifier_hash())
            .field("has_merkle_root", &self.has_merkle_root())
            .field("raw", &self.raw.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outcome of a successful adjudication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofVerdict {
    pub verified: bool,
    pub level: VerificationLevel,
    /// Whether the external endpoint was consulted
    pub external: bool,
    pub detail: String,
}

/// Adjudicates proofs; failures are errors, never a "verified" verdict
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(&self, proof: &Proof) -> ArcIdResult<ProofVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(VerificationLevel::Device < VerificationLevel::Orb);
        assert!(VerificationLevel::Orb.is_strongest());
        assert!(!VerificationLevel::Device.is_strongest());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(VerificationLevel::parse("Device"), Some(VerificationLevel::Device));
        assert_eq!(
            VerificationLevel::parse("secure_document"),
            Some(VerificationLevel::SecureDocument)
        );
        assert_eq!(VerificationLevel::parse("retina"), None);
    }

    #[test]
    fn test_proof_wire_format() {
        let proof: Proof = serde_json::from_value(serde_json::json!({
            "merkle_root": "0x01",
            "nullifier_hash": "0x02",
            "proof": "0xdeadbeef",
            "verification_level": "orb"
        }))
        .unwrap();
        assert!(proof.has_merkle_root());
        assert!(proof.has_nullifier_hash());
        assert_eq!(proof.raw.as_deref(), Some("0xdeadbeef"));
        assert_eq!(proof.verification_level, VerificationLevel::Orb);
    }

    #[test]
    fn test_debug_redacts_raw_proof() {
        let proof = Proof {
            nullifier_hash: Some("0xabc".into()),
            merkle_root: None,
            verification_level: VerificationLevel::Device,
            raw: Some("0xsecretproofbytes".into()),
        };
        let rendered = format!("{:?}", proof);
        assert!(!rendered.contains("secretproofbytes"));
        assert!(!rendered.contains("0xabc"));
    }
}
