/// Credit score derivation
///
/// Pure function of the KYC attributes and the proof. Each piece of evidence
/// adds a fixed boost to the base; the sum is clamped to [100, 850].
use crate::proof::Proof;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_SCORE: u16 = 100;
pub const MAX_SCORE: u16 = 850;

const BASE_SCORE: u32 = 100;
const EMAIL_BOOST: u32 = 50;
const EDU_DOMAIN_BOOST: u32 = 25;
const GOV_DOMAIN_BOOST: u32 = 40;
const COUNTRY_BOOST: u32 = 30;
const MERKLE_ROOT_BOOST: u32 = 80;
const NULLIFIER_BOOST: u32 = 40;
const STRONGEST_TIER_BOOST: u32 = 100;

/// Off-chain KYC attributes supplied at mint or reverify
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl KycAttributes {
    pub fn new(email: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            country: Some(country.into()),
        }
    }

    /// Trimmed email, `None` when absent or blank
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Trimmed country, `None` when absent or blank
    pub fn country(&self) -> Option<&str> {
        self.country.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn email_domain(&self) -> Option<String> {
        self.email()
            .and_then(|e| e.rsplit_once('@'))
            .map(|(_, domain)| domain.to_ascii_lowercase())
    }
}

// Emails and countries are PII.
impl fmt::Debug for KycAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KycAttributes")
            .field("email", &self.email().map(|_| "<redacted>"))
            .field("country", &self.country().map(|_| "<redacted>"))
            .finish()
    }
}

/// Institution class signalled by an email domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainClass {
    Education,
    Government,
    Other,
}

pub fn classify_domain(domain: &str) -> DomainClass {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.ends_with(".edu") {
        DomainClass::Education
    } else if domain.ends_with(".gov") {
        DomainClass::Government
    } else {
        DomainClass::Other
    }
}

/// Derive the credit score for the given evidence
pub fn derive(attributes: &KycAttributes, proof: Option<&Proof>) -> u16 {
    let mut score = BASE_SCORE;

    if attributes.email().is_some() {
        score += EMAIL_BOOST;
    }
    match attributes.email_domain().as_deref().map(classify_domain) {
        Some(DomainClass::Education) => score += EDU_DOMAIN_BOOST,
        Some(DomainClass::Government) => score += GOV_DOMAIN_BOOST,
        _ => {}
    }

    if attributes.country().is_some() {
        score += COUNTRY_BOOST;
    }

    if let Some(proof) = proof {
        if proof.has_merkle_root() {
            score += MERKLE_ROOT_BOOST;
        }
        if proof.has_nullifier_hash() {
            score += NULLIFIER_BOOST;
        }
        if proof.verification_level.is_strongest() {
            score += STRONGEST_TIER_BOOST;
        }
    }

    score.clamp(MIN_SCORE as u32, MAX_SCORE as u32) as u16
}

/// Human-readable band for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
}

pub fn rating(score: u16) -> Rating {
    if score > 700 {
        Rating::Excellent
    } else if score > 600 {
        Rating::Good
    } else {
        Rating::Fair
    }
}
