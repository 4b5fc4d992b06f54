/// Assurance policy: which tiers may skip the external verifier
use crate::{
    error::{ArcIdError, ArcIdResult},
    proof::{Proof, VerificationLevel},
};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssurancePolicy {
    format_only: BTreeSet<VerificationLevel>,
}

impl Default for AssurancePolicy {
    fn default() -> Self {
        Self::new([VerificationLevel::Device])
    }
}

impl AssurancePolicy {
    pub fn new(format_only: impl IntoIterator<Item = VerificationLevel>) -> Self {
        Self {
            format_only: format_only.into_iter().collect(),
        }
    }

    /// Parse a comma-separated tier list, e.g. `"device,document"`
    pub fn from_list(list: &str) -> ArcIdResult<Self> {
        let mut levels = BTreeSet::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let level = VerificationLevel::parse(name).ok_or_else(|| {
                ArcIdError::Validation(format!("Unknown verification level: {}", name))
            })?;
            levels.insert(level);
        }
        Ok(Self { format_only: levels })
    }

    /// True when this tier is accepted on format checks alone
    pub fn is_format_only(&self, level: VerificationLevel) -> bool {
        self.format_only.contains(&level)
    }

    pub fn format_only_levels(&self) -> impl Iterator<Item = VerificationLevel> + '_ {
        self.format_only.iter().copied()
    }

    /// Structural checks applied to every proof before any decision
    pub fn check_format(&self, proof: &Proof) -> ArcIdResult<()> {
        if !proof.has_nullifier_hash() {
            return Err(ArcIdError::Validation(
                "Proof is missing nullifier_hash".to_string(),
            ));
        }

        for (name, value) in [
            ("nullifier_hash", proof.nullifier_hash.as_deref()),
            ("merkle_root", proof.merkle_root.as_deref()),
        ] {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                if !is_hex_field(v) {
                    return Err(ArcIdError::Validation(format!(
                        "Proof field {} must be 0x-prefixed hex",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_hex_field(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit()))
}
