//! Policy store: the per-project budget policy.
//!
//! Layout:
//!   .caws/policy.yaml   — version, risk_tiers (1, 2, 3), edit_rules
//!
//! A missing file is not an error: the compiled-in default is returned and
//! flagged with `is_default`. A file that exists but does not parse or does
//! not validate is always a [`PolicyError`].

use crate::error::{PolicyError, Result};
use crate::io;
use crate::paths::Layout;
use crate::types::{BudgetField, RiskTier, TierBudget};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use std::path::Path;

pub const POLICY_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// EditRules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRules {
    /// Whether policy-file edits may ship in the same change as code edits.
    #[serde(default)]
    pub policy_and_code_same_pr: bool,
}

// ---------------------------------------------------------------------------
// RiskTiers
// ---------------------------------------------------------------------------

/// Budgets for all three tiers. Always complete once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskTiers([TierBudget; 3]);

impl RiskTiers {
    pub fn new(tier1: TierBudget, tier2: TierBudget, tier3: TierBudget) -> Self {
        Self([tier1, tier2, tier3])
    }

    pub fn get(&self, tier: RiskTier) -> TierBudget {
        self.0[tier.index()]
    }

    pub fn set(&mut self, tier: RiskTier, budget: TierBudget) {
        self.0[tier.index()] = budget;
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiskTier, TierBudget)> + '_ {
        RiskTier::ALL.into_iter().map(|t| (t, self.get(t)))
    }
}

impl Serialize for RiskTiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        for (tier, budget) in self.iter() {
            map.serialize_entry(&tier, &budget)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    pub version: u32,
    pub risk_tiers: RiskTiers,
    pub edit_rules: EditRules,
    /// Set when no policy file exists and the built-in default was used.
    #[serde(skip)]
    pub is_default: bool,
}

impl Policy {
    /// Built-in policy used when a project has no policy file.
    pub fn default_policy() -> Self {
        Self {
            version: POLICY_VERSION,
            risk_tiers: RiskTiers::new(
                TierBudget::new(25, 1000),
                TierBudget::new(50, 2000),
                TierBudget::new(100, 5000),
            ),
            edit_rules: EditRules::default(),
            is_default: true,
        }
    }

    pub fn budget_for(&self, tier: RiskTier) -> TierBudget {
        self.risk_tiers.get(tier)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, root: &Path, layout: &Layout) -> Result<()> {
        let data = self.to_yaml()?;
        io::atomic_write(&layout.policy_path(root), data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read the policy straight from disk, bypassing any cache.
pub fn load_from_disk(root: &Path, layout: &Layout) -> Result<Policy> {
    let path = layout.policy_path(root);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no policy file, using default policy");
            return Ok(Policy::default_policy());
        }
        Err(e) => return Err(e.into()),
    };
    let policy = parse_policy(&data).map_err(|e| match e {
        PolicyError::Malformed { message, .. } => PolicyError::Malformed {
            path: path.clone(),
            message,
        },
        other => other,
    })?;
    tracing::debug!(path = %path.display(), version = policy.version, "policy loaded from disk");
    Ok(policy)
}

/// Parse and validate a YAML policy document.
pub fn parse_policy(data: &str) -> std::result::Result<Policy, PolicyError> {
    let doc: Value = serde_yaml::from_str(data).map_err(|e| PolicyError::Malformed {
        path: Default::default(),
        message: e.to_string(),
    })?;
    validate_policy(&doc)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural check of a policy document.
///
/// Checks run in a fixed order and the first violation is returned:
/// version, then risk_tiers, then presence of tiers 1..=3, then the
/// `max_files`/`max_loc` fields of each tier, then edit_rules.
pub fn validate_policy(doc: &Value) -> std::result::Result<Policy, PolicyError> {
    let version = match doc.get("version") {
        None | Some(Value::Null) => return Err(PolicyError::MissingVersion),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(PolicyError::InvalidVersion)?,
    };

    let tiers = match doc.get("risk_tiers") {
        Some(Value::Mapping(m)) => m,
        _ => return Err(PolicyError::MissingRiskTiers),
    };

    let mut entries = Vec::with_capacity(RiskTier::ALL.len());
    for tier in RiskTier::ALL {
        match tier_entry(tiers, tier) {
            Some(entry) => entries.push((tier, entry)),
            None => return Err(PolicyError::MissingTier(tier)),
        }
    }

    let mut risk_tiers = RiskTiers::new(
        TierBudget::default(),
        TierBudget::default(),
        TierBudget::default(),
    );
    for (tier, entry) in entries {
        let max_files = budget_field(entry, tier, BudgetField::MaxFiles)?;
        let max_loc = budget_field(entry, tier, BudgetField::MaxLoc)?;
        risk_tiers.set(tier, TierBudget::new(max_files, max_loc));
    }

    let edit_rules = match doc.get("edit_rules") {
        None | Some(Value::Null) => EditRules::default(),
        Some(v @ Value::Mapping(_)) => {
            serde_yaml::from_value(v.clone()).map_err(|_| PolicyError::InvalidEditRules)?
        }
        Some(_) => return Err(PolicyError::InvalidEditRules),
    };

    Ok(Policy {
        version,
        risk_tiers,
        edit_rules,
        is_default: false,
    })
}

/// Find a tier entry keyed either as an integer (`1:`) or a string (`"1":`).
/// A null entry counts as absent.
fn tier_entry(tiers: &Mapping, tier: RiskTier) -> Option<&Value> {
    tiers
        .iter()
        .find(|(key, _)| match key {
            Value::Number(n) => n.as_u64() == Some(u64::from(tier.as_u8())),
            Value::String(s) => s.trim() == tier.to_string(),
            _ => false,
        })
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

fn budget_field(
    entry: &Value,
    tier: RiskTier,
    field: BudgetField,
) -> std::result::Result<u32, PolicyError> {
    entry
        .get(field.as_str())
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(PolicyError::InvalidTierBudget { tier, field })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
