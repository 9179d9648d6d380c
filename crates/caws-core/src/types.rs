use crate::error::{CawsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// Risk classification for a change. Tier 1 gets the most scrutiny and the
/// tightest budget; tier 3 the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RiskTier {
    Tier1,
    Tier2,
    Tier3,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [RiskTier::Tier1, RiskTier::Tier2, RiskTier::Tier3];

    pub fn as_u8(self) -> u8 {
        match self {
            RiskTier::Tier1 => 1,
            RiskTier::Tier2 => 2,
            RiskTier::Tier3 => 3,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.as_u8() as usize - 1
    }
}

impl TryFrom<u8> for RiskTier {
    type Error = CawsError;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(RiskTier::Tier1),
            2 => Ok(RiskTier::Tier2),
            3 => Ok(RiskTier::Tier3),
            other => Err(CawsError::InvalidRiskTier(other.to_string())),
        }
    }
}

impl From<RiskTier> for u8 {
    fn from(tier: RiskTier) -> u8 {
        tier.as_u8()
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl FromStr for RiskTier {
    type Err = CawsError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| CawsError::InvalidRiskTier(s.to_string()))
            .and_then(RiskTier::try_from)
    }
}

// ---------------------------------------------------------------------------
// BudgetField
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetField {
    MaxFiles,
    MaxLoc,
}

impl BudgetField {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetField::MaxFiles => "max_files",
            BudgetField::MaxLoc => "max_loc",
        }
    }
}

impl fmt::Display for BudgetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TierBudget / BudgetDelta
// ---------------------------------------------------------------------------

/// Change-size limits for one risk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBudget {
    pub max_files: u32,
    pub max_loc: u32,
}

impl TierBudget {
    pub fn new(max_files: u32, max_loc: u32) -> Self {
        Self {
            max_files,
            max_loc,
        }
    }

    /// Raise this budget by `delta`. Saturates at `u32::MAX`; a delta can
    /// never lower a budget.
    pub fn raise(&mut self, delta: &BudgetDelta) {
        self.max_files = self.max_files.saturating_add(delta.max_files);
        self.max_loc = self.max_loc.saturating_add(delta.max_loc);
    }
}

/// Amount a waiver adds on top of the baseline budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetDelta {
    #[serde(default)]
    pub max_files: u32,
    #[serde(default)]
    pub max_loc: u32,
}

impl BudgetDelta {
    pub fn is_zero(&self) -> bool {
        self.max_files == 0 && self.max_loc == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
