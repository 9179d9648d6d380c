//! Reader for the parts of a working spec the budget gate needs.
//!
//! Only `id`, `title`, `risk_tier` and `waiver_ids` are read; every other
//! field in the document is ignored.

use crate::error::{CawsError, Result};
use crate::paths;
use crate::types::RiskTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingSpec {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub risk_tier: RiskTier,
    #[serde(default)]
    pub waiver_ids: Vec<String>,
}

impl WorkingSpec {
    /// Load `.caws/working-spec.yaml` under `root`.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&paths::working_spec_path(root))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CawsError::WorkingSpecNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}
