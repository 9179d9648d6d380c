use crate::types::{BudgetField, RiskTier};
use std::path::PathBuf;
use thiserror::Error;

/// Structural problems with a policy document. Always fatal: a broken policy
/// file is never replaced by the default.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("failed to parse policy {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Policy missing version")]
    MissingVersion,

    #[error("Policy version must be a non-negative integer")]
    InvalidVersion,

    #[error("Policy missing risk_tiers configuration")]
    MissingRiskTiers,

    #[error("Policy missing risk tier {0}")]
    MissingTier(RiskTier),

    #[error("Risk tier {tier} missing or invalid budget limits: {field}")]
    InvalidTierBudget { tier: RiskTier, field: BudgetField },

    #[error("Policy edit_rules must be a mapping with a boolean policy_and_code_same_pr")]
    InvalidEditRules,
}

#[derive(Debug, Error)]
pub enum CawsError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("waiver not found: {0}")]
    WaiverNotFound(String),

    #[error("waiver already exists: {0}")]
    WaiverExists(String),

    #[error("invalid waiver id '{0}': expected WV- followed by at least four digits")]
    InvalidWaiverId(String),

    #[error("invalid waiver: {0}")]
    InvalidWaiver(String),

    #[error("invalid risk tier '{0}': must be 1, 2, or 3")]
    InvalidRiskTier(String),

    #[error("working spec not found: {0}")]
    WorkingSpecNotFound(PathBuf),

    #[error("invalid numstat line: {0}")]
    InvalidNumstat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CawsError>;
