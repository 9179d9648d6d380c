//! Budget gate checker and the dual-control rule for policy edits.

use crate::change::{ChangeMetrics, ChangeSet};
use crate::paths::CAWS_DIR;
use crate::policy::EditRules;
use crate::types::{BudgetField, TierBudget};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetViolation {
    pub field: BudgetField,
    pub actual: u32,
    pub limit: u32,
}

impl BudgetViolation {
    pub fn overage(&self) -> u32 {
        self.actual.saturating_sub(self.limit)
    }

    fn label(&self) -> &'static str {
        match self.field {
            BudgetField::MaxFiles => "files",
            BudgetField::MaxLoc => "loc",
        }
    }
}

impl std::fmt::Display for BudgetViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} > {} (+{})",
            self.label(),
            self.actual,
            self.limit,
            self.overage()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetCheck {
    pub passed: bool,
    pub detail: String,
    pub violations: Vec<BudgetViolation>,
}

/// Compare a change against the effective budget. Every exceeded dimension
/// is reported, not just the first.
pub fn check_budget(effective: &TierBudget, actual: &ChangeMetrics) -> BudgetCheck {
    let mut violations = Vec::new();
    if actual.files > effective.max_files {
        violations.push(BudgetViolation {
            field: BudgetField::MaxFiles,
            actual: actual.files,
            limit: effective.max_files,
        });
    }
    if actual.loc > effective.max_loc {
        violations.push(BudgetViolation {
            field: BudgetField::MaxLoc,
            actual: actual.loc,
            limit: effective.max_loc,
        });
    }

    let detail = if violations.is_empty() {
        format!(
            "within budget: files {}/{}, loc {}/{}",
            actual.files, effective.max_files, actual.loc, effective.max_loc
        )
    } else {
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    };

    BudgetCheck {
        passed: violations.is_empty(),
        detail,
        violations,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DualControlCheck {
    pub passed: bool,
    pub detail: String,
}

/// Policy-file edits may not ride along with code edits unless
/// `policy_and_code_same_pr` allows it. Other files under `.caws/` are not
/// counted as code.
pub fn check_dual_control(
    rules: &EditRules,
    changes: &ChangeSet,
    policy_rel_path: &Path,
) -> DualControlCheck {
    let touches_policy = changes.touches(policy_rel_path);
    let code_files: Vec<&str> = changes
        .files
        .iter()
        .map(|f| f.path.as_str())
        .filter(|p| !Path::new(p).starts_with(CAWS_DIR))
        .collect();

    if !touches_policy || code_files.is_empty() {
        return DualControlCheck {
            passed: true,
            detail: "no mixed policy and code changes".to_string(),
        };
    }
    if rules.policy_and_code_same_pr {
        return DualControlCheck {
            passed: true,
            detail: "policy and code changes allowed together".to_string(),
        };
    }
    DualControlCheck {
        passed: false,
        detail: format!(
            "{} changed together with {} code file(s); split policy edits into a separate change",
            policy_rel_path.display(),
            code_files.len()
        ),
    }
}
