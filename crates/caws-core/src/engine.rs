//! Policy and waiver resolution.
//!
//! `PolicyEngine` owns the cache, the clock, and the project layout. Its
//! pipeline is: load the policy (through the cache), pick the baseline for a
//! risk tier, add the deltas of every currently valid referenced waiver, then
//! check the change against the result.

use crate::budget::{check_budget, BudgetCheck};
use crate::cache::PolicyCache;
use crate::change::ChangeMetrics;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::paths::Layout;
use crate::policy::{self, Policy};
use crate::types::{RiskTier, TierBudget};
use crate::waiver::{self, WaiverLookup, WaiverState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPolicy {
    pub policy: Policy,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Missing,
    Malformed,
    Inactive,
    Expired,
    NoApprovers,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::Missing => "missing",
            SkipReason::Malformed => "malformed",
            SkipReason::Inactive => "inactive",
            SkipReason::Expired => "expired",
            SkipReason::NoApprovers => "no approvers",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedWaiver {
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaiverResolution {
    pub effective: TierBudget,
    /// Ids that contributed, in encounter order.
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedWaiver>,
}

/// Everything needed to explain a budget gate outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetDecision {
    pub tier: RiskTier,
    pub baseline: TierBudget,
    pub effective: TierBudget,
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedWaiver>,
    pub actual: ChangeMetrics,
    pub passed: bool,
    pub detail: String,
    pub policy_is_default: bool,
    pub evaluated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

pub struct PolicyEngine {
    layout: Layout,
    cache: PolicyCache,
    clock: Arc<dyn Clock>,
}

impl PolicyEngine {
    pub fn new(layout: Layout, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            layout,
            cache: PolicyCache::new(ttl, clock.clone()),
            clock,
        }
    }

    /// Engine on the wall clock, laid out and cached per `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.layout(), config.cache_ttl(), Arc::new(SystemClock))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn cache(&self) -> &PolicyCache {
        &self.cache
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Cached policy for `root`, reading from disk on a miss.
    pub fn load_policy(&self, root: &Path) -> Result<LoadedPolicy> {
        if let Some(policy) = self.cache.get(root) {
            tracing::debug!(root = %root.display(), "policy cache hit");
            return Ok(LoadedPolicy {
                policy,
                cache_hit: true,
            });
        }
        tracing::debug!(root = %root.display(), "policy cache miss");
        let policy = policy::load_from_disk(root, &self.layout)?;
        self.cache.set(root, policy.clone());
        Ok(LoadedPolicy {
            policy,
            cache_hit: false,
        })
    }

    /// Re-read the policy from disk regardless of cache state. On failure the
    /// stale entry is dropped so later loads cannot serve it.
    pub fn reload_policy(&self, root: &Path) -> Result<Policy> {
        match policy::load_from_disk(root, &self.layout) {
            Ok(policy) => {
                self.cache.set(root, policy.clone());
                Ok(policy)
            }
            Err(e) => {
                self.cache.invalidate(root);
                Err(e)
            }
        }
    }

    /// Add the delta of every currently valid waiver in `waiver_ids` to
    /// `baseline`. Never fails: a waiver that is missing, unreadable,
    /// inactive, expired, or unapproved is recorded as skipped. Duplicate ids
    /// apply once per occurrence.
    pub fn apply_waivers<S: AsRef<str>>(
        &self,
        baseline: &TierBudget,
        waiver_ids: &[S],
        root: &Path,
    ) -> WaiverResolution {
        let now = self.clock.now();
        let mut effective = *baseline;
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for id in waiver_ids.iter().map(AsRef::as_ref) {
            let skip = |reason| SkippedWaiver {
                id: id.to_string(),
                reason,
            };
            let waiver = match waiver::lookup_waiver(root, &self.layout, id) {
                WaiverLookup::Found(w) => w,
                WaiverLookup::Missing => {
                    tracing::debug!(waiver = id, "referenced waiver not found");
                    skipped.push(skip(SkipReason::Missing));
                    continue;
                }
                WaiverLookup::Malformed(reason) => {
                    tracing::warn!(waiver = id, %reason, "ignoring malformed waiver");
                    skipped.push(skip(SkipReason::Malformed));
                    continue;
                }
            };
            match waiver.state(now) {
                WaiverState::Active => {}
                WaiverState::Revoked => {
                    skipped.push(skip(SkipReason::Inactive));
                    continue;
                }
                WaiverState::Expired => {
                    skipped.push(skip(SkipReason::Expired));
                    continue;
                }
            }
            if waiver.approvers.iter().all(|a| a.trim().is_empty()) {
                tracing::warn!(waiver = id, "ignoring waiver without approvers");
                skipped.push(skip(SkipReason::NoApprovers));
                continue;
            }
            effective.raise(&waiver.delta);
            applied.push(id.to_string());
        }

        WaiverResolution {
            effective,
            applied,
            skipped,
        }
    }

    /// Full gate: baseline for `tier`, waivers applied, change checked.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        root: &Path,
        tier: RiskTier,
        waiver_ids: &[S],
        actual: &ChangeMetrics,
    ) -> Result<BudgetDecision> {
        let loaded = self.load_policy(root)?;
        let baseline = loaded.policy.budget_for(tier);
        let resolution = self.apply_waivers(&baseline, waiver_ids, root);
        let BudgetCheck { passed, detail, .. } = check_budget(&resolution.effective, actual);
        Ok(BudgetDecision {
            tier,
            baseline,
            effective: resolution.effective,
            applied: resolution.applied,
            skipped: resolution.skipped,
            actual: *actual,
            passed,
            detail,
            policy_is_default: loaded.policy.is_default,
            evaluated_at: self.clock.now(),
        })
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("layout", &self.layout)
            .field("cache", &self.cache)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{CawsError, PolicyError};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        dir: TempDir,
        clock: Arc<ManualClock>,
        engine: PolicyEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(start()));
            let engine = PolicyEngine::new(
                Layout::default(),
                Duration::from_secs(5),
                clock.clone(),
            );
            Self {
                dir: TempDir::new().unwrap(),
                clock,
                engine,
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn write_policy(&self, tier1_files: u32) {
            let yaml = format!(
                "version: 1\nrisk_tiers:\n  1: {{ max_files: {tier1_files}, max_loc: 250 }}\n  2: {{ max_files: 50, max_loc: 2000 }}\n  3: {{ max_files: 100, max_loc: 5000 }}\n"
            );
            let path = Layout::default().policy_path(self.root());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, yaml).unwrap();
        }

        fn write_waiver(
            &self,
            id: &str,
            status: &str,
            expires_at: DateTime<Utc>,
            approvers: &str,
            files: u32,
            loc: u32,
        ) {
            let yaml = format!(
                "id: {id}\ntitle: test waiver\nreason: testing\nstatus: {status}\ngates: [budget_limit]\nexpires_at: \"{}\"\napprovers: {approvers}\ndelta: {{ max_files: {files}, max_loc: {loc} }}\n",
                expires_at.to_rfc3339()
            );
            let path = Layout::default().waiver_path(self.root(), id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, yaml).unwrap();
        }

        fn active(&self, id: &str, files: u32, loc: u32) {
            self.write_waiver(
                id,
                "active",
                start() + ChronoDuration::days(30),
                "[lead@example.com]",
                files,
                loc,
            );
        }
    }

    // -- loading ------------------------------------------------------------

    #[test]
    fn default_policy_when_file_absent() {
        let fx = Fixture::new();
        let loaded = fx.engine.load_policy(fx.root()).unwrap();
        assert!(loaded.policy.is_default);
        assert!(!loaded.cache_hit);
        assert_eq!(
            loaded.policy.budget_for(RiskTier::Tier1),
            TierBudget::new(25, 1000)
        );
    }

    #[test]
    fn second_load_within_ttl_is_cache_hit() {
        let fx = Fixture::new();
        fx.write_policy(10);
        let first = fx.engine.load_policy(fx.root()).unwrap();
        assert!(!first.cache_hit);

        fx.clock.advance(ChronoDuration::seconds(2));
        let second = fx.engine.load_policy(fx.root()).unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.policy, first.policy);
    }

    #[test]
    fn edit_observed_after_ttl() {
        let fx = Fixture::new();
        fx.write_policy(10);
        fx.engine.load_policy(fx.root()).unwrap();

        fx.write_policy(12);
        let within = fx.engine.load_policy(fx.root()).unwrap();
        assert_eq!(within.policy.budget_for(RiskTier::Tier1).max_files, 10);

        fx.clock.advance(ChronoDuration::seconds(6));
        let after = fx.engine.load_policy(fx.root()).unwrap();
        assert!(!after.cache_hit);
        assert_eq!(after.policy.budget_for(RiskTier::Tier1).max_files, 12);
    }

    #[test]
    fn reload_bypasses_cache() {
        let fx = Fixture::new();
        fx.write_policy(10);
        fx.engine.load_policy(fx.root()).unwrap();
        fx.write_policy(15);

        let reloaded = fx.engine.reload_policy(fx.root()).unwrap();
        assert_eq!(reloaded.budget_for(RiskTier::Tier1).max_files, 15);

        let next = fx.engine.load_policy(fx.root()).unwrap();
        assert!(next.cache_hit);
        assert_eq!(next.policy.budget_for(RiskTier::Tier1).max_files, 15);
    }

    #[test]
    fn reload_failure_drops_cached_entry() {
        let fx = Fixture::new();
        fx.write_policy(10);
        fx.engine.load_policy(fx.root()).unwrap();
        std::fs::write(Layout::default().policy_path(fx.root()), "version: 1\n").unwrap();

        let err = fx.engine.reload_policy(fx.root()).unwrap_err();
        assert!(matches!(
            err,
            CawsError::Policy(PolicyError::MissingRiskTiers)
        ));
        assert!(fx.engine.cache().get(fx.root()).is_none());
    }

    #[test]
    fn invalid_policy_is_fatal() {
        let fx = Fixture::new();
        let path = Layout::default().policy_path(fx.root());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "version: 1\nrisk_tiers:\n  1: {max_files: 1, max_loc: 1}\n").unwrap();
        let err = fx.engine.load_policy(fx.root()).unwrap_err();
        assert_eq!(err.to_string(), "Policy missing risk tier 2");
    }

    // -- waivers ------------------------------------------------------------

    #[test]
    fn active_waiver_raises_budget() {
        let fx = Fixture::new();
        fx.active("WV-0001", 10, 500);
        let baseline = TierBudget::new(50, 2000);
        let res = fx.engine.apply_waivers(&baseline, &["WV-0001"], fx.root());
        assert_eq!(res.effective, TierBudget::new(60, 2500));
        assert_eq!(res.applied, vec!["WV-0001"]);
        assert!(res.skipped.is_empty());

        let check = check_budget(&res.effective, &ChangeMetrics::new(55, 2100));
        assert!(check.passed);
    }

    #[test]
    fn expired_waiver_leaves_baseline() {
        let fx = Fixture::new();
        fx.write_waiver(
            "WV-0002",
            "active",
            start() - ChronoDuration::days(1),
            "[lead@example.com]",
            10,
            500,
        );
        let baseline = TierBudget::new(50, 2000);
        let res = fx.engine.apply_waivers(&baseline, &["WV-0002"], fx.root());
        assert_eq!(res.effective, baseline);
        assert!(res.applied.is_empty());
        assert_eq!(
            res.skipped,
            vec![SkippedWaiver {
                id: "WV-0002".to_string(),
                reason: SkipReason::Expired,
            }]
        );
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let fx = Fixture::new();
        fx.write_waiver("WV-0003", "active", start(), "[a@example.com]", 1, 1);
        let baseline = TierBudget::new(1, 1);
        let res = fx.engine.apply_waivers(&baseline, &["WV-0003"], fx.root());
        assert_eq!(res.applied, vec!["WV-0003"]);

        fx.clock.advance(ChronoDuration::seconds(1));
        let res = fx.engine.apply_waivers(&baseline, &["WV-0003"], fx.root());
        assert!(res.applied.is_empty());
    }

    #[test]
    fn inactive_statuses_never_apply() {
        let fx = Fixture::new();
        let future = start() + ChronoDuration::days(5);
        fx.write_waiver("WV-0004", "revoked", future, "[a@example.com]", 1000, 1000);
        fx.write_waiver("WV-0005", "expired", future, "[a@example.com]", 1000, 1000);
        let baseline = TierBudget::new(5, 5);
        let res = fx
            .engine
            .apply_waivers(&baseline, &["WV-0004", "WV-0005"], fx.root());
        assert_eq!(res.effective, baseline);
        assert!(res.applied.is_empty());
        assert_eq!(res.skipped[0].reason, SkipReason::Inactive);
        assert_eq!(res.skipped[1].reason, SkipReason::Expired);
    }

    #[test]
    fn missing_and_malformed_degrade_silently() {
        let fx = Fixture::new();
        let path = Layout::default().waiver_path(fx.root(), "WV-0007");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "delta: [broken\n").unwrap();
        fx.active("WV-0008", 2, 20);

        let baseline = TierBudget::new(5, 50);
        let res = fx
            .engine
            .apply_waivers(&baseline, &["WV-0006", "WV-0007", "WV-0008"], fx.root());
        assert_eq!(res.effective, TierBudget::new(7, 70));
        assert_eq!(res.applied, vec!["WV-0008"]);
        let reasons: Vec<SkipReason> = res.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![SkipReason::Missing, SkipReason::Malformed]);
    }

    #[test]
    fn waiver_without_approvers_skipped() {
        let fx = Fixture::new();
        fx.write_waiver(
            "WV-0009",
            "active",
            start() + ChronoDuration::days(1),
            "[]",
            10,
            10,
        );
        let baseline = TierBudget::new(1, 1);
        let res = fx.engine.apply_waivers(&baseline, &["WV-0009"], fx.root());
        assert_eq!(res.effective, baseline);
        assert_eq!(res.skipped[0].reason, SkipReason::NoApprovers);
    }

    #[test]
    fn deltas_sum_in_encounter_order() {
        let fx = Fixture::new();
        fx.active("WV-0012", 1, 10);
        fx.active("WV-0010", 2, 20);
        fx.active("WV-0011", 3, 30);
        let baseline = TierBudget::new(100, 1000);
        let ids = ["WV-0012", "WV-0010", "WV-0011"];
        let res = fx.engine.apply_waivers(&baseline, &ids, fx.root());
        assert_eq!(res.effective, TierBudget::new(106, 1060));
        assert_eq!(res.applied, ids.to_vec());
    }

    #[test]
    fn duplicate_ids_apply_twice() {
        let fx = Fixture::new();
        fx.active("WV-0013", 4, 40);
        let baseline = TierBudget::new(10, 100);
        let res = fx
            .engine
            .apply_waivers(&baseline, &["WV-0013", "WV-0013"], fx.root());
        assert_eq!(res.effective, TierBudget::new(18, 180));
        assert_eq!(res.applied.len(), 2);
    }

    #[test]
    fn effective_never_below_baseline() {
        let fx = Fixture::new();
        fx.active("WV-0014", 0, 0);
        let baseline = TierBudget::new(10, 100);
        let ids: Vec<String> = vec!["WV-0014".into(), "nope".into(), "../x".into()];
        let res = fx.engine.apply_waivers(&baseline, ids.as_slice(), fx.root());
        assert!(res.effective.max_files >= baseline.max_files);
        assert!(res.effective.max_loc >= baseline.max_loc);
    }

    // -- evaluate -----------------------------------------------------------

    #[test]
    fn evaluate_builds_decision() {
        let fx = Fixture::new();
        fx.write_policy(10);
        fx.active("WV-0001", 10, 500);
        let decision = fx
            .engine
            .evaluate(
                fx.root(),
                RiskTier::Tier2,
                &["WV-0001", "WV-0404"],
                &ChangeMetrics::new(55, 2100),
            )
            .unwrap();
        assert!(decision.passed);
        assert!(!decision.policy_is_default);
        assert_eq!(decision.baseline, TierBudget::new(50, 2000));
        assert_eq!(decision.effective, TierBudget::new(60, 2500));
        assert_eq!(decision.applied, vec!["WV-0001"]);
        assert_eq!(decision.skipped.len(), 1);
        assert_eq!(decision.evaluated_at, start());

        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["tier"], 2);
        assert_eq!(json["skipped"][0]["reason"], "missing");
    }

    #[test]
    fn evaluate_reports_overage() {
        let fx = Fixture::new();
        let decision = fx
            .engine
            .evaluate::<&str>(fx.root(), RiskTier::Tier1, &[], &ChangeMetrics::new(30, 1200))
            .unwrap();
        assert!(!decision.passed);
        assert!(decision.policy_is_default);
        assert_eq!(decision.detail, "files: 30 > 25 (+5); loc: 1200 > 1000 (+200)");
    }
}
