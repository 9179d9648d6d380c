use crate::git;
use crate::output::{format_budget, print_json};
use anyhow::Context;
use caws_core::budget::{check_dual_control, DualControlCheck};
use caws_core::change::ChangeMetrics;
use caws_core::types::RiskTier;
use caws_core::working_spec::WorkingSpec;
use caws_core::BudgetDecision;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum BudgetSubcommand {
    /// Check a change against the effective budget (exit 1 when over)
    Check {
        /// Risk tier (1-3); defaults to the working spec's risk_tier
        #[arg(long)]
        tier: Option<RiskTier>,
        /// Waiver id to apply (repeatable); added to the working spec's waiver_ids
        #[arg(long = "waiver")]
        waivers: Vec<String>,
        /// Working spec to read tier and waiver_ids from
        #[arg(long)]
        spec: Option<PathBuf>,
        /// Files touched (skips git)
        #[arg(long, requires = "loc")]
        files: Option<u32>,
        /// Lines changed (skips git)
        #[arg(long, requires = "files")]
        loc: Option<u32>,
        /// Git ref to diff the working tree against
        #[arg(long, default_value = "HEAD", conflicts_with = "files")]
        base: String,
    },
}

pub fn run(root: &Path, subcmd: BudgetSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        BudgetSubcommand::Check {
            tier,
            waivers,
            spec,
            files,
            loc,
            base,
        } => check(root, tier, waivers, spec, files.zip(loc), &base, json),
    }
}

fn check(
    root: &Path,
    tier: Option<RiskTier>,
    mut waiver_ids: Vec<String>,
    spec_path: Option<PathBuf>,
    counts: Option<(u32, u32)>,
    base: &str,
    json: bool,
) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;

    let spec = load_spec(root, spec_path.as_deref())?;
    if let Some(spec) = &spec {
        waiver_ids.extend(spec.waiver_ids.iter().cloned());
    }
    let tier = match (tier, &spec) {
        (Some(t), _) => t,
        (None, Some(s)) => s.risk_tier,
        (None, None) => anyhow::bail!("no --tier given and no working spec found"),
    };

    let (actual, dual_control) = match counts {
        Some((files, loc)) => (ChangeMetrics::new(files, loc), None),
        None => {
            let changes = git::collect_changes(root, base)?;
            let policy = engine.load_policy(root).context("failed to load policy")?.policy;
            let dual = check_dual_control(
                &policy.edit_rules,
                &changes,
                &engine.layout().policy_rel_path(),
            );
            (changes.metrics(), Some(dual))
        }
    };

    let decision = engine
        .evaluate(root, tier, waiver_ids.as_slice(), &actual)
        .context("failed to evaluate budget")?;
    tracing::info!(
        tier = %decision.tier,
        passed = decision.passed,
        applied = ?decision.applied,
        "budget evaluated"
    );

    if decision.policy_is_default {
        eprintln!("warning: no policy file found; using default budgets");
    }

    if json {
        let value = serde_json::json!({
            "decision": decision,
            "dual_control": dual_control,
        });
        print_json(&value)?;
    } else {
        print_decision(&decision, dual_control.as_ref());
    }

    if !decision.passed {
        anyhow::bail!("budget exceeded: {}", decision.detail);
    }
    if let Some(dual) = dual_control.filter(|d| !d.passed) {
        anyhow::bail!("dual control violated: {}", dual.detail);
    }
    Ok(())
}

/// An explicit `--spec` must exist; the default location is optional.
fn load_spec(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Option<WorkingSpec>> {
    if let Some(path) = explicit {
        let spec = WorkingSpec::load_from(path)
            .with_context(|| format!("failed to read working spec {}", path.display()))?;
        return Ok(Some(spec));
    }
    match WorkingSpec::load(root) {
        Ok(spec) => Ok(Some(spec)),
        Err(caws_core::CawsError::WorkingSpecNotFound(_)) => Ok(None),
        Err(e) => Err(e).context("failed to read working spec"),
    }
}

fn print_decision(decision: &BudgetDecision, dual: Option<&DualControlCheck>) {
    let verdict = if decision.passed { "PASS" } else { "FAIL" };
    println!("Budget gate: {verdict} (tier {})", decision.tier);
    println!("  baseline:  {}", format_budget(&decision.baseline));
    println!("  effective: {}", format_budget(&decision.effective));
    if !decision.applied.is_empty() {
        println!("  applied:   {}", decision.applied.join(", "));
    }
    for s in &decision.skipped {
        println!("  skipped:   {} ({})", s.id, s.reason);
    }
    println!(
        "  actual:    {} files / {} loc",
        decision.actual.files, decision.actual.loc
    );
    println!("  {}", decision.detail);
    if let Some(dual) = dual {
        let verdict = if dual.passed { "ok" } else { "FAIL" };
        println!("  dual control: {verdict} ({})", dual.detail);
    }
}
