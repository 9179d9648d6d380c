use crate::output::{format_budget, print_json, print_table};
use anyhow::Context;
use caws_core::types::RiskTier;
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// Show the tier budgets in effect
    Show,

    /// Parse and validate the policy file
    Validate,

    /// Print the resolved policy file path
    Path,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PolicySubcommand::Show => show(root, json),
        PolicySubcommand::Validate => validate(root, json),
        PolicySubcommand::Path => path(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let policy = engine
        .load_policy(root)
        .context("failed to load policy")?
        .policy;

    if json {
        let value = serde_json::json!({
            "is_default": policy.is_default,
            "policy": policy,
        });
        print_json(&value)?;
        return Ok(());
    }

    if policy.is_default {
        println!("No policy file found; using the built-in default.");
    }
    println!("Policy version {}", policy.version);
    let rows = RiskTier::ALL
        .iter()
        .map(|&tier| {
            let budget = policy.budget_for(tier);
            vec![
                tier.to_string(),
                budget.max_files.to_string(),
                budget.max_loc.to_string(),
            ]
        })
        .collect();
    print_table(&["TIER", "MAX FILES", "MAX LOC"], rows);
    println!(
        "policy_and_code_same_pr: {}",
        policy.edit_rules.policy_and_code_same_pr
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let policy_path = engine.layout().policy_path(root);
    let policy = engine
        .reload_policy(root)
        .with_context(|| format!("invalid policy {}", policy_path.display()))?;

    if json {
        let value = serde_json::json!({
            "valid": true,
            "is_default": policy.is_default,
            "path": policy_path,
        });
        print_json(&value)?;
    } else if policy.is_default {
        println!(
            "No policy file at {}; the built-in default applies.",
            policy_path.display()
        );
    } else {
        println!("Policy is valid.");
        for (tier, budget) in policy.risk_tiers.iter() {
            println!("  tier {tier}: {}", format_budget(&budget));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// path
// ---------------------------------------------------------------------------

fn path(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let policy_path = engine.layout().policy_path(root);
    if json {
        print_json(&serde_json::json!({
            "path": policy_path,
            "exists": policy_path.exists(),
        }))?;
    } else {
        println!("{}", policy_path.display());
    }
    Ok(())
}
