use crate::output::{print_json, print_table};
use anyhow::Context;
use caws_core::types::BudgetDelta;
use caws_core::waiver::{self, NewWaiver, BUDGET_LIMIT_GATE};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum WaiverSubcommand {
    /// Create a new active waiver
    Create {
        /// Waiver id (WV-0001 style)
        id: String,
        #[arg(long)]
        title: String,
        /// Justification (e.g. architectural_refactor)
        #[arg(long)]
        reason: String,
        /// Gate this waiver applies to (repeatable)
        #[arg(long = "gate", default_value = BUDGET_LIMIT_GATE)]
        gates: Vec<String>,
        /// Approver identity (repeatable, at least one)
        #[arg(long = "approver", required = true)]
        approvers: Vec<String>,
        /// Expiry timestamp (RFC 3339)
        #[arg(long, conflicts_with = "days")]
        expires_at: Option<DateTime<Utc>>,
        /// Expire this many days from now
        #[arg(long)]
        days: Option<u32>,
        /// Extra files allowed
        #[arg(long, default_value = "0")]
        delta_files: u32,
        /// Extra lines allowed
        #[arg(long, default_value = "0")]
        delta_loc: u32,
    },

    /// List waivers with their current state
    List,

    /// Show one waiver
    Show { id: String },

    /// Revoke a waiver
    Revoke { id: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: WaiverSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WaiverSubcommand::Create {
            id,
            title,
            reason,
            gates,
            approvers,
            expires_at,
            days,
            delta_files,
            delta_loc,
        } => {
            let now = Utc::now();
            let expires_at = match (expires_at, days) {
                (Some(at), _) => at,
                (None, Some(days)) => Duration::try_days(i64::from(days))
                    .and_then(|d| now.checked_add_signed(d))
                    .with_context(|| format!("--days {days} is out of range"))?,
                (None, None) => anyhow::bail!("one of --expires-at or --days is required"),
            };
            let new = NewWaiver {
                id,
                title,
                reason,
                gates,
                expires_at,
                approvers,
                delta: BudgetDelta {
                    max_files: delta_files,
                    max_loc: delta_loc,
                },
            };
            create(root, new, now, json)
        }
        WaiverSubcommand::List => list(root, json),
        WaiverSubcommand::Show { id } => show(root, &id, json),
        WaiverSubcommand::Revoke { id } => revoke(root, &id, json),
    }
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

fn create(root: &Path, new: NewWaiver, now: DateTime<Utc>, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let id = new.id.clone();
    let waiver = waiver::create(root, engine.layout(), new, now)
        .with_context(|| format!("failed to create waiver {id}"))?;

    if waiver.covers_gate(BUDGET_LIMIT_GATE) && waiver.delta.is_zero() {
        eprintln!(
            "warning: waiver {} targets {BUDGET_LIMIT_GATE} but grants no extra budget",
            waiver.id
        );
    }

    if json {
        print_json(&waiver)?;
    } else {
        println!(
            "Created waiver {} (+{} files, +{} loc) expiring {}",
            waiver.id,
            waiver.delta.max_files,
            waiver.delta.max_loc,
            waiver.expires_at.to_rfc3339()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let now = engine.now();
    let waivers = waiver::list(root, engine.layout()).context("failed to list waivers")?;

    if json {
        let items: Vec<serde_json::Value> = waivers
            .iter()
            .map(|w| {
                serde_json::json!({
                    "id": w.id,
                    "title": w.title,
                    "state": w.state(now),
                    "expires_at": w.expires_at,
                    "gates": w.gates,
                    "delta": w.delta,
                })
            })
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    if waivers.is_empty() {
        println!("No waivers.");
        return Ok(());
    }

    let rows = waivers
        .iter()
        .map(|w| {
            vec![
                w.id.clone(),
                w.state(now).to_string(),
                w.expires_at.format("%Y-%m-%d").to_string(),
                format!("+{}/+{}", w.delta.max_files, w.delta.max_loc),
                w.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATE", "EXPIRES", "FILES/LOC", "TITLE"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let w = waiver::load(root, engine.layout(), id).context("failed to load waiver")?;
    let state = w.state(engine.now());

    if json {
        let value = serde_json::json!({
            "waiver": w,
            "state": state,
        });
        print_json(&value)?;
        return Ok(());
    }

    println!("{}: {}", w.id, w.title);
    println!("  state:     {state} (status: {})", w.status);
    println!("  reason:    {}", w.reason);
    println!("  gates:     {}", w.gates.join(", "));
    println!("  approvers: {}", w.approvers.join(", "));
    println!("  expires:   {}", w.expires_at.to_rfc3339());
    println!(
        "  delta:     +{} files, +{} loc",
        w.delta.max_files, w.delta.max_loc
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// revoke
// ---------------------------------------------------------------------------

fn revoke(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, engine) = super::engine_for(root)?;
    let w = waiver::revoke(root, engine.layout(), id, engine.now())
        .with_context(|| format!("failed to revoke waiver {id}"))?;
    if json {
        print_json(&w)?;
    } else {
        println!("Revoked waiver {}", w.id);
    }
    Ok(())
}
