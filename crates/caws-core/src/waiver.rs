//! Waiver store — time-bound, approved budget exceptions.
//!
//! Layout:
//!   .caws/waivers/<id>.yaml   — one document per waiver
//!
//! Reads used by budget resolution never fail: a missing or unreadable
//! waiver simply does not apply. Authoring (`create`, `revoke`) is strict.

use crate::error::{CawsError, Result};
use crate::io;
use crate::paths::{self, Layout};
use crate::types::BudgetDelta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BUDGET_LIMIT_GATE: &str = "budget_limit";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverStatus {
    Active,
    Revoked,
    Expired,
}

impl std::fmt::Display for WaiverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaiverStatus::Active => "active",
            WaiverStatus::Revoked => "revoked",
            WaiverStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Effective lifecycle state at a point in time. A waiver whose status is
/// still `active` is reported as `Expired` once `expires_at` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiverState {
    Active,
    Expired,
    Revoked,
}

impl std::fmt::Display for WaiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaiverState::Active => "active",
            WaiverState::Expired => "expired",
            WaiverState::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waiver {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub reason: String,
    pub status: WaiverStatus,
    #[serde(default)]
    pub gates: Vec<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub delta: BudgetDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Waiver {
    pub fn state(&self, now: DateTime<Utc>) -> WaiverState {
        match self.status {
            WaiverStatus::Revoked => WaiverState::Revoked,
            WaiverStatus::Expired => WaiverState::Expired,
            WaiverStatus::Active if now > self.expires_at => WaiverState::Expired,
            WaiverStatus::Active => WaiverState::Active,
        }
    }

    pub fn covers_gate(&self, gate: &str) -> bool {
        self.gates.iter().any(|g| g == gate)
    }
}

/// Outcome of resolving a waiver id against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WaiverLookup {
    Found(Box<Waiver>),
    Missing,
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Resolve `id`, telling a missing file apart from an unreadable one.
pub fn lookup_waiver(root: &Path, layout: &Layout, id: &str) -> WaiverLookup {
    if !paths::is_safe_file_stem(id) {
        return WaiverLookup::Missing;
    }
    let path = layout.waiver_path(root, id);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return WaiverLookup::Missing,
        Err(e) => return WaiverLookup::Malformed(e.to_string()),
    };
    match serde_yaml::from_str::<Waiver>(&data) {
        Ok(waiver) => WaiverLookup::Found(Box::new(waiver)),
        Err(e) => WaiverLookup::Malformed(e.to_string()),
    }
}

/// `None` for both missing and malformed waivers.
pub fn get_waiver(root: &Path, layout: &Layout, id: &str) -> Option<Waiver> {
    match lookup_waiver(root, layout, id) {
        WaiverLookup::Found(w) => Some(*w),
        WaiverLookup::Missing | WaiverLookup::Malformed(_) => None,
    }
}

/// Strict load for authoring commands.
pub fn load(root: &Path, layout: &Layout, id: &str) -> Result<Waiver> {
    paths::validate_waiver_id(id)?;
    let path = layout.waiver_path(root, id);
    if !path.exists() {
        return Err(CawsError::WaiverNotFound(id.to_string()));
    }
    let data = std::fs::read_to_string(&path)?;
    Ok(serde_yaml::from_str(&data)?)
}

/// All readable waivers, sorted by id. Unreadable files are skipped.
pub fn list(root: &Path, layout: &Layout) -> Result<Vec<Waiver>> {
    let dir = layout.waivers_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut waivers = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(paths::WAIVER_EXT) {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match lookup_waiver(root, layout, id) {
            WaiverLookup::Found(w) => waivers.push(*w),
            WaiverLookup::Malformed(reason) => {
                tracing::warn!(waiver = id, %reason, "skipping malformed waiver file");
            }
            WaiverLookup::Missing => {}
        }
    }
    waivers.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(waivers)
}

// ---------------------------------------------------------------------------
// Authoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewWaiver {
    pub id: String,
    pub title: String,
    pub reason: String,
    pub gates: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub approvers: Vec<String>,
    pub delta: BudgetDelta,
}

impl NewWaiver {
    /// First governance violation, if any.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        paths::validate_waiver_id(&self.id)?;
        if self.title.trim().is_empty() {
            return Err(CawsError::InvalidWaiver("title must not be empty".into()));
        }
        if self.reason.trim().is_empty() {
            return Err(CawsError::InvalidWaiver("reason must not be empty".into()));
        }
        if self.gates.iter().all(|g| g.trim().is_empty()) {
            return Err(CawsError::InvalidWaiver(
                "at least one gate is required".into(),
            ));
        }
        if self.approvers.iter().all(|a| a.trim().is_empty()) {
            return Err(CawsError::InvalidWaiver(
                "at least one approver is required".into(),
            ));
        }
        if self.expires_at <= now {
            return Err(CawsError::InvalidWaiver(format!(
                "expires_at {} is not in the future",
                self.expires_at.to_rfc3339()
            )));
        }
        Ok(())
    }
}

/// Validate and persist a new waiver. Refuses to overwrite an existing file.
pub fn create(root: &Path, layout: &Layout, new: NewWaiver, now: DateTime<Utc>) -> Result<Waiver> {
    new.validate(now)?;
    let path = layout.waiver_path(root, &new.id);
    if path.exists() {
        return Err(CawsError::WaiverExists(new.id));
    }
    let waiver = Waiver {
        id: new.id,
        title: new.title.trim().to_string(),
        reason: new.reason.trim().to_string(),
        status: WaiverStatus::Active,
        gates: clean_list(new.gates),
        expires_at: new.expires_at,
        approvers: clean_list(new.approvers),
        delta: new.delta,
        created_at: Some(now),
        revoked_at: None,
    };
    save(root, layout, &waiver)?;
    Ok(waiver)
}

/// Mark a waiver revoked. Revocation is permanent.
pub fn revoke(root: &Path, layout: &Layout, id: &str, now: DateTime<Utc>) -> Result<Waiver> {
    let mut waiver = load(root, layout, id)?;
    if waiver.status != WaiverStatus::Revoked {
        waiver.status = WaiverStatus::Revoked;
        waiver.revoked_at = Some(now);
        save(root, layout, &waiver)?;
    }
    Ok(waiver)
}

fn save(root: &Path, layout: &Layout, waiver: &Waiver) -> Result<()> {
    let data = serde_yaml::to_string(waiver)?;
    io::atomic_write(&layout.waiver_path(root, &waiver.id), data.as_bytes())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
