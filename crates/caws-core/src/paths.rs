use crate::error::{CawsError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CAWS_DIR: &str = ".caws";
pub const CONFIG_FILE: &str = ".caws/config.yaml";
pub const WORKING_SPEC_FILE: &str = ".caws/working-spec.yaml";

pub const DEFAULT_POLICY_FILE: &str = "policy.yaml";
pub const DEFAULT_WAIVERS_DIR: &str = "waivers";
pub const WAIVER_EXT: &str = "yaml";

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where the policy file and waiver directory live, relative to `.caws/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub policy_file: String,
    pub waivers_dir: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            policy_file: DEFAULT_POLICY_FILE.to_string(),
            waivers_dir: DEFAULT_WAIVERS_DIR.to_string(),
        }
    }
}

impl Layout {
    pub fn policy_path(&self, root: &Path) -> PathBuf {
        caws_dir(root).join(&self.policy_file)
    }

    /// Policy path relative to the project root, as it appears in a diff.
    pub fn policy_rel_path(&self) -> PathBuf {
        Path::new(CAWS_DIR).join(&self.policy_file)
    }

    pub fn waivers_dir(&self, root: &Path) -> PathBuf {
        caws_dir(root).join(&self.waivers_dir)
    }

    pub fn waiver_path(&self, root: &Path, id: &str) -> PathBuf {
        self.waivers_dir(root).join(format!("{id}.{WAIVER_EXT}"))
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn caws_dir(root: &Path) -> PathBuf {
    root.join(CAWS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn working_spec_path(root: &Path) -> PathBuf {
    root.join(WORKING_SPEC_FILE)
}

// ---------------------------------------------------------------------------
// Waiver id validation
// ---------------------------------------------------------------------------

static WAIVER_ID_RE: OnceLock<Regex> = OnceLock::new();

fn waiver_id_re() -> &'static Regex {
    WAIVER_ID_RE.get_or_init(|| Regex::new(r"^WV-[0-9]{4,}$").unwrap())
}

/// Strict id check applied when authoring a waiver.
pub fn validate_waiver_id(id: &str) -> Result<()> {
    if !waiver_id_re().is_match(id) {
        return Err(CawsError::InvalidWaiverId(id.to_string()));
    }
    Ok(())
}

/// Loose check applied when resolving a referenced id: anything that stays a
/// single file name inside the waivers directory.
pub fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
