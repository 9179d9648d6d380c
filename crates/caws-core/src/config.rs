use crate::cache::DEFAULT_TTL;
use crate::error::Result;
use crate::paths::{self, Layout, DEFAULT_POLICY_FILE, DEFAULT_WAIVERS_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PolicySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Policy filename inside `.caws/`.
    #[serde(default = "default_policy_file")]
    pub file: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_policy_file() -> String {
    DEFAULT_POLICY_FILE.to_string()
}

fn default_cache_ttl() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            file: default_policy_file(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

// ---------------------------------------------------------------------------
// WaiverSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaiverSettings {
    /// Waiver directory inside `.caws/`.
    #[serde(default = "default_waivers_dir")]
    pub dir: String,
}

fn default_waivers_dir() -> String {
    DEFAULT_WAIVERS_DIR.to_string()
}

impl Default for WaiverSettings {
    fn default() -> Self {
        Self {
            dir: default_waivers_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default)]
    pub waivers: WaiverSettings,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            project: ProjectConfig::default(),
            policy: PolicySettings::default(),
            waivers: WaiverSettings::default(),
        }
    }
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig {
                name: project_name.into(),
            },
            ..Self::default()
        }
    }

    /// Load `.caws/config.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn layout(&self) -> Layout {
        Layout {
            policy_file: self.policy.file.clone(),
            waivers_dir: self.waivers.dir.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.policy.cache_ttl_seconds)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !is_contained(&self.policy.file) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "policy.file '{}' must be a relative path inside .caws/",
                    self.policy.file
                ),
            });
        }

        if !is_contained(&self.waivers.dir) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "waivers.dir '{}' must be a relative path inside .caws/",
                    self.waivers.dir
                ),
            });
        }

        if self.policy.cache_ttl_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "policy.cache_ttl_seconds is 0; every load reads from disk".to_string(),
            });
        } else if self.policy.cache_ttl_seconds > 300 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "policy.cache_ttl_seconds={} (>300 delays pickup of policy edits)",
                    self.policy.cache_ttl_seconds
                ),
            });
        }

        warnings
    }
}

fn is_contained(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
