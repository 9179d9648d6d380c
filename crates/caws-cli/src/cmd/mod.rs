pub mod budget;
pub mod config;
pub mod init;
pub mod policy;
pub mod waiver;

use anyhow::Context;
use caws_core::config::{Config, WarnLevel};
use caws_core::PolicyEngine;
use std::path::Path;

/// Project config plus an engine laid out according to it.
pub(crate) fn engine_for(root: &Path) -> anyhow::Result<(Config, PolicyEngine)> {
    let config = Config::load(root).context("failed to load .caws/config.yaml")?;
    if let Some(err) = config
        .validate()
        .into_iter()
        .find(|w| w.level == WarnLevel::Error)
    {
        anyhow::bail!("invalid .caws/config.yaml: {}", err.message);
    }
    let engine = PolicyEngine::from_config(&config);
    Ok((config, engine))
}
