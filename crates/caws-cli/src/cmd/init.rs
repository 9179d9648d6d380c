use crate::output::print_json;
use anyhow::Context;
use caws_core::config::Config;
use caws_core::io;
use caws_core::paths;
use caws_core::policy::Policy;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    io::ensure_dir(&paths::caws_dir(root)).context("failed to create .caws/")?;

    let config_written = if paths::config_path(root).exists() {
        false
    } else {
        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();
        Config::new(name)
            .save(root)
            .context("failed to write .caws/config.yaml")?;
        true
    };

    let config = Config::load(root).context("failed to load .caws/config.yaml")?;
    let layout = config.layout();

    let policy_yaml = Policy::default_policy().to_yaml()?;
    let policy_path = layout.policy_path(root);
    let policy_written = io::write_if_missing(&policy_path, policy_yaml.as_bytes())
        .with_context(|| format!("failed to write {}", policy_path.display()))?;

    let waivers_dir = layout.waivers_dir(root);
    io::ensure_dir(&waivers_dir)
        .with_context(|| format!("failed to create {}", waivers_dir.display()))?;

    if json {
        let value = serde_json::json!({
            "root": root,
            "config_written": config_written,
            "policy_written": policy_written,
            "policy_path": policy_path,
            "waivers_dir": waivers_dir,
        });
        print_json(&value)?;
        return Ok(());
    }

    let mark = |written: bool| if written { "created" } else { "exists " };
    println!("{}  {}", mark(config_written), paths::config_path(root).display());
    println!("{}  {}", mark(policy_written), policy_path.display());
    println!("ready    {}", waivers_dir.display());
    Ok(())
}
