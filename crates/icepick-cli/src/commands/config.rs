use std::path::Path;

use anyhow::{Context, Result};
use icepick_core::InjectorConfig;

/// Print the effective configuration, persisting `developer_mode` first if
/// given.
pub fn run(mut config: InjectorConfig, path: &Path, developer_mode: Option<bool>) -> Result<()> {
    if let Some(enabled) = developer_mode {
        config.developer_mode = enabled;
        config
            .save(path)
            .with_context(|| format!("Failed to save config to {}", path.display()))?;
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
    Ok(())
}
