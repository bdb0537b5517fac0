//! Apply mods to a running process.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use icepick_core::patch::{AliasPolicy, PatchOptions, run_all};
use icepick_core::{Mod, ProcessInspector, ProcessMemory, ToolhelpInspector};
use tracing::{info, warn};

use crate::PatchArgs;
use crate::console;

pub fn run(args: PatchArgs) -> Result<()> {
    let mods = load_mods(&args.mods)?;
    let pid = match (args.pid, args.process) {
        (Some(pid), _) => pid,
        (None, Some(name)) => find_pid(&name)?,
        (None, None) => bail!("Either --pid or --process is required"),
    };

    let options = PatchOptions {
        alias_policy: if args.reject_ambiguous {
            AliasPolicy::RejectAmbiguous
        } else {
            AliasPolicy::FirstMatch
        },
    };
    apply_mods(pid, &mods, options)
}

pub fn load_mods(dirs: &[PathBuf]) -> Result<Vec<Mod>> {
    dirs.iter()
        .map(|dir| {
            Mod::load(dir).with_context(|| format!("Failed to load mod from {}", dir.display()))
        })
        .collect()
}

fn find_pid(name: &str) -> Result<u32> {
    let matches = ToolhelpInspector
        .processes_named(name)
        .context("Failed to enumerate processes")?;
    match matches.as_slice() {
        [] => bail!("No running process named {}", name),
        [only] => Ok(only.pid),
        [first, ..] => {
            warn!(
                "{} processes named {}, using pid {}",
                matches.len(),
                name,
                first.pid
            );
            Ok(first.pid)
        }
    }
}

/// Patch every mod into `pid`. Fails if any file could not be patched.
pub fn apply_mods(pid: u32, mods: &[Mod], options: PatchOptions) -> Result<()> {
    if mods.is_empty() {
        return Ok(());
    }

    let memory = ProcessMemory::open(pid)
        .with_context(|| format!("Failed to open process {}", pid))?;
    info!("Patching {} mod(s) into process {}", mods.len(), memory.pid());

    let mut failed = 0;
    for module in mods {
        let report = run_all(module, &memory, options);
        console::print_report(module, &report);
        failed += report.failed().count();
    }

    if failed > 0 {
        bail!("{} file(s) could not be patched", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_load_mods_reports_directory() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("mod.json"), r#"{ "name": "Good" }"#).unwrap();

        let mods = load_mods(std::slice::from_ref(&good)).unwrap();
        assert_eq!(mods[0].name(), "Good");

        let missing = dir.path().join("missing");
        let err = load_mods(&[good.clone(), missing]).unwrap_err();
        assert!(format!("{:#}", err).contains("missing"));

        let loaded = load_mods(&[good.clone(), good]).unwrap();
        assert_eq!(format!("{:?}", loaded).matches("Mod {").count(), 2);
    }

    #[test]
    fn test_no_mods_is_noop() {
        apply_mods(1, &[], PatchOptions::default()).unwrap();
    }
}
