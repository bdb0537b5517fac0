use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::memory::MemoryProvider;
use crate::mods::Mod;
use crate::patch::{PatchOperation, PatchOptions};

/// Outcome of one descriptor in a patch set run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub replacement_file: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-descriptor outcomes of a patch set run, in descriptor order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub results: Vec<PatchResult>,
}

impl PatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &PatchResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Run every descriptor of `module` against `memory` in parallel.
///
/// Descriptors are independent: a failure is logged and recorded, and the
/// rest of the set still runs. No ordering is guaranteed between them.
pub fn run_all<M: MemoryProvider>(module: &Mod, memory: &M, options: PatchOptions) -> PatchReport {
    info!("Writing {} files to memory...", module.name());
    let operation = PatchOperation::with_options(memory, options);

    let results = module
        .descriptors()
        .par_iter()
        .map(|descriptor| {
            let result = operation.try_run(descriptor, module.base_dir());
            if let Err(e) = &result {
                warn!("Failed to write mod file into memory: {} ({})", descriptor, e);
            }
            PatchResult {
                replacement_file: descriptor.replacement_file().to_path_buf(),
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            }
        })
        .collect();

    let report = PatchReport { results };
    info!(
        "{}: {}/{} files written",
        module.name(),
        report.succeeded(),
        report.results.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::memory::{ForeignAddress, MockMemoryBuilder, decode_pointer};
    use crate::mods::{ModDefinition, ModStatus, PatchDefinition};

    fn definition(files: Vec<PatchDefinition>) -> ModDefinition {
        ModDefinition {
            name: "Test Mod".to_string(),
            files,
            ..Default::default()
        }
    }

    fn file(signature: &str, replacement: &str) -> PatchDefinition {
        PatchDefinition {
            signature: signature.to_string(),
            replacement: replacement.into(),
            address_offset: 0,
        }
    }

    #[test]
    fn test_failure_does_not_stop_other_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.nut", "b.nut", "c.nut"] {
            fs::write(dir.path().join(name), format!("// {}", name)).unwrap();
        }

        // Two resources with one pointer each; the third signature is absent
        let memory = MockMemoryBuilder::new()
            .region_with(
                0x1000_0000,
                0x1000,
                &[(0x1000_0100, b"ScriptA"), (0x1000_0200, b"ScriptB")],
            )
            .region_with(
                0x2000_0000,
                0x100,
                &[
                    (0x2000_0010, &0x1000_0100u64.to_le_bytes()),
                    (0x2000_0020, &0x1000_0200u64.to_le_bytes()),
                ],
            )
            .build();

        let module = Mod::from_definition(
            dir.path(),
            definition(vec![
                file("ScriptA", "a.nut"),
                file("ScriptB", "b.nut"),
                file("ScriptC", "c.nut"),
            ]),
        )
        .unwrap();
        assert_eq!(module.status(), ModStatus::Pending);

        let report = run_all(&module, &memory, PatchOptions::default());

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.succeeded(), 2);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].replacement_file, PathBuf::from("c.nut"));
        assert!(failed[0].error.as_deref().unwrap().contains("existing"));
        assert_eq!(
            module.status(),
            ModStatus::Failed {
                failed: 1,
                total: 3
            }
        );

        for (pointer, descriptor) in [0x2000_0010u64, 0x2000_0020].iter().zip(module.descriptors()) {
            let bytes = memory.read(ForeignAddress::new(*pointer).unwrap(), 8).unwrap();
            let redirect = descriptor.last_redirect().unwrap();
            assert_eq!(decode_pointer(&bytes), Some(redirect.replacement.get()));
        }
    }

    #[test]
    fn test_descriptor_in_flight_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.nut"), "// a").unwrap();
        let memory = MockMemoryBuilder::new()
            .region_with(0x1000_0000, 0x100, &[(0x1000_0010, b"ScriptA")])
            .region_with(0x2000_0000, 0x100, &[(0x2000_0010, &0x1000_0010u64.to_le_bytes())])
            .build();
        let module =
            Mod::from_definition(dir.path(), definition(vec![file("ScriptA", "a.nut")])).unwrap();

        let guard = module.descriptors()[0].begin_run();
        assert!(guard.is_some());
        let report = run_all(&module, &memory, PatchOptions::default());

        assert!(!report.all_succeeded());
        let error = report.results[0].error.as_deref().unwrap();
        assert!(error.contains("already being written"));
        // The in-flight run owns the status
        assert_eq!(module.status(), ModStatus::Pending);

        drop(guard);
        assert!(run_all(&module, &memory, PatchOptions::default()).all_succeeded());
    }

    #[test]
    fn test_empty_mod_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let module = Mod::from_definition(dir.path(), definition(Vec::new())).unwrap();
        let memory = MockMemoryBuilder::new().build();

        let report = run_all(&module, &memory, PatchOptions::default());
        assert!(report.results.is_empty());
        assert!(report.all_succeeded());
    }
}
