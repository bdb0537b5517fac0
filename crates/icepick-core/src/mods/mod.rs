//! Mods: a set of script replacements plus identity metadata.

mod definition;

pub use definition::*;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::patch::PatchDescriptor;

/// Aggregate state of a mod's descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModStatus {
    /// At least one descriptor has not finished a run.
    Pending,
    Ok,
    Failed { failed: usize, total: usize },
}

/// A loaded mod. Owns its descriptors; they are dropped with it.
pub struct Mod {
    base_dir: PathBuf,
    name: String,
    description: String,
    version: String,
    authors: Vec<String>,
    contacts: Vec<String>,
    descriptors: Vec<PatchDescriptor>,
}

impl Mod {
    /// Load the mod whose `mod.json` lives in `dir`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let definition = load_definition(dir.join(DEFINITION_FILE))?;
        Self::from_definition(dir, definition)
    }

    /// Build a mod rooted at `base_dir`.
    ///
    /// A signature may appear only once: two entries for the same resource
    /// would race to rewrite the same pointer.
    pub fn from_definition<P: Into<PathBuf>>(base_dir: P, definition: ModDefinition) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(definition.files.len());

        for file in &definition.files {
            if !seen.insert(file.signature.as_str()) {
                return Err(Error::InvalidModDefinition(format!(
                    "signature {:?} is listed more than once ({})",
                    file.signature,
                    file.replacement.display()
                )));
            }
            descriptors.push(PatchDescriptor::new(
                &file.signature,
                file.replacement.clone(),
                file.address_offset,
            )?);
        }

        debug!(
            "Loaded mod {:?} from {} ({} files)",
            definition.name,
            base_dir.display(),
            descriptors.len()
        );

        Ok(Self {
            base_dir,
            name: definition.name,
            description: definition.description,
            version: definition.version,
            authors: definition.authors,
            contacts: definition.contacts,
            descriptors,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    pub fn descriptors(&self) -> &[PatchDescriptor] {
        &self.descriptors
    }

    pub fn status(&self) -> ModStatus {
        let mut failed = 0;
        for descriptor in &self.descriptors {
            match descriptor.status().success() {
                None => return ModStatus::Pending,
                Some(false) => failed += 1,
                Some(true) => {}
            }
        }

        if failed == 0 {
            ModStatus::Ok
        } else {
            ModStatus::Failed {
                failed,
                total: self.descriptors.len(),
            }
        }
    }
}

impl fmt::Display for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Mod {}]", self.base_dir.display())
    }
}

impl fmt::Debug for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mod")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("base_dir", &self.base_dir)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}
