//! Pointer-redirect patch for a single resource.
//!
//! The existing resource is located by its signature, then the stored
//! pointer that references it. The replacement bytes are copied into a
//! fresh allocation inside the target and the pointer is rewritten to that
//! allocation, so the original (possibly fixed-size or read-only) resource
//! is left untouched.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memory::{
    ForeignAddress, MemoryProvider, encode_pointer_with_width, format_bytes,
};
use crate::patch::{PatchDescriptor, PatchState, PatchStatus, Redirect};

/// What to do when more than one stored pointer references the resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPolicy {
    /// Rewrite the lowest matching location.
    #[default]
    FirstMatch,
    /// Fail the operation instead of guessing.
    RejectAmbiguous,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    pub alias_policy: AliasPolicy,
}

pub struct PatchOperation<'a, M: MemoryProvider> {
    memory: &'a M,
    options: PatchOptions,
}

impl<'a, M: MemoryProvider> PatchOperation<'a, M> {
    pub fn new(memory: &'a M) -> Self {
        Self::with_options(memory, PatchOptions::default())
    }

    pub fn with_options(memory: &'a M, options: PatchOptions) -> Self {
        Self { memory, options }
    }

    /// Redirect `descriptor`'s resource to its replacement file, resolved
    /// against `mod_dir`.
    ///
    /// Failures are recorded in the descriptor's status. A descriptor that
    /// is already being run is left alone and `false` is returned.
    pub fn run(&self, descriptor: &PatchDescriptor, mod_dir: &Path) -> bool {
        self.try_run(descriptor, mod_dir).is_ok()
    }

    /// Like [`run`](Self::run), but returns the error that ended the run.
    ///
    /// `Error::AlreadyRunning` leaves the descriptor's status untouched.
    pub fn try_run(&self, descriptor: &PatchDescriptor, mod_dir: &Path) -> Result<()> {
        let Some(_guard) = descriptor.begin_run() else {
            warn!("{} is already being written, skipping", descriptor);
            return Err(Error::AlreadyRunning);
        };

        descriptor.update_status(PatchStatus::reset);
        debug!("Writing {} to memory...", descriptor);

        let result = self.apply(descriptor, mod_dir);
        if let Err(e) = &result {
            debug!("{} failed: {}", descriptor, e);
        }

        descriptor.update_status(|status| status.finish(&result));
        result
    }

    fn apply(&self, descriptor: &PatchDescriptor, mod_dir: &Path) -> Result<()> {
        descriptor.update_status(|s| s.advance(PatchState::FindingExistingResource));
        let existing = self
            .memory
            .find_address(descriptor.signature())?
            .ok_or_else(|| Error::NotFound("address of existing resource".to_string()))?;
        debug!("ExistingAddress: {}", existing);

        let pointer_bytes = existing.to_pointer_bytes();
        debug!("Pointer bytes: {}", format_bytes(&pointer_bytes));

        descriptor.update_status(|s| s.advance(PatchState::FindingPointerToResource));
        let pointer = match self.find_pointer(existing, &pointer_bytes)? {
            Some(pointer) => pointer,
            None => {
                if let Some(redirect) = self.redirect_still_applied(descriptor) {
                    info!(
                        "{} already redirected ({} -> {})",
                        descriptor, redirect.pointer, redirect.replacement
                    );
                    return Ok(());
                }
                return Err(Error::NotFound("pointer to existing resource".to_string()));
            }
        };
        debug!("PointerAddress: {}", pointer);

        let path = mod_dir.join(descriptor.replacement_file());
        let bytes =
            fs::read(&path).map_err(|source| Error::ReplacementUnreadable { path, source })?;

        descriptor.update_status(|s| s.advance(PatchState::FindingNewMemory));
        let replacement = self.memory.allocate(bytes.len())?;
        debug!("{} got write address: {}", descriptor, replacement);

        let written = self.memory.write(replacement, &bytes)?;
        debug!("BytesWritten to new address: {}", written);
        if written != bytes.len() {
            return Err(Error::MemoryAccess {
                address: replacement,
                message: format!("wrote {} of {} bytes", written, bytes.len()),
            });
        }

        let new_pointer = encode_pointer_with_width(replacement.get(), pointer_bytes.len());
        self.memory.write(pointer, &new_pointer)?;
        descriptor.record_redirect(Redirect {
            pointer,
            replacement,
            width: new_pointer.len(),
        });

        Ok(())
    }

    fn find_pointer(
        &self,
        existing: ForeignAddress,
        pointer_bytes: &[u8],
    ) -> Result<Option<ForeignAddress>> {
        match self.options.alias_policy {
            AliasPolicy::FirstMatch => self.memory.find_address(pointer_bytes),
            AliasPolicy::RejectAmbiguous => {
                let found = self.memory.find_addresses(pointer_bytes, usize::MAX)?;
                if found.len() > 1 {
                    return Err(Error::AmbiguousPointer {
                        target: existing,
                        count: found.len(),
                    });
                }
                Ok(found.into_iter().next())
            }
        }
    }

    /// The descriptor's previous redirect, if the pointer still holds it.
    fn redirect_still_applied(&self, descriptor: &PatchDescriptor) -> Option<Redirect> {
        let redirect = descriptor.last_redirect()?;
        let current = self.memory.read(redirect.pointer, redirect.width).ok()?;
        let expected = encode_pointer_with_width(redirect.replacement.get(), redirect.width);
        (current == expected).then_some(redirect)
    }
}
