use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::error::{Error, Result};
use crate::memory::ForeignAddress;

/// Position of a patch operation in its run.
///
/// Monotonic within a run; a new run starts again from `Waiting`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumCount,
    EnumIter,
    IntoStaticStr,
    Serialize,
)]
pub enum PatchState {
    Waiting,
    FindingExistingResource,
    FindingPointerToResource,
    FindingNewMemory,
    Finished,
}

impl PatchState {
    /// Normalized position in the state sequence, in `[0, 1]`.
    pub fn progress(self) -> f32 {
        self as usize as f32 / (Self::COUNT - 1) as f32
    }
}

impl fmt::Display for PatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// Result of the most recent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PatchOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

/// Observable status of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchStatus {
    state: PatchState,
    outcome: PatchOutcome,
}

impl Default for PatchStatus {
    fn default() -> Self {
        Self {
            state: PatchState::Waiting,
            outcome: PatchOutcome::Pending,
        }
    }
}

impl PatchStatus {
    pub fn state(&self) -> PatchState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.state.progress()
    }

    pub fn outcome(&self) -> &PatchOutcome {
        &self.outcome
    }

    /// `None` until the run has finished.
    pub fn success(&self) -> Option<bool> {
        match self.outcome {
            PatchOutcome::Pending => None,
            PatchOutcome::Succeeded => Some(true),
            PatchOutcome::Failed(_) => Some(false),
        }
    }

    /// Empty unless the last run failed.
    pub fn last_error(&self) -> &str {
        match &self.outcome {
            PatchOutcome::Failed(message) => message,
            _ => "",
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn advance(&mut self, state: PatchState) {
        debug_assert!(state >= self.state, "patch state moved backwards");
        self.state = state;
    }

    pub(crate) fn finish(&mut self, result: &Result<()>) {
        self.state = PatchState::Finished;
        self.outcome = match result {
            Ok(()) => PatchOutcome::Succeeded,
            Err(e) => PatchOutcome::Failed(e.to_string()),
        };
    }
}

/// Pointer rewrite applied by a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    /// Location of the rewritten pointer.
    pub pointer: ForeignAddress,
    /// Address the pointer now holds.
    pub replacement: ForeignAddress,
    /// Number of pointer bytes written.
    pub width: usize,
}

/// One replaceable resource of a mod.
pub struct PatchDescriptor {
    signature: Vec<u8>,
    replacement_file: PathBuf,
    address_offset: i64,
    status: Mutex<PatchStatus>,
    redirect: Mutex<Option<Redirect>>,
    in_flight: AtomicBool,
}

impl PatchDescriptor {
    /// Create a descriptor from its ASCII comparison string.
    pub fn new(
        signature: &str,
        replacement_file: impl Into<PathBuf>,
        address_offset: i64,
    ) -> Result<Self> {
        if signature.is_empty() {
            return Err(Error::InvalidModDefinition(
                "signature must not be empty".to_string(),
            ));
        }
        if !signature.is_ascii() {
            return Err(Error::InvalidModDefinition(format!(
                "signature {:?} is not ASCII",
                signature
            )));
        }

        Ok(Self {
            signature: signature.as_bytes().to_vec(),
            replacement_file: replacement_file.into(),
            address_offset,
            status: Mutex::new(PatchStatus::default()),
            redirect: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn replacement_file(&self) -> &Path {
        &self.replacement_file
    }

    pub fn address_offset(&self) -> i64 {
        self.address_offset
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> PatchStatus {
        lock(&self.status).clone()
    }

    pub fn last_redirect(&self) -> Option<Redirect> {
        *lock(&self.redirect)
    }

    pub(crate) fn update_status(&self, f: impl FnOnce(&mut PatchStatus)) {
        f(&mut lock(&self.status));
    }

    pub(crate) fn record_redirect(&self, redirect: Redirect) {
        *lock(&self.redirect) = Some(redirect);
    }

    /// Claim the descriptor for a run. Returns `None` if a run is already
    /// in flight.
    pub(crate) fn begin_run(&self) -> Option<RunGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { descriptor: self })
    }
}

impl fmt::Display for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ModFile {} (@{})]",
            self.replacement_file.display(),
            self.address_offset
        )
    }
}

impl fmt::Debug for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchDescriptor")
            .field("signature", &String::from_utf8_lossy(&self.signature))
            .field("replacement_file", &self.replacement_file)
            .field("address_offset", &self.address_offset)
            .field("status", &self.status())
            .finish()
    }
}

/// Releases the in-flight flag when a run ends.
pub(crate) struct RunGuard<'a> {
    descriptor: &'a PatchDescriptor,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.descriptor.in_flight.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_progress_spans_unit_interval() {
        let progress: Vec<f32> = PatchState::iter().map(PatchState::progress).collect();
        assert_eq!(progress, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_status_invariants() {
        let mut status = PatchStatus::default();
        assert_eq!(status.success(), None);
        assert_eq!(status.last_error(), "");

        status.advance(PatchState::FindingExistingResource);
        assert_eq!(status.success(), None);

        status.finish(&Err(Error::NotFound("thing".to_string())));
        assert_eq!(status.state(), PatchState::Finished);
        assert_eq!(status.success(), Some(false));
        assert_eq!(status.last_error(), "Could not find thing");

        let mut status = PatchStatus::default();
        status.finish(&Ok(()));
        assert_eq!(status.success(), Some(true));
        assert!(status.last_error().is_empty());
    }

    #[test]
    fn test_new_rejects_non_ascii_signature() {
        assert!(PatchDescriptor::new("función", "a.nut", 0).is_err());
        assert!(PatchDescriptor::new("", "a.nut", 0).is_err());
        let descriptor = PatchDescriptor::new("function Init()", "scripts/init.nut", 16).unwrap();
        assert_eq!(descriptor.signature(), b"function Init()");
        assert_eq!(descriptor.to_string(), "[ModFile scripts/init.nut (@16)]");
    }

    #[test]
    fn test_only_one_run_in_flight() {
        let descriptor = PatchDescriptor::new("sig", "a.nut", 0).unwrap();
        let guard = descriptor.begin_run();
        assert!(guard.is_some());
        assert!(descriptor.begin_run().is_none());
        drop(guard);
        assert!(descriptor.begin_run().is_some());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PatchState::FindingNewMemory.to_string(), "FindingNewMemory");
    }
}
