//! # icepick-core
//!
//! Core library for the Icepick mod launcher.
//!
//! This crate provides:
//! - Mod definitions and script replacement descriptors
//! - Signature scanning and pointer redirection in a foreign process
//! - Process acquisition (launch, watch, validate) with cancellation
//! - SDK injection into the acquired process
//! - Progress notifications for front ends

pub mod acquire;
pub mod config;
pub mod error;
pub mod inject;
pub mod memory;
pub mod mods;
pub mod notify;
pub mod patch;

pub use acquire::{
    AcquiredProcess, AcquisitionRequest, AcquisitionState, CancelSignal, LaunchStrategy,
    LauncherKind, ProcessAcquirer, ProcessInspector, SystemLauncher, ToolhelpInspector,
};
pub use config::InjectorConfig;
pub use error::{Error, Result};
pub use inject::{InjectionProvider, InjectionSession, RemoteInjector, SdkSettings, inject_sdk};
pub use memory::{ByteBuffer, ForeignAddress, MemoryProvider, ProcessMemory};
pub use mods::{Mod, ModDefinition, ModStatus, PatchDefinition};
pub use notify::{InjectionEvent, InjectionObserver, Notifier, TracingObserver};
pub use patch::{
    AliasPolicy, PatchDescriptor, PatchOperation, PatchOptions, PatchOutcome, PatchReport,
    PatchState, PatchStatus, run_all,
};
