//! Process acquisition: launching the game and finding the process to inject.

mod inspect;
mod launcher;
mod machine;
mod request;
mod signal;

pub use inspect::{ModuleEntry, ProcessEntry, ProcessInspector, ToolhelpInspector};
pub use launcher::{Launcher, SystemLauncher};
pub use machine::{
    AcquiredProcess, AcquisitionState, INJECTION_FAILED_TITLE, LAUNCH_FAILED_TITLE,
    ProcessAcquirer,
};
pub use request::{
    AcquisitionRequest, LaunchStrategy, LauncherKind, matches_process_name, process_name_of,
};
pub use signal::CancelSignal;
