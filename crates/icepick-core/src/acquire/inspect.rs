//! Process and module enumeration.

use super::request::matches_process_name;
use crate::error::Result;

#[cfg(target_os = "windows")]
pub use windows_impl::ToolhelpInspector;

#[cfg(not(target_os = "windows"))]
pub use fallback::ToolhelpInspector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: u32,
    /// Executable file name, e.g. `Titanfall2.exe`
    pub exe_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    pub base: u64,
}

/// Read-only view of the running processes.
pub trait ProcessInspector: Send + Sync {
    /// Snapshot of every running process.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Modules loaded in `pid`.
    fn modules(&self, pid: u32) -> Result<Vec<ModuleEntry>>;

    /// Processes whose executable matches `name`, ignoring case and `.exe`.
    fn processes_named(&self, name: &str) -> Result<Vec<ProcessEntry>> {
        Ok(self
            .processes()?
            .into_iter()
            .filter(|p| matches_process_name(&p.exe_name, name))
            .collect())
    }

    fn find_module(&self, pid: u32, name: &str) -> Result<Option<ModuleEntry>> {
        Ok(self
            .modules(pid)?
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name)))
    }
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use tracing::trace;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CREATE_TOOLHELP_SNAPSHOT_FLAGS, CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW,
        Module32NextW, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPMODULE,
        TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
    };

    use super::{ModuleEntry, ProcessEntry, ProcessInspector};
    use crate::error::{Error, Result};

    /// Closes a Toolhelp snapshot handle on drop.
    struct Snapshot(HANDLE);

    impl Snapshot {
        fn take(flags: CREATE_TOOLHELP_SNAPSHOT_FLAGS, pid: u32) -> Result<Self> {
            // SAFETY: CreateToolhelp32Snapshot has no preconditions.
            unsafe { CreateToolhelp32Snapshot(flags, pid) }
                .map(Self)
                .map_err(|e| Error::process_access("Failed to snapshot processes", &e))
        }
    }

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the handle came from CreateToolhelp32Snapshot.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    /// Enumerates processes and modules with Toolhelp snapshots.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ToolhelpInspector;

    impl ProcessInspector for ToolhelpInspector {
        fn processes(&self) -> Result<Vec<ProcessEntry>> {
            let snapshot = Snapshot::take(TH32CS_SNAPPROCESS, 0)?;
            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            let mut processes = Vec::new();

            // SAFETY: entry is initialised with its size as the API requires.
            let mut next = unsafe { Process32FirstW(snapshot.0, &mut entry) };
            while next.is_ok() {
                processes.push(ProcessEntry {
                    pid: entry.th32ProcessID,
                    parent_pid: entry.th32ParentProcessID,
                    exe_name: wide_to_string(&entry.szExeFile),
                });
                // SAFETY: as above.
                next = unsafe { Process32NextW(snapshot.0, &mut entry) };
            }

            trace!("Enumerated {} processes", processes.len());
            Ok(processes)
        }

        fn modules(&self, pid: u32) -> Result<Vec<ModuleEntry>> {
            let snapshot = Snapshot::take(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)?;
            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };
            let mut modules = Vec::new();

            // SAFETY: entry is initialised with its size as the API requires.
            let mut next = unsafe { Module32FirstW(snapshot.0, &mut entry) };
            while next.is_ok() {
                modules.push(ModuleEntry {
                    name: wide_to_string(&entry.szModule),
                    base: entry.modBaseAddr as u64,
                });
                // SAFETY: as above.
                next = unsafe { Module32NextW(snapshot.0, &mut entry) };
            }

            Ok(modules)
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod fallback {
    use super::{ModuleEntry, ProcessEntry, ProcessInspector};
    use crate::error::{Error, Result};

    #[derive(Debug, Default, Clone, Copy)]
    pub struct ToolhelpInspector;

    impl ProcessInspector for ToolhelpInspector {
        fn processes(&self) -> Result<Vec<ProcessEntry>> {
            Err(Error::Unsupported("Process enumeration"))
        }

        fn modules(&self, _pid: u32) -> Result<Vec<ModuleEntry>> {
            Err(Error::Unsupported("Module enumeration"))
        }
    }
}
