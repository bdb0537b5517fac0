use std::path::PathBuf;

use thiserror::Error;

use crate::memory::ForeignAddress;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Could not find {0}")]
    NotFound(String),

    #[error("Could not read replacement file {}: {source}", path.display())]
    ReplacementUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mod file is already being written")]
    AlreadyRunning,

    #[error("Could not allocate {0} bytes in the target process")]
    Allocation(usize),

    #[error("Pointer to {target} is ambiguous: found {count} matching locations")]
    AmbiguousPointer { target: ForeignAddress, count: usize },

    #[error("Failed to access process memory at {address}: {message}")]
    MemoryAccess {
        address: ForeignAddress,
        message: String,
    },

    #[error("{message}, Error Code {code}")]
    ProcessAccess { message: String, code: i32 },

    #[error("Timed out after {seconds} seconds. Could not find {process} process.")]
    Timeout { seconds: u64, process: String },

    #[error("Injection failed: {0}")]
    InjectionFailure(String),

    #[error("Failed to launch process: {0}")]
    LaunchFailed(String),

    #[error("Process acquisition cancelled")]
    Cancelled,

    #[error("Invalid mod definition: {0}")]
    InvalidModDefinition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("{0} is only supported on Windows")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Error::ReplacementUnreadable { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }

    /// Whether this error ends a process acquisition instead of being
    /// reported and polled past.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::LaunchFailed(_)
                | Error::InjectionFailure(_)
                | Error::Cancelled
                | Error::Unsupported(_)
        )
    }

    /// Wrap an OS error, keeping its native Win32 error code.
    #[cfg(target_os = "windows")]
    pub(crate) fn process_access(context: impl std::fmt::Display, err: &windows::core::Error) -> Self {
        Error::ProcessAccess {
            message: format!("{}: {}", context, err.message()),
            code: win32_code(err.code().0),
        }
    }
}

/// Recover the Win32 error code from an `HRESULT_FROM_WIN32` value.
#[cfg(any(target_os = "windows", test))]
fn win32_code(hresult: i32) -> i32 {
    if (hresult as u32) & 0xFFFF_0000 == 0x8007_0000 {
        hresult & 0xFFFF
    } else {
        hresult
    }
}
