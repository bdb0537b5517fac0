//! `InjectionProvider` for live Windows processes using remote threads.
//!
//! Library loading runs `SetDllDirectoryW` and `LoadLibraryW` on a thread
//! created inside the target. Exports are resolved by loading the same
//! library locally without running its entry point and applying the symbol's
//! offset to the remote module base.

#[cfg(target_os = "windows")]
pub use windows_impl::{RemoteInjector, RemoteSession};

#[cfg(not(target_os = "windows"))]
pub use fallback::{RemoteInjector, RemoteSession};

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::ffi::{CString, c_void};
    use std::os::windows::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, FreeLibrary, HANDLE, WAIT_OBJECT_0};
    use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
    use windows::Win32::System::LibraryLoader::{
        DONT_RESOLVE_DLL_REFERENCES, GetModuleHandleW, GetProcAddress, LoadLibraryExW,
    };
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE, VirtualAllocEx, VirtualFreeEx,
    };
    use windows::Win32::System::Threading::{
        CreateRemoteThread, GetExitCodeThread, INFINITE, OpenProcess, PROCESS_ALL_ACCESS,
        WaitForSingleObject,
    };
    use windows::core::{HSTRING, PCSTR, s, w};

    use crate::acquire::{ProcessInspector, ToolhelpInspector};
    use crate::error::{Error, Result};
    use crate::inject::{InjectionProvider, InjectionSession, SdkSettings, encode_settings};

    type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct RemoteInjector;

    impl InjectionProvider for RemoteInjector {
        type Session = RemoteSession;

        fn attach(&self, pid: u32) -> Result<RemoteSession> {
            // SAFETY: OpenProcess has no preconditions; the handle is closed on drop.
            let handle = unsafe { OpenProcess(PROCESS_ALL_ACCESS, false, pid) }
                .map_err(|e| Error::process_access(format_args!("Failed to open process {}", pid), &e))?;
            debug!("Attached to process {}", pid);
            Ok(RemoteSession {
                handle,
                pid,
                search_path: None,
            })
        }
    }

    pub struct RemoteSession {
        handle: HANDLE,
        pid: u32,
        search_path: Option<PathBuf>,
    }

    /// A block of memory inside the target, released on drop.
    struct RemoteBuffer<'a> {
        session: &'a RemoteSession,
        address: *mut c_void,
    }

    impl<'a> RemoteBuffer<'a> {
        fn write(session: &'a RemoteSession, bytes: &[u8]) -> Result<Self> {
            // SAFETY: allocation happens inside the target only.
            let address = unsafe {
                VirtualAllocEx(
                    session.handle,
                    None,
                    bytes.len(),
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };
            if address.is_null() {
                return Err(Error::Allocation(bytes.len()));
            }
            let buffer = Self { session, address };

            let mut written = 0usize;
            // SAFETY: the source slice is valid for bytes.len() bytes and the
            // destination was just allocated with that size.
            unsafe {
                WriteProcessMemory(
                    session.handle,
                    address,
                    bytes.as_ptr().cast(),
                    bytes.len(),
                    Some(&mut written),
                )
            }
            .map_err(|e| Error::process_access("Failed to write to target", &e))?;
            if written != bytes.len() {
                return Err(Error::InjectionFailure(format!(
                    "Partial write to target ({} of {} bytes)",
                    written,
                    bytes.len()
                )));
            }
            Ok(buffer)
        }

        fn address(&self) -> u64 {
            self.address as u64
        }
    }

    impl Drop for RemoteBuffer<'_> {
        fn drop(&mut self) {
            // SAFETY: the address came from VirtualAllocEx on this handle.
            unsafe {
                let _ = VirtualFreeEx(self.session.handle, self.address, 0, MEM_RELEASE);
            }
        }
    }

    fn wide_nul(text: &std::ffi::OsStr) -> Vec<u8> {
        text.encode_wide()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    fn kernel32_export(symbol: PCSTR) -> Result<u64> {
        // SAFETY: kernel32 is always loaded; the symbol is NUL-terminated.
        unsafe {
            let kernel32 = GetModuleHandleW(w!("kernel32.dll"))
                .map_err(|e| Error::process_access("Failed to find kernel32", &e))?;
            GetProcAddress(kernel32, symbol)
                .map(|f| f as usize as u64)
                .ok_or_else(|| Error::InjectionFailure("kernel32 export missing".to_string()))
        }
    }

    impl RemoteSession {
        /// Run `routine(parameter)` on a new thread in the target and return
        /// its exit code.
        fn run_remote(&self, routine: u64, parameter: u64) -> Result<u32> {
            // SAFETY: routine is the address of a function in the target with
            // the thread start signature; parameter points into target memory.
            unsafe {
                let start = std::mem::transmute::<usize, ThreadStart>(routine as usize);
                let thread = CreateRemoteThread(
                    self.handle,
                    None,
                    0,
                    Some(start),
                    Some(parameter as *const c_void),
                    0,
                    None,
                )
                .map_err(|e| Error::process_access("Failed to create remote thread", &e))?;

                let wait = WaitForSingleObject(thread, INFINITE);
                let mut exit_code = 0u32;
                let status = GetExitCodeThread(thread, &mut exit_code);
                let _ = CloseHandle(thread);

                if wait != WAIT_OBJECT_0 {
                    return Err(Error::InjectionFailure("Remote thread did not finish".to_string()));
                }
                status.map_err(|e| Error::process_access("Failed to read remote thread result", &e))?;
                Ok(exit_code)
            }
        }

        /// Offset of `symbol` inside `library`, resolved from a local copy.
        fn export_offset(&self, library: &str, symbol: &str) -> Result<u64> {
            let path = match &self.search_path {
                Some(dir) => dir.join(library),
                None => PathBuf::from(library),
            };
            let symbol_c = CString::new(symbol)
                .map_err(|_| Error::InjectionFailure(format!("Invalid export name {:?}", symbol)))?;

            // SAFETY: the library is mapped without running its entry point
            // and freed before returning.
            unsafe {
                let module = LoadLibraryExW(
                    &HSTRING::from(path.as_os_str()),
                    HANDLE::default(),
                    DONT_RESOLVE_DLL_REFERENCES,
                )
                .map_err(|e| Error::process_access(format_args!("Failed to map {}", path.display()), &e))?;

                let export = GetProcAddress(module, PCSTR(symbol_c.as_ptr().cast()));
                let offset = export.map(|f| f as usize as u64 - module.0 as u64);
                let _ = FreeLibrary(module);

                offset.ok_or_else(|| Error::NotFound(format!("export {} in {}", symbol, library)))
            }
        }

        fn remote_module_base(&self, library: &str) -> Result<Option<u64>> {
            let name = Path::new(library)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| library.to_string());
            Ok(ToolhelpInspector
                .find_module(self.pid, &name)?
                .map(|module| module.base))
        }
    }

    impl InjectionSession for RemoteSession {
        fn set_library_search_path(&mut self, dir: &Path) -> Result<()> {
            let routine = kernel32_export(s!("SetDllDirectoryW"))?;
            let argument = RemoteBuffer::write(self, &wide_nul(dir.as_os_str()))?;
            if self.run_remote(routine, argument.address())? == 0 {
                return Err(Error::InjectionFailure(format!(
                    "SetDllDirectoryW({}) failed in target",
                    dir.display()
                )));
            }
            drop(argument);

            debug!("Library search path set to {}", dir.display());
            self.search_path = Some(dir.to_path_buf());
            Ok(())
        }

        fn inject_library(&mut self, library: &str) -> Result<()> {
            let routine = kernel32_export(s!("LoadLibraryW"))?;
            let argument = RemoteBuffer::write(self, &wide_nul(std::ffi::OsStr::new(library)))?;
            self.run_remote(routine, argument.address())?;
            drop(argument);

            // The thread exit code only holds the low half of the module handle
            match self.remote_module_base(library)? {
                Some(base) => {
                    debug!("{} loaded at 0x{:X}", library, base);
                    Ok(())
                }
                None => Err(Error::InjectionFailure(format!(
                    "{} was not loaded by the target",
                    library
                ))),
            }
        }

        fn call_export(&mut self, library: &str, symbol: &str, settings: &SdkSettings) -> Result<()> {
            let base = self
                .remote_module_base(library)?
                .ok_or_else(|| Error::NotFound(format!("{} in target", library)))?;
            let routine = base + self.export_offset(library, symbol)?;

            let path = CString::new(settings.base_path.as_str())
                .map_err(|_| Error::InjectionFailure("Base path contains NUL".to_string()))?;
            let path_buffer = RemoteBuffer::write(self, path.as_bytes_with_nul())?;
            let record = encode_settings(path_buffer.address(), settings.developer_mode);
            let record_buffer = RemoteBuffer::write(self, &record)?;

            debug!("Calling {}!{} at 0x{:X}", library, symbol, routine);
            self.run_remote(routine, record_buffer.address())?;
            Ok(())
        }
    }

    impl Drop for RemoteSession {
        fn drop(&mut self) {
            // SAFETY: the handle came from OpenProcess and is closed once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod fallback {
    use std::path::Path;

    use crate::error::{Error, Result};
    use crate::inject::{InjectionProvider, InjectionSession, SdkSettings};

    const FEATURE: &str = "Library injection";

    #[derive(Debug, Default, Clone, Copy)]
    pub struct RemoteInjector;

    impl InjectionProvider for RemoteInjector {
        type Session = RemoteSession;

        fn attach(&self, _pid: u32) -> Result<RemoteSession> {
            Err(Error::Unsupported(FEATURE))
        }
    }

    /// Never constructed off Windows.
    pub struct RemoteSession(());

    impl InjectionSession for RemoteSession {
        fn set_library_search_path(&mut self, _dir: &Path) -> Result<()> {
            Err(Error::Unsupported(FEATURE))
        }

        fn inject_library(&mut self, _library: &str) -> Result<()> {
            Err(Error::Unsupported(FEATURE))
        }

        fn call_export(&mut self, _library: &str, _symbol: &str, _settings: &SdkSettings) -> Result<()> {
            Err(Error::Unsupported(FEATURE))
        }
    }
}
