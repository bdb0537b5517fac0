//! `MemoryProvider` backed by a live Windows process.

#[cfg(target_os = "windows")]
pub use windows_impl::ProcessMemory;

#[cfg(not(target_os = "windows"))]
pub use fallback::ProcessMemory;

#[cfg(any(target_os = "windows", test))]
use crate::memory::{ByteBuffer, ForeignAddress};

/// Size of each read while scanning a committed region
#[cfg(any(target_os = "windows", test))]
const SCAN_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Scan one region, `chunk_size` bytes at a time, with overlapping reads so
/// matches spanning a chunk boundary are not missed.
///
/// Each match is reported by exactly one chunk: the one it starts in before
/// the overlap. Chunks `read` cannot fill are skipped.
#[cfg(any(target_os = "windows", test))]
fn scan_region<R>(
    region_base: u64,
    region_size: usize,
    chunk_size: usize,
    finder: &memchr::memmem::Finder<'_>,
    limit: usize,
    found: &mut Vec<ForeignAddress>,
    mut read: R,
) where
    R: FnMut(u64, &mut [u8]) -> std::result::Result<usize, String>,
{
    let overlap = finder.needle().len().saturating_sub(1);
    let chunk_size = chunk_size.max(overlap + 1);
    let step = chunk_size - overlap;
    let mut offset = 0usize;

    while offset < region_size && found.len() < limit {
        let len = chunk_size.min(region_size - offset);
        let chunk_base = region_base + offset as u64;
        let is_last = offset + len >= region_size;
        let mut data = vec![0u8; len];

        match read(chunk_base, &mut data) {
            Ok(read) => {
                data.truncate(read);
                if let Some(base) = ForeignAddress::new(chunk_base) {
                    let owned_end = chunk_base + step as u64;
                    let chunk = ByteBuffer::new(base, data);
                    let remaining = limit - found.len();
                    found.extend(
                        chunk
                            .find_all(finder, usize::MAX)
                            .into_iter()
                            .filter(|a| is_last || a.get() < owned_end)
                            .take(remaining),
                    );
                }
            }
            Err(e) => tracing::trace!("Skipping unreadable chunk at 0x{:X}: {}", chunk_base, e),
        }

        if is_last {
            break;
        }
        offset += step;
    }
}

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::ffi::c_void;

    use memchr::memmem;
    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS,
        PAGE_READWRITE, VirtualAllocEx, VirtualQueryEx,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
        PROCESS_VM_WRITE,
    };

    use super::{SCAN_CHUNK_SIZE, scan_region};
    use crate::error::{Error, Result};
    use crate::memory::{ForeignAddress, MemoryProvider};

    pub struct ProcessMemory {
        handle: HANDLE,
        pid: u32,
    }

    // SAFETY: a process handle is a kernel object reference that may be used
    // from any thread; the Win32 memory APIs used here are thread-safe.
    unsafe impl Send for ProcessMemory {}
    unsafe impl Sync for ProcessMemory {}

    impl ProcessMemory {
        /// Open the process with the rights needed to scan, allocate and write.
        pub fn open(pid: u32) -> Result<Self> {
            // SAFETY: OpenProcess has no preconditions; the handle is closed on drop.
            let handle = unsafe {
                OpenProcess(
                    PROCESS_QUERY_INFORMATION
                        | PROCESS_VM_OPERATION
                        | PROCESS_VM_READ
                        | PROCESS_VM_WRITE,
                    false,
                    pid,
                )
            }
            .map_err(|e| Error::process_access(format_args!("Failed to open process {}", pid), &e))?;

            debug!("Opened process {} for memory access", pid);
            Ok(Self { handle, pid })
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }

        fn read_into(&self, address: u64, buffer: &mut [u8]) -> std::result::Result<usize, String> {
            let mut read = 0usize;
            // SAFETY: the destination buffer is valid for buffer.len() bytes.
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr().cast(),
                    buffer.len(),
                    Some(&mut read),
                )
            }
            .map_err(|e| e.message().to_string())?;
            Ok(read)
        }

    }

    impl MemoryProvider for ProcessMemory {
        fn find_addresses(&self, pattern: &[u8], limit: usize) -> Result<Vec<ForeignAddress>> {
            let finder = memmem::Finder::new(pattern);
            let mut found = Vec::new();
            let mut address = 0usize;
            let mut info = MEMORY_BASIC_INFORMATION::default();

            while found.len() < limit {
                // SAFETY: info is a valid out-parameter of the declared size.
                let written = unsafe {
                    VirtualQueryEx(
                        self.handle,
                        Some(address as *const c_void),
                        &mut info,
                        std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                    )
                };
                if written == 0 {
                    break;
                }

                let base = info.BaseAddress as usize;
                let size = info.RegionSize;
                let readable = info.State == MEM_COMMIT
                    && info.Protect.0 & (PAGE_GUARD.0 | PAGE_NOACCESS.0) == 0
                    && info.Protect.0 != 0;
                if readable {
                    scan_region(
                        base as u64,
                        size,
                        SCAN_CHUNK_SIZE,
                        &finder,
                        limit,
                        &mut found,
                        |address, buffer| self.read_into(address, buffer),
                    );
                }

                address = match base.checked_add(size) {
                    Some(next) if next > address => next,
                    _ => break,
                };
            }

            Ok(found)
        }

        fn allocate(&self, len: usize) -> Result<ForeignAddress> {
            // SAFETY: VirtualAllocEx only reserves memory inside the target.
            let remote = unsafe {
                VirtualAllocEx(
                    self.handle,
                    None,
                    len.max(1),
                    MEM_COMMIT | MEM_RESERVE,
                    PAGE_READWRITE,
                )
            };
            ForeignAddress::new(remote as u64).ok_or(Error::Allocation(len))
        }

        fn write(&self, address: ForeignAddress, bytes: &[u8]) -> Result<usize> {
            let mut written = 0usize;
            // SAFETY: the source buffer is valid for bytes.len() bytes.
            unsafe {
                WriteProcessMemory(
                    self.handle,
                    address.get() as *const c_void,
                    bytes.as_ptr().cast(),
                    bytes.len(),
                    Some(&mut written),
                )
            }
            .map_err(|e| Error::MemoryAccess {
                address,
                message: e.message().to_string(),
            })?;
            Ok(written)
        }

        fn read(&self, address: ForeignAddress, len: usize) -> Result<Vec<u8>> {
            let mut data = vec![0u8; len];
            let read = self
                .read_into(address.get(), &mut data)
                .map_err(|message| Error::MemoryAccess { address, message })?;
            data.truncate(read);
            Ok(data)
        }
    }

    impl Drop for ProcessMemory {
        fn drop(&mut self) {
            // SAFETY: the handle was returned by OpenProcess and is closed once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod fallback {
    use crate::error::{Error, Result};
    use crate::memory::{ForeignAddress, MemoryProvider};

    const FEATURE: &str = "Foreign process memory access";

    pub struct ProcessMemory {
        pid: u32,
    }

    impl ProcessMemory {
        pub fn open(_pid: u32) -> Result<Self> {
            Err(Error::Unsupported(FEATURE))
        }

        pub fn pid(&self) -> u32 {
            self.pid
        }
    }

    impl MemoryProvider for ProcessMemory {
        fn find_addresses(&self, _pattern: &[u8], _limit: usize) -> Result<Vec<ForeignAddress>> {
            Err(Error::Unsupported(FEATURE))
        }

        fn allocate(&self, _len: usize) -> Result<ForeignAddress> {
            Err(Error::Unsupported(FEATURE))
        }

        fn write(&self, _address: ForeignAddress, _bytes: &[u8]) -> Result<usize> {
            Err(Error::Unsupported(FEATURE))
        }

        fn read(&self, _address: ForeignAddress, _len: usize) -> Result<Vec<u8>> {
            Err(Error::Unsupported(FEATURE))
        }
    }
}
