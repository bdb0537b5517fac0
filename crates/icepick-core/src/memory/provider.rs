use crate::error::Result;
use crate::memory::ForeignAddress;

/// Access to one foreign process's address space.
///
/// Implementations must tolerate concurrent calls: patch operations for the
/// same process run in parallel and share one provider.
pub trait MemoryProvider: Sync {
    /// Addresses of up to `limit` occurrences of `pattern`, lowest first.
    fn find_addresses(&self, pattern: &[u8], limit: usize) -> Result<Vec<ForeignAddress>>;

    /// First occurrence of `pattern`, if any.
    fn find_address(&self, pattern: &[u8]) -> Result<Option<ForeignAddress>> {
        Ok(self.find_addresses(pattern, 1)?.into_iter().next())
    }

    /// Allocate a block of at least `len` bytes inside the target.
    fn allocate(&self, len: usize) -> Result<ForeignAddress>;

    /// Write `bytes` at `address`, returning the number of bytes written.
    fn write(&self, address: ForeignAddress, bytes: &[u8]) -> Result<usize>;

    /// Read `len` bytes at `address`.
    fn read(&self, address: ForeignAddress, len: usize) -> Result<Vec<u8>>;
}
