use memchr::memmem;

use crate::error::{Error, Result};
use crate::memory::ForeignAddress;

/// A local copy of a contiguous range of foreign memory.
///
/// All access goes through foreign addresses and is bounds-checked against
/// the range, so a local offset is never confused with a target address.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    base: ForeignAddress,
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new(base: ForeignAddress, data: Vec<u8>) -> Self {
        Self { base, data }
    }

    pub fn base(&self) -> ForeignAddress {
        self.base
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether `[address, address + len)` lies inside this buffer.
    pub fn contains(&self, address: ForeignAddress, len: usize) -> bool {
        self.local_range(address, len).is_some()
    }

    fn local_range(&self, address: ForeignAddress, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(address.get().checked_sub(self.base.get())?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }

    pub fn read(&self, address: ForeignAddress, len: usize) -> Result<&[u8]> {
        let range = self
            .local_range(address, len)
            .ok_or_else(|| out_of_bounds(address, len))?;
        Ok(&self.data[range])
    }

    pub fn write(&mut self, address: ForeignAddress, bytes: &[u8]) -> Result<usize> {
        let range = self
            .local_range(address, bytes.len())
            .ok_or_else(|| out_of_bounds(address, bytes.len()))?;
        self.data[range].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Foreign addresses of every occurrence of `finder`'s needle, in
    /// ascending order, stopping after `limit` matches.
    pub fn find_all(&self, finder: &memmem::Finder<'_>, limit: usize) -> Vec<ForeignAddress> {
        finder
            .find_iter(&self.data)
            .filter_map(|pos| self.base.offset(pos as u64))
            .take(limit)
            .collect()
    }
}

fn out_of_bounds(address: ForeignAddress, len: usize) -> Error {
    Error::MemoryAccess {
        address,
        message: format!("{} byte access outside mapped range", len),
    }
}
