//! In-memory provider used by unit tests.

use std::sync::Mutex;

use memchr::memmem;

use crate::error::{Error, Result};
use crate::memory::{ByteBuffer, ForeignAddress, MemoryProvider};

const ALLOCATION_BASE: u64 = 0x7F00_0000_0000;
const ALLOCATION_ALIGN: u64 = 0x1000;

pub struct MockMemory {
    regions: Mutex<Vec<ByteBuffer>>,
    next_allocation: Mutex<u64>,
    allocation_fails: bool,
}

impl MockMemory {
    pub fn lock_regions(&self) -> std::sync::MutexGuard<'_, Vec<ByteBuffer>> {
        self.regions.lock().unwrap()
    }

    /// Number of blocks handed out by `allocate`.
    pub fn allocation_count(&self) -> usize {
        self.lock_regions()
            .iter()
            .filter(|r| r.base().get() >= ALLOCATION_BASE)
            .count()
    }

    /// Base and bytes of every region, for whole-image comparisons.
    pub fn image(&self) -> Vec<(u64, Vec<u8>)> {
        self.lock_regions()
            .iter()
            .map(|r| (r.base().get(), r.as_bytes().to_vec()))
            .collect()
    }
}

impl MemoryProvider for MockMemory {
    fn find_addresses(&self, pattern: &[u8], limit: usize) -> Result<Vec<ForeignAddress>> {
        let finder = memmem::Finder::new(pattern);
        let mut found = Vec::new();
        for region in self.lock_regions().iter() {
            if found.len() >= limit {
                break;
            }
            found.extend(region.find_all(&finder, limit - found.len()));
        }
        Ok(found)
    }

    fn allocate(&self, len: usize) -> Result<ForeignAddress> {
        if self.allocation_fails {
            return Err(Error::Allocation(len));
        }
        let mut next = self.next_allocation.lock().unwrap();
        let base = ForeignAddress::new(*next).ok_or(Error::Allocation(len))?;
        let pages = (len as u64).div_ceil(ALLOCATION_ALIGN).max(1);
        *next += pages * ALLOCATION_ALIGN;
        self.lock_regions()
            .push(ByteBuffer::new(base, vec![0; len.max(1)]));
        Ok(base)
    }

    fn write(&self, address: ForeignAddress, bytes: &[u8]) -> Result<usize> {
        let mut regions = self.lock_regions();
        let region = regions
            .iter_mut()
            .find(|r| r.contains(address, bytes.len()))
            .ok_or_else(|| Error::MemoryAccess {
                address,
                message: "unmapped write".to_string(),
            })?;
        region.write(address, bytes)
    }

    fn read(&self, address: ForeignAddress, len: usize) -> Result<Vec<u8>> {
        let regions = self.lock_regions();
        let region = regions
            .iter()
            .find(|r| r.contains(address, len))
            .ok_or_else(|| Error::MemoryAccess {
                address,
                message: "unmapped read".to_string(),
            })?;
        Ok(region.read(address, len)?.to_vec())
    }
}

/// Builder for `MockMemory` images.
#[derive(Default)]
pub struct MockMemoryBuilder {
    regions: Vec<ByteBuffer>,
    allocation_fails: bool,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `data` at `base`.
    pub fn region(mut self, base: u64, data: Vec<u8>) -> Self {
        let base = ForeignAddress::new(base).expect("region base must be non-zero");
        self.regions.push(ByteBuffer::new(base, data));
        self
    }

    /// Map a zero-filled region of `len` bytes with each `(address, bytes)`
    /// pair written into it.
    pub fn region_with(self, base: u64, len: usize, writes: &[(u64, &[u8])]) -> Self {
        let mut data = vec![0u8; len];
        for (address, bytes) in writes {
            let start = (address - base) as usize;
            data[start..start + bytes.len()].copy_from_slice(bytes);
        }
        self.region(base, data)
    }

    pub fn failing_allocations(mut self) -> Self {
        self.allocation_fails = true;
        self
    }

    pub fn build(self) -> MockMemory {
        MockMemory {
            regions: Mutex::new(self.regions),
            next_allocation: Mutex::new(ALLOCATION_BASE),
            allocation_fails: self.allocation_fails,
        }
    }
}
