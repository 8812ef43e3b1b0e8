use core::ops::Deref;

use crate::error::MapError;

/// Read-only access to a range of physical memory.
///
/// `map` hands out a scoped window; dropping the window releases the mapping, so
/// callers that only hold the window for the duration of a function cannot leak it
/// on an early return.
pub trait PhysicalMemory {
    type Window<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    fn map(&self, base: u64, len: usize) -> Result<Self::Window<'_>, MapError>;
}

/// A contiguous range of physical memory backed by a `Vec<u8>`.
///
/// Used for memory images captured from a real machine and for building test
/// images in host-side tests.
#[derive(Debug, Clone)]
pub struct VecMemory {
    base: u64,
    data: Vec<u8>,
}

impl VecMemory {
    /// Zero-filled memory covering `base..base + size`.
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// Memory whose contents are `image`, starting at physical address `base`.
    pub fn from_image(base: u64, image: Vec<u8>) -> Self {
        Self { base, data: image }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy `buf` to physical address `paddr`.
    ///
    /// # Panics
    ///
    /// Panics if the destination is outside this memory range.
    pub fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        let start = self.offset_of(paddr, buf.len()).unwrap_or_else(|| {
            panic!(
                "write of {} bytes at {paddr:#x} outside {:#x}..{:#x}",
                buf.len(),
                self.base,
                self.base + self.data.len() as u64
            )
        });
        self.data[start..start + buf.len()].copy_from_slice(buf);
    }

    pub fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MapError> {
        let start = self.offset_of(paddr, buf.len()).ok_or(MapError {
            base: paddr,
            len: buf.len(),
        })?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn offset_of(&self, paddr: u64, len: usize) -> Option<usize> {
        let start = usize::try_from(paddr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start)
    }
}

impl PhysicalMemory for VecMemory {
    type Window<'a> = &'a [u8];

    fn map(&self, base: u64, len: usize) -> Result<&[u8], MapError> {
        let start = self.offset_of(base, len).ok_or(MapError { base, len })?;
        Ok(&self.data[start..start + len])
    }
}
