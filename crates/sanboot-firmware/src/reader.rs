//! Bounds-checked access to a captured firmware table.
//!
//! Firmware tables point at their own substructures with byte offsets stored in
//! the table. Those offsets are untrusted, so every read goes through
//! [`TableReader`], which checks `offset + len <= table.len()` before touching
//! the buffer.

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy)]
pub struct TableReader<'a> {
    bytes: &'a [u8],
}

impl<'a> TableReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = offset.checked_add(len).ok_or(self.out_of_bounds(offset, len))?;
        self.bytes
            .get(offset..end)
            .ok_or(self.out_of_bounds(offset, len))
    }

    /// A reader over the `len` bytes at `offset`. Offsets inside the returned
    /// reader are relative to `offset`.
    pub fn sub(&self, offset: usize, len: usize) -> Result<TableReader<'a>, DecodeError> {
        self.bytes(offset, len).map(TableReader::new)
    }

    pub fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let bytes = self.bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&self, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn u16(&self, offset: usize) -> Result<u16, DecodeError> {
        self.array(offset).map(u16::from_le_bytes)
    }

    pub fn u32(&self, offset: usize) -> Result<u32, DecodeError> {
        self.array(offset).map(u32::from_le_bytes)
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> DecodeError {
        DecodeError::OutOfBounds {
            offset,
            len,
            table_len: self.bytes.len(),
        }
    }
}
