//! Locating boot firmware tables in base memory.
//!
//! Network boot firmware leaves its tables somewhere in the top of conventional
//! memory, aligned to 16 bytes. There is no pointer to them, so the window is
//! scanned for the signature and each candidate is validated before it is
//! accepted.

use tracing::{debug, info};

use crate::acpi::{AcpiTable, Signature, HEADER_LEN};
use crate::checksum::checksum_valid;
use crate::error::ScanError;
use crate::memory::PhysicalMemory;

/// Start of the scanned window.
pub const BASEMEM_START: u64 = 0x8_0000;

/// End (exclusive) of the scanned window.
pub const BASEMEM_END: u64 = 0xa_0000;

pub const BASEMEM_LEN: usize = (BASEMEM_END - BASEMEM_START) as usize;

/// Tables are aligned to this many bytes.
pub const SCAN_STRIDE: usize = 16;

/// Scan the base memory window for a table with `signature`.
///
/// Returns `Ok(None)` when no valid table exists. The mapping is released before
/// returning on every path.
pub fn find_table<M>(mem: &M, signature: Signature) -> Result<Option<AcpiTable>, ScanError>
where
    M: PhysicalMemory + ?Sized,
{
    let window = mem.map(BASEMEM_START, BASEMEM_LEN)?;
    scan_window(&window, BASEMEM_START, signature)
}

/// Scan an already-mapped window whose first byte is at physical address
/// `window_base`.
pub fn scan_window(
    window: &[u8],
    window_base: u64,
    signature: Signature,
) -> Result<Option<AcpiTable>, ScanError> {
    for offset in (0..window.len()).step_by(SCAN_STRIDE) {
        let rest = &window[offset..];
        if !rest.starts_with(signature.as_bytes()) {
            continue;
        }
        let paddr = window_base + offset as u64;

        if rest.len() < HEADER_LEN {
            debug!("{signature} candidate at {paddr:#x} truncated by end of window");
            continue;
        }
        let length = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        if length < HEADER_LEN || length > rest.len() {
            debug!("{signature} candidate at {paddr:#x} has bad length {length}");
            continue;
        }
        let bytes = &rest[..length];
        if !checksum_valid(bytes) {
            debug!("{signature} candidate at {paddr:#x} has bad checksum");
            continue;
        }

        let mut copy = Vec::new();
        copy.try_reserve_exact(length)
            .map_err(|_| ScanError::OutOfMemory { len: length })?;
        copy.extend_from_slice(bytes);

        // `length >= HEADER_LEN` and `copy.len() == length`, so this cannot fail.
        let Ok(table) = AcpiTable::from_bytes(copy) else {
            continue;
        };
        info!(
            "Found ACPI table \"{signature}\" at {paddr:05x} OEM ID \"{}\" OEM table ID \"{}\"",
            table.header().oem_id(),
            table.header().oem_table_id()
        );
        return Ok(Some(table));
    }
    Ok(None)
}
