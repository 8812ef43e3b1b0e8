#![no_main]

use libfuzzer_sys::fuzz_target;

use sanboot_firmware::acpi::{CHECKSUM_OFFSET, HEADER_LEN};
use sanboot_firmware::checksum::checksum_fixup;
use sanboot_firmware::{Abft, AcpiTable, Sbft, Signature};

const MAX_TABLE_LEN: usize = 4096;

fn table(signature: Signature, body: &[u8]) -> Option<AcpiTable> {
    let mut bytes = vec![0u8; HEADER_LEN];
    bytes[..4].copy_from_slice(signature.as_bytes());
    bytes.extend_from_slice(body);
    let len = bytes.len() as u32;
    bytes[4..8].copy_from_slice(&len.to_le_bytes());
    checksum_fixup(&mut bytes, CHECKSUM_OFFSET);
    AcpiTable::from_bytes(bytes).ok()
}

fuzz_target!(|data: &[u8]| {
    let body = &data[..data.len().min(MAX_TABLE_LEN)];

    if let Some(t) = table(Signature::SBFT, body) {
        if let Ok(sbft) = Sbft::parse(&t) {
            let _ = sbft.to_string();
        }
        // Wrong signature is always rejected.
        assert!(Abft::parse(&t).is_err());
    }
    if let Some(t) = table(Signature::ABFT, body) {
        if let Ok(abft) = Abft::parse(&t) {
            let _ = abft.to_string();
        }
    }
});
