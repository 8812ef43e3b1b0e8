#![no_main]

use libfuzzer_sys::fuzz_target;

use sanboot_firmware::acpi::{CHECKSUM_OFFSET, HEADER_LEN};
use sanboot_firmware::checksum::checksum_fixup;
use sanboot_firmware::{disambiguate_gateways, AcpiTable, Ibft, Signature};

/// Tables live in base memory, so anything bigger than that window is not interesting.
const MAX_TABLE_LEN: usize = 0x2_0000;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_TABLE_LEN - HEADER_LEN)];

    // Give the body a well-formed header so the decoder proper gets exercised.
    let mut table = vec![0u8; HEADER_LEN];
    table[..4].copy_from_slice(Signature::IBFT.as_bytes());
    table.extend_from_slice(data);
    let len = table.len() as u32;
    table[4..8].copy_from_slice(&len.to_le_bytes());
    checksum_fixup(&mut table, CHECKSUM_OFFSET);

    let Ok(table) = AcpiTable::from_bytes(table) else {
        return;
    };
    let Ok(mut ibft) = Ibft::parse(table) else {
        return;
    };
    for entry in ibft.entries() {
        let _ = entry.structure.to_string();
    }
    let _ = ibft.boot_targets();

    disambiguate_gateways(&mut ibft);
    assert!(ibft.table().checksum_valid());
    assert!(disambiguate_gateways(&mut ibft).is_empty());
});
