#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use sanboot_firmware::scan::{scan_window, SCAN_STRIDE};
use sanboot_firmware::Signature;

const WINDOW_BASE: u64 = 0x8_0000;
const MAX_WINDOW_LEN: usize = 16 * 1024;

#[derive(Debug, Arbitrary)]
enum Which {
    Ibft,
    Abft,
    Sbft,
}

#[derive(Debug, Arbitrary)]
struct Input {
    which: Which,
    /// Plant the signature at these stride-aligned slots before scanning.
    plants: Vec<u16>,
    window: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let signature = match input.which {
        Which::Ibft => Signature::IBFT,
        Which::Abft => Signature::ABFT,
        Which::Sbft => Signature::SBFT,
    };
    let mut window = input.window;
    window.truncate(MAX_WINDOW_LEN);

    for slot in input.plants.iter().take(8) {
        let at = usize::from(*slot) * SCAN_STRIDE;
        if let Some(dst) = window.get_mut(at..at + 4) {
            dst.copy_from_slice(signature.as_bytes());
        }
    }

    if let Ok(Some(table)) = scan_window(&window, WINDOW_BASE, signature) {
        assert_eq!(table.signature(), signature);
        assert!(table.checksum_valid());
        assert!(table.len() <= window.len());
    }
});
