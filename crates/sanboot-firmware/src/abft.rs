//! AoE Boot Firmware Table.

use core::fmt;

use serde::Serialize;
use tracing::info;

use crate::acpi::{AcpiTable, Signature};
use crate::error::DecodeError;
use crate::net::MacAddr;

/// Header plus shelf, slot, reserved byte and client MAC.
pub const ABFT_MIN_LEN: usize = 46;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Abft {
    pub shelf: u16,
    pub slot: u8,
    pub mac: MacAddr,
}

impl Abft {
    pub fn parse(table: &AcpiTable) -> Result<Self, DecodeError> {
        table.expect_signature(Signature::ABFT)?;
        let r = table.reader();
        if r.len() < ABFT_MIN_LEN {
            return Err(DecodeError::Truncated {
                what: "aBFT",
                need: ABFT_MIN_LEN,
                have: r.len(),
            });
        }
        Ok(Self {
            shelf: r.u16(36)?,
            slot: r.u8(38)?,
            mac: MacAddr(r.array(40)?),
        })
    }

    /// The AoE target name, `e<shelf>.<slot>`.
    pub fn target_name(&self) -> String {
        format!("e{}.{}", self.shelf, self.slot)
    }

    pub fn log_summary(&self) {
        for line in self.to_string().lines() {
            info!("{line}");
        }
    }
}

impl fmt::Display for Abft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found aBFT target e{}.{}", self.shelf, self.slot)?;
        write!(f, "Found aBFT NIC {}", self.mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AbftBuilder;

    #[test]
    fn decodes_target_and_mac() {
        let bytes = AbftBuilder::new(3, 1, MacAddr([0, 0x0c, 0x29, 0xaa, 0xbb, 0xcc])).build();
        let abft = Abft::parse(&AcpiTable::from_bytes(bytes).unwrap()).unwrap();
        assert_eq!(abft.target_name(), "e3.1");
        assert_eq!(
            abft.to_string(),
            "Found aBFT target e3.1\nFound aBFT NIC 00:0c:29:aa:bb:cc"
        );
    }

    #[test]
    fn short_table_is_rejected() {
        let mut bytes = AbftBuilder::new(0, 0, MacAddr::default()).build();
        bytes.truncate(44);
        bytes[4..8].copy_from_slice(&44u32.to_le_bytes());
        let err = Abft::parse(&AcpiTable::from_bytes(bytes).unwrap()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                what: "aBFT",
                need: 46,
                have: 44
            }
        );
    }
}
