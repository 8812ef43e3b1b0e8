//! The ACPI description header shared by every boot firmware table, and the
//! owned copy of a captured table.

use core::fmt;

use serde::{Serialize, Serializer};

use crate::checksum::{checksum_fixup, checksum_valid};
use crate::error::DecodeError;
use crate::reader::TableReader;

/// Size of the common ACPI description header.
pub const HEADER_LEN: usize = 36;

/// Offset of the checksum byte within the header.
pub const CHECKSUM_OFFSET: usize = 9;

/// A 4-character table signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 4]);

impl Signature {
    /// iSCSI Boot Firmware Table.
    pub const IBFT: Self = Self(*b"iBFT");
    /// AoE Boot Firmware Table.
    pub const ABFT: Self = Self(*b"aBFT");
    /// SRP Boot Firmware Table.
    pub const SBFT: Self = Self(*b"sBFT");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ascii_field(&self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:?})", ascii_field(&self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Render a fixed-width ASCII header field, stopping at the first NUL.
///
/// Non-printable bytes are replaced with `.` so firmware garbage cannot corrupt log
/// output.
pub fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AcpiHeader {
    pub signature: Signature,
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    #[serde(serialize_with = "serialize_ascii")]
    pub oem_id: [u8; 6],
    #[serde(serialize_with = "serialize_ascii")]
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    #[serde(serialize_with = "serialize_ascii")]
    pub asl_compiler_id: [u8; 4],
    pub asl_compiler_revision: u32,
}

fn serialize_ascii<S: Serializer, const N: usize>(
    bytes: &[u8; N],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ascii_field(bytes))
}

impl AcpiHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let r = TableReader::new(bytes);
        if r.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                what: "ACPI header",
                need: HEADER_LEN,
                have: r.len(),
            });
        }
        Ok(Self {
            signature: Signature(r.array(0)?),
            length: r.u32(4)?,
            revision: r.u8(8)?,
            checksum: r.u8(CHECKSUM_OFFSET)?,
            oem_id: r.array(10)?,
            oem_table_id: r.array(16)?,
            oem_revision: r.u32(24)?,
            asl_compiler_id: r.array(28)?,
            asl_compiler_revision: r.u32(32)?,
        })
    }

    pub fn oem_id(&self) -> String {
        ascii_field(&self.oem_id)
    }

    pub fn oem_table_id(&self) -> String {
        ascii_field(&self.oem_table_id)
    }
}

/// An owned copy of a boot firmware table, exactly `header.length` bytes long.
///
/// These bytes are the export format: consumers that ask for the raw table get
/// them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcpiTable {
    header: AcpiHeader,
    bytes: Vec<u8>,
}

impl AcpiTable {
    /// Take ownership of a table image.
    ///
    /// `bytes` must hold at least `length` bytes as declared by the header; any
    /// trailing bytes beyond that are dropped. The checksum is not verified here.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let header = AcpiHeader::parse(&bytes)?;
        let length = header.length as usize;
        if length < HEADER_LEN || length > bytes.len() {
            return Err(DecodeError::Truncated {
                what: "ACPI table",
                need: length.max(HEADER_LEN),
                have: bytes.len(),
            });
        }
        bytes.truncate(length);
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &AcpiHeader {
        &self.header
    }

    pub fn signature(&self) -> Signature {
        self.header.signature
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn reader(&self) -> TableReader<'_> {
        TableReader::new(&self.bytes)
    }

    pub fn checksum_valid(&self) -> bool {
        checksum_valid(&self.bytes)
    }

    /// Copy the table into `buf`, truncating to `buf.len()`. Returns the number of
    /// bytes copied.
    pub fn copy_to(&self, buf: &mut [u8]) -> usize {
        let len = buf.len().min(self.bytes.len());
        buf[..len].copy_from_slice(&self.bytes[..len]);
        len
    }

    /// Overwrite `data.len()` bytes at `offset` and re-balance the checksum.
    pub(crate) fn patch(&mut self, offset: usize, data: &[u8]) -> Result<(), DecodeError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.bytes.len() && offset >= HEADER_LEN)
            .ok_or(DecodeError::OutOfBounds {
                offset,
                len: data.len(),
                table_len: self.bytes.len(),
            })?;
        self.bytes[offset..end].copy_from_slice(data);
        checksum_fixup(&mut self.bytes, CHECKSUM_OFFSET);
        self.header.checksum = self.bytes[CHECKSUM_OFFSET];
        Ok(())
    }

    /// Require a specific signature.
    pub(crate) fn expect_signature(&self, expected: Signature) -> Result<(), DecodeError> {
        if self.header.signature != expected {
            return Err(DecodeError::WrongSignature {
                expected,
                found: self.header.signature,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(signature: &[u8; 4], length: u32) -> Vec<u8> {
        let mut b = vec![0u8; HEADER_LEN];
        b[0..4].copy_from_slice(signature);
        b[4..8].copy_from_slice(&length.to_le_bytes());
        b[8] = 1;
        b[10..16].copy_from_slice(b"FENSYS");
        b[16..24].copy_from_slice(b"iPXE\0\0\0\0");
        b
    }

    #[test]
    fn parses_header_fields() {
        let header = AcpiHeader::parse(&header_bytes(b"iBFT", 36)).unwrap();
        assert_eq!(header.signature, Signature::IBFT);
        assert_eq!(header.length, 36);
        assert_eq!(header.revision, 1);
        assert_eq!(header.oem_id(), "FENSYS");
        assert_eq!(header.oem_table_id(), "iPXE");
    }

    #[test]
    fn short_header_is_rejected() {
        assert!(matches!(
            AcpiHeader::parse(&[0u8; 35]),
            Err(DecodeError::Truncated { need: 36, have: 35, .. })
        ));
    }

    #[test]
    fn from_bytes_truncates_to_declared_length() {
        let mut bytes = header_bytes(b"aBFT", 40);
        bytes.resize(64, 0xaa);
        let table = AcpiTable::from_bytes(bytes).unwrap();
        assert_eq!(table.len(), 40);
    }

    #[test]
    fn from_bytes_rejects_overlong_length() {
        let bytes = header_bytes(b"aBFT", 100);
        assert!(AcpiTable::from_bytes(bytes).is_err());
        let bytes = header_bytes(b"aBFT", 8);
        assert!(AcpiTable::from_bytes(bytes).is_err());
    }

    #[test]
    fn copy_to_truncates() {
        let table = AcpiTable::from_bytes(header_bytes(b"sBFT", 36)).unwrap();
        let mut small = [0u8; 4];
        assert_eq!(table.copy_to(&mut small), 4);
        assert_eq!(&small, b"sBFT");

        let mut big = [0xffu8; 64];
        assert_eq!(table.copy_to(&mut big), 36);
        assert_eq!(&big[..36], table.as_bytes());
        assert_eq!(big[36], 0xff);
    }

    #[test]
    fn patch_keeps_checksum_valid() {
        let mut bytes = header_bytes(b"iBFT", 48);
        bytes.resize(48, 0);
        checksum_fixup(&mut bytes, CHECKSUM_OFFSET);
        let mut table = AcpiTable::from_bytes(bytes).unwrap();
        assert!(table.checksum_valid());

        table.patch(40, &[1, 2, 3, 4]).unwrap();
        assert!(table.checksum_valid());
        assert_eq!(&table.as_bytes()[40..44], &[1, 2, 3, 4]);
        assert_eq!(table.header().checksum, table.as_bytes()[CHECKSUM_OFFSET]);

        assert!(table.patch(46, &[0; 4]).is_err());
        assert!(table.patch(0, &[0; 4]).is_err());
    }

    #[test]
    fn signature_display_masks_garbage() {
        assert_eq!(Signature(*b"iB\x01T").to_string(), "iB.T");
    }
}
