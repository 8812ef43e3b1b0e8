//! Address and identifier types shared by the boot firmware tables.

use core::fmt;
use core::net::{Ipv4Addr, Ipv6Addr};

use serde::{Serialize, Serializer};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An 8-byte SCSI logical unit number, stored little-endian.
///
/// Displayed as four 16-bit hex groups, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lun(pub [u8; 8]);

impl Lun {
    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

impl fmt::Display for Lun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lun = self.as_u64();
        write!(
            f,
            "{:04x}-{:04x}-{:04x}-{:04x}",
            (lun >> 48) & 0xffff,
            (lun >> 32) & 0xffff,
            (lun >> 16) & 0xffff,
            lun & 0xffff
        )
    }
}

impl Serialize for Lun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An 8-byte SCSI LUN in SAM format, displayed byte by byte in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScsiLun(pub [u8; 8]);

impl fmt::Display for ScsiLun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl Serialize for ScsiLun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An opaque fixed-width identifier (SRP port ID, InfiniBand GID, service ID),
/// displayed as `0x` followed by the bytes in table order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexId<const N: usize>(pub [u8; N]);

pub type PortId = HexId<16>;
pub type Gid = HexId<16>;
pub type ServiceId = HexId<8>;

impl<const N: usize> Default for HexId<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> fmt::Display for HexId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for HexId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<const N: usize> Serialize for HexId<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Size of an iBFT IP address field.
pub const IBFT_IP_LEN: usize = 16;

/// A 16-byte iBFT IP address field.
///
/// IPv4 addresses are stored IPv4-mapped: ten zero bytes, `0xffff`, then the
/// address. An IPv4 address of `0.0.0.0` means "not present". Some firmware
/// leaves the `0xffff` marker out, so a field whose first twelve bytes are all
/// zero is read as IPv4 too.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IbftIpAddr([u8; IBFT_IP_LEN]);

impl IbftIpAddr {
    pub const ABSENT: Self = Self([0; IBFT_IP_LEN]);

    pub fn from_bytes(bytes: [u8; IBFT_IP_LEN]) -> Self {
        Self(bytes)
    }

    /// Encode an IPv4 address. The `0xffff` marker is only written for a present
    /// (non-zero) address.
    pub fn from_ipv4(addr: Ipv4Addr) -> Self {
        let mut bytes = [0u8; IBFT_IP_LEN];
        if !addr.is_unspecified() {
            bytes[10..12].copy_from_slice(&[0xff, 0xff]);
            bytes[12..16].copy_from_slice(&addr.octets());
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IBFT_IP_LEN] {
        &self.0
    }

    fn is_ipv4_form(&self) -> bool {
        self.0[..10].iter().all(|&b| b == 0) && matches!(self.0[10..12], [0, 0] | [0xff, 0xff])
    }

    /// The IPv4 address, if this field holds one and it is non-zero.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        if !self.is_ipv4_form() {
            return None;
        }
        let addr = Ipv4Addr::new(self.0[12], self.0[13], self.0[14], self.0[15]);
        (!addr.is_unspecified()).then_some(addr)
    }

    /// The IPv6 address, for fields that are neither IPv4 nor absent.
    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        (!self.is_ipv4_form()).then(|| Ipv6Addr::from(self.0))
    }

    pub fn is_present(&self) -> bool {
        self.ipv4().is_some() || self.ipv6().is_some()
    }
}

impl From<Ipv4Addr> for IbftIpAddr {
    fn from(addr: Ipv4Addr) -> Self {
        Self::from_ipv4(addr)
    }
}

impl fmt::Display for IbftIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ipv4(), self.ipv6()) {
            (Some(v4), _) => write!(f, "{v4}"),
            (None, Some(v6)) => write!(f, "{v6}"),
            (None, None) => f.write_str("0.0.0.0"),
        }
    }
}

impl fmt::Debug for IbftIpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IbftIpAddr({self})")
    }
}

impl Serialize for IbftIpAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_present() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_none()
        }
    }
}

/// Convert a prefix length into a dotted-quad subnet mask.
///
/// Prefixes above 32 are treated as 32.
pub fn subnet_mask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    Ipv4Addr::from(mask)
}

/// Placeholder printed in place of any non-empty secret.
pub const REDACTED: &str = "<omitted>";

/// A CHAP secret. Never rendered in cleartext.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The cleartext secret, for handing to the iSCSI initiator.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            f.write_str(REDACTED)
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({self})")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
