//! iSCSI Boot Firmware Table decoding.
//!
//! The table starts with the common ACPI header, followed by a Control structure
//! at offset 48. The Control structure holds 16-bit offsets to the Initiator, NIC
//! and Target structures. Every offset is untrusted and is bounds-checked
//! against the captured table before anything behind it is read; a bad offset
//! only loses the structure it points at.

use core::fmt;
use core::net::Ipv4Addr;

use bitflags::bitflags;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::acpi::{AcpiHeader, AcpiTable, Signature};
use crate::error::DecodeError;
use crate::net::{subnet_mask, IbftIpAddr, Lun, MacAddr, Secret, IBFT_IP_LEN};
use crate::reader::TableReader;

/// Offset of the Control structure from the start of the table.
pub const CONTROL_OFFSET: usize = 48;

/// Size of the header that starts every iBFT structure.
pub const STRUCTURE_HEADER_LEN: usize = 6;

/// Control structure length used by the fixed two-NIC/two-target layout.
pub const FIXED_CONTROL_LEN: u16 = 18;

pub const INITIATOR_LEN: usize = 74;
pub const NIC_LEN: usize = 102;
pub const TARGET_LEN: usize = 54;

/// Offset of the gateway field within a NIC structure.
pub const NIC_GATEWAY_OFFSET: usize = 24;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct InitiatorFlags: u8 {
        const VALID = 0x01;
        const BOOT_SELECTED = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct NicFlags: u8 {
        const VALID = 0x01;
        const BOOT_SELECTED = 0x02;
        /// Global address; clear means link-local.
        const GLOBAL = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TargetFlags: u8 {
        const VALID = 0x01;
        const BOOT_SELECTED = 0x02;
        const RADIUS_CHAP = 0x04;
        const RADIUS_RCHAP = 0x08;
    }
}

fn serialize_bits<F, S>(flags: &F, serializer: S) -> Result<S::Ok, S::Error>
where
    F: bitflags::Flags<Bits = u8>,
    S: Serializer,
{
    serializer.serialize_u8(flags.bits())
}

/// iBFT structure IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Control,
    Initiator,
    Nic,
    Target,
    Extensions,
}

impl StructureKind {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Control),
            2 => Some(Self::Initiator),
            3 => Some(Self::Nic),
            4 => Some(Self::Target),
            5 => Some(Self::Extensions),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Control => 1,
            Self::Initiator => 2,
            Self::Nic => 3,
            Self::Target => 4,
            Self::Extensions => 5,
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Control => "Control",
            Self::Initiator => "Initiator",
            Self::Nic => "NIC",
            Self::Target => "Target",
            Self::Extensions => "Extensions",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StructureHeader {
    pub structure_id: u8,
    pub version: u8,
    pub length: u16,
    pub index: u8,
    pub flags: u8,
}

impl StructureHeader {
    pub fn parse(r: &TableReader<'_>, offset: usize) -> Result<Self, DecodeError> {
        Ok(Self {
            structure_id: r.u8(offset)?,
            version: r.u8(offset + 1)?,
            length: r.u16(offset + 2)?,
            index: r.u8(offset + 4)?,
            flags: r.u8(offset + 5)?,
        })
    }

    pub fn kind(&self) -> Option<StructureKind> {
        StructureKind::from_id(self.structure_id)
    }
}

/// A `{length, offset}` reference to a string elsewhere in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IbftString {
    pub length: u16,
    pub offset: u16,
}

impl IbftString {
    fn parse(r: &TableReader<'_>, offset: usize) -> Result<Self, DecodeError> {
        Ok(Self {
            length: r.u16(offset)?,
            offset: r.u16(offset + 2)?,
        })
    }

    pub fn is_present(&self) -> bool {
        self.offset != 0
    }

    /// Read the string from the table. Absent or out-of-range strings read as
    /// empty; the string ends at `length` or the first NUL.
    fn resolve(&self, table: &TableReader<'_>, what: &str) -> String {
        if !self.is_present() {
            return String::new();
        }
        match table.bytes(usize::from(self.offset), usize::from(self.length)) {
            Ok(bytes) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
            Err(err) => {
                warn!("iBFT {what} string ignored: {err}");
                String::new()
            }
        }
    }
}

fn ip_at(r: &TableReader<'_>, offset: usize) -> Result<IbftIpAddr, DecodeError> {
    r.array::<IBFT_IP_LEN>(offset).map(IbftIpAddr::from_bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IbftControl {
    pub header: StructureHeader,
    /// The 16-bit structure offsets following the Control header, in order.
    pub slots: Vec<u16>,
}

/// How the Control structure lists its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlLayout {
    /// Extensions, Initiator, NIC 0, Target 0, NIC 1, Target 1.
    Fixed,
    /// Any number of offsets, each identified by the tag of the structure it
    /// points at.
    Tagged { slots: usize },
}

impl ControlLayout {
    /// The structure a fixed-layout slot is meant to hold.
    pub fn expected_kind(&self, slot: usize) -> Option<StructureKind> {
        match self {
            Self::Fixed => [
                StructureKind::Extensions,
                StructureKind::Initiator,
                StructureKind::Nic,
                StructureKind::Target,
                StructureKind::Nic,
                StructureKind::Target,
            ]
            .get(slot)
            .copied(),
            Self::Tagged { .. } => None,
        }
    }

    /// The index a fixed-layout slot's structure should carry.
    pub fn expected_index(&self, slot: usize) -> Option<u8> {
        match self {
            Self::Fixed => [0, 0, 0, 0, 1, 1].get(slot).copied(),
            Self::Tagged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Other,
    Manual,
    WellKnown,
    Dhcp,
    RouterAdvertisement,
    Unknown(u8),
}

impl Origin {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Other,
            1 => Self::Manual,
            2 => Self::WellKnown,
            3 => Self::Dhcp,
            4 => Self::RouterAdvertisement,
            n => Self::Unknown(n),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::Manual => 1,
            Self::WellKnown => 2,
            Self::Dhcp => 3,
            Self::RouterAdvertisement => 4,
            Self::Unknown(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapType {
    None,
    OneWay,
    Mutual,
    Unknown(u8),
}

impl ChapType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::OneWay,
            2 => Self::Mutual,
            n => Self::Unknown(n),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::OneWay => 1,
            Self::Mutual => 2,
            Self::Unknown(n) => n,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::OneWay => "One-way",
            Self::Mutual => "Mutual",
            Self::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IbftInitiator {
    pub index: u8,
    #[serde(serialize_with = "serialize_bits")]
    pub flags: InitiatorFlags,
    pub isns_server: IbftIpAddr,
    pub slp_server: IbftIpAddr,
    pub radius: [IbftIpAddr; 2],
    pub name: String,
}

impl IbftInitiator {
    fn parse(
        header: &StructureHeader,
        r: &TableReader<'_>,
        table: &TableReader<'_>,
    ) -> Result<Self, DecodeError> {
        let flags = InitiatorFlags::from_bits_retain(header.flags);
        let valid = flags.contains(InitiatorFlags::VALID);
        let name = IbftString::parse(r, 70)?;
        Ok(Self {
            index: header.index,
            flags,
            isns_server: ip_at(r, 6)?,
            slp_server: ip_at(r, 22)?,
            radius: [ip_at(r, 38)?, ip_at(r, 54)?],
            name: if valid {
                name.resolve(table, "initiator name")
            } else {
                String::new()
            },
        })
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(InitiatorFlags::VALID)
    }
}

impl fmt::Display for IbftInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found iBFT Initiator {}:", self.index)?;
        write!(f, "  Flags = {:#x}", self.flags.bits())?;
        if self.flags.contains(InitiatorFlags::VALID) {
            f.write_str(", valid")?;
        }
        if self.flags.contains(InitiatorFlags::BOOT_SELECTED) {
            f.write_str(", boot selected")?;
        }
        if !self.is_valid() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "  iSNS = {}", self.isns_server)?;
        writeln!(f, "  SLP = {}", self.slp_server)?;
        writeln!(f, "  Radius = {}, {}", self.radius[0], self.radius[1])?;
        write!(f, "  Name = {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IbftNic {
    pub index: u8,
    #[serde(serialize_with = "serialize_bits")]
    pub flags: NicFlags,
    pub ip: IbftIpAddr,
    pub prefix: u8,
    pub origin: Origin,
    pub gateway: IbftIpAddr,
    pub dns: [IbftIpAddr; 2],
    pub dhcp: IbftIpAddr,
    pub vlan: u16,
    pub mac: MacAddr,
    /// PCI bus (bits 8..16), device (3..8) and function (0..3).
    pub pci_bdf: u16,
    pub hostname: String,
}

impl IbftNic {
    fn parse(
        header: &StructureHeader,
        r: &TableReader<'_>,
        table: &TableReader<'_>,
    ) -> Result<Self, DecodeError> {
        let flags = NicFlags::from_bits_retain(header.flags);
        let hostname = IbftString::parse(r, 98)?;
        Ok(Self {
            index: header.index,
            flags,
            ip: ip_at(r, 6)?,
            prefix: r.u8(22)?,
            origin: Origin::from_raw(r.u8(23)?),
            gateway: ip_at(r, NIC_GATEWAY_OFFSET)?,
            dns: [ip_at(r, 40)?, ip_at(r, 56)?],
            dhcp: ip_at(r, 72)?,
            vlan: r.u16(88)?,
            mac: MacAddr(r.array(90)?),
            pci_bdf: r.u16(96)?,
            hostname: if flags.contains(NicFlags::VALID) {
                hostname.resolve(table, "NIC hostname")
            } else {
                String::new()
            },
        })
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(NicFlags::VALID)
    }

    pub fn is_boot_selected(&self) -> bool {
        self.flags.contains(NicFlags::BOOT_SELECTED)
    }

    pub fn pci_bus(&self) -> u8 {
        (self.pci_bdf >> 8) as u8
    }

    pub fn pci_device(&self) -> u8 {
        ((self.pci_bdf >> 3) & 0x1f) as u8
    }

    pub fn pci_function(&self) -> u8 {
        (self.pci_bdf & 0x07) as u8
    }
}

impl fmt::Display for IbftNic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found iBFT NIC {}:", self.index)?;
        write!(f, "  Flags = {:#x}", self.flags.bits())?;
        if self.flags.contains(NicFlags::VALID) {
            f.write_str(", valid")?;
        }
        if self.flags.contains(NicFlags::BOOT_SELECTED) {
            f.write_str(", boot selected")?;
        }
        if self.flags.contains(NicFlags::GLOBAL) {
            f.write_str(", global address")?;
        } else {
            f.write_str(", link local address")?;
        }
        if !self.is_valid() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "  IP = {}/{}", self.ip, subnet_mask(self.prefix))?;
        writeln!(f, "  Origin = {}", self.origin.raw())?;
        writeln!(f, "  Gateway = {}", self.gateway)?;
        writeln!(f, "  DNS = {}, {}", self.dns[0], self.dns[1])?;
        writeln!(f, "  DHCP = {}", self.dhcp)?;
        writeln!(f, "  VLAN = {:04x}", self.vlan)?;
        writeln!(f, "  MAC = {}", self.mac)?;
        writeln!(
            f,
            "  PCI = {:02x}:{:02x}.{:x}",
            self.pci_bus(),
            self.pci_device(),
            self.pci_function()
        )?;
        write!(f, "  Hostname = {}", self.hostname)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IbftTarget {
    pub index: u8,
    #[serde(serialize_with = "serialize_bits")]
    pub flags: TargetFlags,
    pub ip: IbftIpAddr,
    pub port: u16,
    pub lun: Lun,
    pub chap_type: ChapType,
    pub nic_association: u8,
    pub name: String,
    pub chap_name: String,
    pub chap_secret: Secret,
    pub reverse_chap_name: String,
    pub reverse_chap_secret: Secret,
}

impl IbftTarget {
    fn parse(
        header: &StructureHeader,
        r: &TableReader<'_>,
        table: &TableReader<'_>,
    ) -> Result<Self, DecodeError> {
        let flags = TargetFlags::from_bits_retain(header.flags);
        let strings = [
            IbftString::parse(r, 34)?,
            IbftString::parse(r, 38)?,
            IbftString::parse(r, 42)?,
            IbftString::parse(r, 46)?,
            IbftString::parse(r, 50)?,
        ];
        let [name, chap_name, chap_secret, reverse_chap_name, reverse_chap_secret] =
            if flags.contains(TargetFlags::VALID) {
                [
                    strings[0].resolve(table, "target name"),
                    strings[1].resolve(table, "CHAP name"),
                    strings[2].resolve(table, "CHAP secret"),
                    strings[3].resolve(table, "reverse CHAP name"),
                    strings[4].resolve(table, "reverse CHAP secret"),
                ]
            } else {
                Default::default()
            };
        Ok(Self {
            index: header.index,
            flags,
            ip: ip_at(r, 6)?,
            port: r.u16(22)?,
            lun: Lun(r.array(24)?),
            chap_type: ChapType::from_raw(r.u8(32)?),
            nic_association: r.u8(33)?,
            name,
            chap_name,
            chap_secret: Secret::new(chap_secret),
            reverse_chap_name,
            reverse_chap_secret: Secret::new(reverse_chap_secret),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(TargetFlags::VALID)
    }

    pub fn is_boot_selected(&self) -> bool {
        self.flags.contains(TargetFlags::BOOT_SELECTED)
    }
}

impl fmt::Display for IbftTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found iBFT target {}:", self.index)?;
        write!(f, "  Flags = {:#x}", self.flags.bits())?;
        for (flag, label) in [
            (TargetFlags::VALID, ", valid"),
            (TargetFlags::BOOT_SELECTED, ", boot selected"),
            (TargetFlags::RADIUS_CHAP, ", Radius CHAP"),
            (TargetFlags::RADIUS_RCHAP, ", Radius rCHAP"),
        ] {
            if self.flags.contains(flag) {
                f.write_str(label)?;
            }
        }
        if !self.is_valid() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "  IP = {}", self.ip)?;
        writeln!(f, "  Port = {}", self.port)?;
        writeln!(f, "  LUN = {}", self.lun)?;
        writeln!(
            f,
            "  CHAP type = {} ({})",
            self.chap_type.raw(),
            self.chap_type.label()
        )?;
        writeln!(f, "  NIC = {}", self.nic_association)?;
        writeln!(f, "  Name = {}", self.name)?;
        writeln!(f, "  CHAP name = {}", self.chap_name)?;
        writeln!(f, "  CHAP secret = {}", self.chap_secret)?;
        writeln!(f, "  Reverse CHAP name = {}", self.reverse_chap_name)?;
        write!(f, "  Reverse CHAP secret = {}", self.reverse_chap_secret)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IbftStructure {
    Initiator(IbftInitiator),
    Nic(IbftNic),
    Target(IbftTarget),
    /// Any other structure ID, including Control and Extensions reached through
    /// a slot. Kept so the dump shows it, otherwise ignored.
    Unknown { header: StructureHeader },
}

impl fmt::Display for IbftStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator(initiator) => fmt::Display::fmt(initiator, f),
            Self::Nic(nic) => fmt::Display::fmt(nic, f),
            Self::Target(target) => fmt::Display::fmt(target, f),
            Self::Unknown { header } => write!(
                f,
                "Ignoring unknown iBFT structure ID {} index {}",
                header.structure_id, header.index
            ),
        }
    }
}

/// A decoded structure together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IbftEntry {
    /// Position of the offset within the Control structure.
    pub slot: usize,
    /// Byte offset of the structure from the start of the table.
    pub offset: u16,
    pub structure: IbftStructure,
}

/// The fields a disk-matching consumer needs to recognise the boot disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootTargetInfo {
    pub index: u8,
    pub boot_selected: bool,
    pub ip: IbftIpAddr,
    pub port: u16,
    pub lun: Lun,
    pub name: String,
    pub chap_type: ChapType,
    pub chap_name: String,
    pub chap_secret: Secret,
    pub reverse_chap_name: String,
    pub reverse_chap_secret: Secret,
    pub nic_association: u8,
    /// MAC of the valid NIC whose index matches `nic_association`, if any.
    pub nic_mac: Option<MacAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ibft {
    #[serde(rename = "header", serialize_with = "serialize_table_header")]
    table: AcpiTable,
    control: IbftControl,
    layout: ControlLayout,
    entries: Vec<IbftEntry>,
}

fn serialize_table_header<S: Serializer>(
    table: &AcpiTable,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    AcpiHeader::serialize(table.header(), serializer)
}

impl Ibft {
    /// Decode a captured iBFT.
    ///
    /// Only a wrong signature or a table too short for the Control header is an
    /// error. Malformed structures are logged and skipped.
    pub fn parse(table: AcpiTable) -> Result<Self, DecodeError> {
        table.expect_signature(Signature::IBFT)?;
        let r = table.reader();
        if r.len() < CONTROL_OFFSET + STRUCTURE_HEADER_LEN {
            return Err(DecodeError::Truncated {
                what: "iBFT control structure",
                need: CONTROL_OFFSET + STRUCTURE_HEADER_LEN,
                have: r.len(),
            });
        }

        let header = StructureHeader::parse(&r, CONTROL_OFFSET)?;
        if header.kind() != Some(StructureKind::Control) {
            warn!(
                "iBFT control structure has ID {}, decoding anyway",
                header.structure_id
            );
        }
        let layout = if header.length == FIXED_CONTROL_LEN {
            ControlLayout::Fixed
        } else {
            let slots = usize::from(header.length).saturating_sub(STRUCTURE_HEADER_LEN) / 2;
            ControlLayout::Tagged { slots }
        };

        let mut control_len = usize::from(header.length);
        let available = r.len() - CONTROL_OFFSET;
        if control_len > available {
            warn!(
                "iBFT control length {control_len} exceeds table, clipping to {available}"
            );
            control_len = available;
        }
        let slot_count = control_len.saturating_sub(STRUCTURE_HEADER_LEN) / 2;
        let slots = (0..slot_count)
            .map(|i| r.u16(CONTROL_OFFSET + STRUCTURE_HEADER_LEN + 2 * i))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries: Vec<IbftEntry> = Vec::new();
        for (slot, &offset) in slots.iter().enumerate() {
            if offset == 0 {
                continue;
            }
            if entries.iter().any(|e| e.offset == offset) {
                warn!("iBFT slot {slot} repeats offset {offset:#x}, skipping");
                continue;
            }
            match decode_structure(&r, layout, slot, offset) {
                Ok(structure) => entries.push(IbftEntry {
                    slot,
                    offset,
                    structure,
                }),
                Err(err) => warn!("iBFT slot {slot} at offset {offset:#x} skipped: {err}"),
            }
        }

        Ok(Self {
            table,
            control: IbftControl { header, slots },
            layout,
            entries,
        })
    }

    pub fn table(&self) -> &AcpiTable {
        &self.table
    }

    pub fn control(&self) -> &IbftControl {
        &self.control
    }

    pub fn layout(&self) -> ControlLayout {
        self.layout
    }

    pub fn entries(&self) -> &[IbftEntry] {
        &self.entries
    }

    pub fn initiators(&self) -> impl Iterator<Item = &IbftInitiator> + '_ {
        self.entries.iter().filter_map(|e| match &e.structure {
            IbftStructure::Initiator(initiator) => Some(initiator),
            _ => None,
        })
    }

    pub fn nics(&self) -> impl Iterator<Item = &IbftNic> + '_ {
        self.entries.iter().filter_map(|e| match &e.structure {
            IbftStructure::Nic(nic) => Some(nic),
            _ => None,
        })
    }

    pub fn targets(&self) -> impl Iterator<Item = &IbftTarget> + '_ {
        self.entries.iter().filter_map(|e| match &e.structure {
            IbftStructure::Target(target) => Some(target),
            _ => None,
        })
    }

    /// Emit the diagnostic dump, one log line per rendered line.
    pub fn log_summary(&self) {
        for entry in &self.entries {
            for line in entry.structure.to_string().lines() {
                info!("{line}");
            }
        }
    }

    /// Connection details of every valid target.
    pub fn boot_targets(&self) -> Vec<BootTargetInfo> {
        self.targets()
            .filter(|t| t.is_valid())
            .map(|t| BootTargetInfo {
                index: t.index,
                boot_selected: t.is_boot_selected(),
                ip: t.ip,
                port: t.port,
                lun: t.lun,
                name: t.name.clone(),
                chap_type: t.chap_type,
                chap_name: t.chap_name.clone(),
                chap_secret: t.chap_secret.clone(),
                reverse_chap_name: t.reverse_chap_name.clone(),
                reverse_chap_secret: t.reverse_chap_secret.clone(),
                nic_association: t.nic_association,
                nic_mac: self
                    .nics()
                    .find(|n| n.is_valid() && n.index == t.nic_association)
                    .map(|n| n.mac),
            })
            .collect()
    }

    /// Rewrite the gateway of the NIC at `entry`, in both the decoded record and
    /// the captured table bytes. The table checksum is re-balanced.
    pub(crate) fn set_nic_gateway(
        &mut self,
        entry: usize,
        gateway: Ipv4Addr,
    ) -> Result<(), DecodeError> {
        let Some(IbftEntry {
            offset,
            structure: IbftStructure::Nic(nic),
            ..
        }) = self.entries.get_mut(entry)
        else {
            return Ok(());
        };
        let encoded = IbftIpAddr::from_ipv4(gateway);
        self.table
            .patch(usize::from(*offset) + NIC_GATEWAY_OFFSET, encoded.as_bytes())?;
        nic.gateway = encoded;
        Ok(())
    }
}

fn decode_structure(
    r: &TableReader<'_>,
    layout: ControlLayout,
    slot: usize,
    offset: u16,
) -> Result<IbftStructure, DecodeError> {
    let offset = usize::from(offset);
    let header = StructureHeader::parse(r, offset)?;
    // The declared length must lie inside the table.
    r.bytes(offset, usize::from(header.length))?;

    let kind = header.kind();
    if let Some(expected) = layout.expected_kind(slot) {
        if kind != Some(expected) {
            warn!(
                "iBFT slot {slot} should hold a {expected} structure but holds ID {}",
                header.structure_id
            );
        } else if let Some(index) = layout.expected_index(slot) {
            if header.index != index {
                warn!(
                    "iBFT slot {slot} should hold {expected} {index} but holds index {}",
                    header.index
                );
            }
        }
    }

    let (what, fixed_len) = match kind {
        Some(StructureKind::Initiator) => ("iBFT initiator", INITIATOR_LEN),
        Some(StructureKind::Nic) => ("iBFT NIC", NIC_LEN),
        Some(StructureKind::Target) => ("iBFT target", TARGET_LEN),
        _ => {
            info!(
                "Ignoring unknown iBFT structure ID {} index {}",
                header.structure_id, header.index
            );
            return Ok(IbftStructure::Unknown { header });
        }
    };
    if usize::from(header.length) < fixed_len {
        return Err(DecodeError::Truncated {
            what,
            need: fixed_len,
            have: usize::from(header.length),
        });
    }
    let s = r.sub(offset, fixed_len)?;
    Ok(match kind {
        Some(StructureKind::Initiator) => {
            IbftStructure::Initiator(IbftInitiator::parse(&header, &s, r)?)
        }
        Some(StructureKind::Nic) => IbftStructure::Nic(IbftNic::parse(&header, &s, r)?),
        _ => IbftStructure::Target(IbftTarget::parse(&header, &s, r)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{IbftBuilder, InitiatorSpec, NicSpec, TargetSpec};

    fn sample() -> Vec<u8> {
        IbftBuilder::new()
            .initiator(InitiatorSpec {
                name: "iqn.2010-04.org.ipxe:client".into(),
                ..Default::default()
            })
            .nic(NicSpec {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                prefix: 24,
                gateway: Ipv4Addr::new(10, 0, 0, 1),
                dns: [Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::UNSPECIFIED],
                mac: MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]),
                pci_bdf: 0x0018,
                hostname: "client".into(),
                ..Default::default()
            })
            .target(TargetSpec {
                ip: Ipv4Addr::new(10, 0, 0, 50),
                port: 3260,
                lun: Lun(0x0001_0000_0000_0000u64.to_le_bytes()),
                name: "iqn.2010-04.org.ipxe:target".into(),
                chap_type: ChapType::OneWay,
                chap_name: "user".into(),
                chap_secret: "secretsecret".into(),
                ..Default::default()
            })
            .build()
    }

    fn parse(bytes: Vec<u8>) -> Ibft {
        Ibft::parse(AcpiTable::from_bytes(bytes).unwrap()).unwrap()
    }

    #[test]
    fn decodes_fixed_layout() {
        let ibft = parse(sample());
        assert_eq!(ibft.layout(), ControlLayout::Fixed);
        assert_eq!(ibft.initiators().count(), 1);

        let nic = ibft.nics().next().unwrap();
        assert!(nic.is_valid());
        assert_eq!(nic.ip.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(nic.prefix, 24);
        assert_eq!(nic.hostname, "client");
        assert_eq!((nic.pci_bus(), nic.pci_device(), nic.pci_function()), (0, 3, 0));

        let target = ibft.targets().next().unwrap();
        assert_eq!(target.port, 3260);
        assert_eq!(target.name, "iqn.2010-04.org.ipxe:target");
        assert_eq!(target.chap_secret.expose(), "secretsecret");
    }

    #[test]
    fn target_dump_redacts_secrets() {
        let ibft = parse(sample());
        let dump = ibft.targets().next().unwrap().to_string();
        assert!(dump.starts_with("Found iBFT target 0:\n  Flags = 0x3, valid, boot selected\n"));
        assert!(dump.contains("  LUN = 0001-0000-0000-0000\n"));
        assert!(dump.contains("  CHAP type = 1 (One-way)\n"));
        assert!(dump.contains("  CHAP secret = <omitted>\n"));
        assert!(dump.ends_with("  Reverse CHAP secret = "));
        assert!(!dump.contains("secretsecret"));
    }

    #[test]
    fn nic_dump_format() {
        let ibft = parse(sample());
        let dump = ibft.nics().next().unwrap().to_string();
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(
            lines,
            [
                "Found iBFT NIC 0:",
                "  Flags = 0x7, valid, boot selected, global address",
                "  IP = 10.0.0.5/255.255.255.0",
                "  Origin = 1",
                "  Gateway = 10.0.0.1",
                "  DNS = 10.0.0.2, 0.0.0.0",
                "  DHCP = 0.0.0.0",
                "  VLAN = 0000",
                "  MAC = 52:54:00:12:34:56",
                "  PCI = 00:03.0",
                "  Hostname = client",
            ]
        );
    }

    #[test]
    fn invalid_block_shows_flags_only() {
        let bytes = IbftBuilder::new()
            .nic(NicSpec {
                valid: false,
                hostname: "hidden".into(),
                ..Default::default()
            })
            .build();
        let ibft = parse(bytes);
        let nic = ibft.nics().next().unwrap();
        assert!(!nic.is_valid());
        assert_eq!(nic.hostname, "");
        assert_eq!(
            nic.to_string(),
            "Found iBFT NIC 0:\n  Flags = 0x6, boot selected, global address"
        );
    }

    #[test]
    fn invalid_target_shows_flags_only() {
        let bytes = IbftBuilder::new()
            .nic(NicSpec::default())
            .target(TargetSpec {
                valid: false,
                ip: Ipv4Addr::new(10, 0, 0, 50),
                name: "iqn.2010-04.org.ipxe:hidden".into(),
                chap_name: "user".into(),
                chap_secret: "secretsecret".into(),
                ..Default::default()
            })
            .build();
        let ibft = parse(bytes);
        let target = ibft.targets().next().unwrap();
        assert!(!target.is_valid());
        assert_eq!(target.name, "");
        assert_eq!(target.chap_name, "");
        assert_eq!(
            target.to_string(),
            "Found iBFT target 0:\n  Flags = 0x2, boot selected"
        );
        assert!(ibft.boot_targets().is_empty());
    }

    #[test]
    fn shared_offset_is_decoded_once() {
        let mut bytes = IbftBuilder::new()
            .tagged()
            .nic(NicSpec::default())
            .nic(NicSpec::default())
            .build();
        let ibft = parse(bytes.clone());
        let nics: Vec<_> = ibft
            .entries()
            .iter()
            .filter(|e| matches!(e.structure, IbftStructure::Nic(_)))
            .map(|e| (e.slot, e.offset))
            .collect();
        assert_eq!(nics.len(), 2);
        let pos = CONTROL_OFFSET + STRUCTURE_HEADER_LEN + 2 * nics[1].0;
        bytes[pos..pos + 2].copy_from_slice(&nics[0].1.to_le_bytes());

        let ibft = parse(bytes);
        assert_eq!(ibft.nics().count(), 1);
        assert_eq!(ibft.control().slots[nics[1].0], nics[0].1);
    }

    #[test]
    fn fixed_slot_index_mismatch_still_decodes() {
        let mut bytes = sample();
        let ibft = parse(bytes.clone());
        let nic_offset = ibft
            .entries()
            .iter()
            .find(|e| matches!(e.structure, IbftStructure::Nic(_)))
            .unwrap()
            .offset as usize;
        bytes[nic_offset + 4] = 5;
        let ibft = parse(bytes);
        assert_eq!(ibft.nics().next().unwrap().index, 5);
    }

    #[test]
    fn fixed_layout_slot_expectations() {
        let layout = ControlLayout::Fixed;
        assert_eq!(layout.expected_kind(4), Some(StructureKind::Nic));
        assert_eq!(layout.expected_index(4), Some(1));
        assert_eq!(layout.expected_index(3), Some(0));
        assert_eq!(layout.expected_index(6), None);
        assert_eq!(ControlLayout::Tagged { slots: 9 }.expected_index(2), None);
    }

    #[test]
    fn tagged_layout_is_detected() {
        let bytes = IbftBuilder::new()
            .tagged()
            .nic(NicSpec::default())
            .nic(NicSpec::default())
            .nic(NicSpec::default())
            .target(TargetSpec::default())
            .build();
        let ibft = parse(bytes);
        assert!(matches!(ibft.layout(), ControlLayout::Tagged { .. }));
        assert_eq!(ibft.nics().count(), 3);
        assert_eq!(ibft.targets().count(), 1);
        let indices: Vec<_> = ibft.nics().map(|n| n.index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn out_of_range_offset_skips_only_that_slot() {
        let mut bytes = sample();
        // Point the initiator slot far past the end.
        bytes[CONTROL_OFFSET + 8..CONTROL_OFFSET + 10].copy_from_slice(&0xfff0u16.to_le_bytes());
        let ibft = parse(bytes);
        assert_eq!(ibft.initiators().count(), 0);
        assert_eq!(ibft.nics().count(), 1);
        assert_eq!(ibft.targets().count(), 1);
    }

    #[test]
    fn out_of_range_string_reads_empty() {
        let mut bytes = sample();
        let ibft = parse(bytes.clone());
        let nic_offset = ibft
            .entries()
            .iter()
            .find(|e| matches!(e.structure, IbftStructure::Nic(_)))
            .unwrap()
            .offset as usize;
        // Hostname string offset.
        bytes[nic_offset + 100..nic_offset + 102].copy_from_slice(&0xfffeu16.to_le_bytes());
        let ibft = parse(bytes);
        assert_eq!(ibft.nics().next().unwrap().hostname, "");
    }

    #[test]
    fn unknown_structure_is_kept() {
        let mut bytes = sample();
        let ibft = parse(bytes.clone());
        let target_offset = ibft
            .entries()
            .iter()
            .find(|e| matches!(e.structure, IbftStructure::Target(_)))
            .unwrap()
            .offset as usize;
        bytes[target_offset] = 0x42;
        let ibft = parse(bytes);
        assert_eq!(ibft.targets().count(), 0);
        let unknown = ibft
            .entries()
            .iter()
            .find_map(|e| match &e.structure {
                IbftStructure::Unknown { header } => Some(*header),
                _ => None,
            })
            .unwrap();
        assert_eq!(unknown.structure_id, 0x42);
    }

    #[test]
    fn slot_role_mismatch_is_decoded_by_tag() {
        let mut bytes = sample();
        // Swap the NIC 0 and target 0 offsets.
        let nic = CONTROL_OFFSET + 10;
        let target = CONTROL_OFFSET + 12;
        let (a, b) = (
            [bytes[nic], bytes[nic + 1]],
            [bytes[target], bytes[target + 1]],
        );
        bytes[nic..nic + 2].copy_from_slice(&b);
        bytes[target..target + 2].copy_from_slice(&a);
        let ibft = parse(bytes);
        assert_eq!(ibft.nics().count(), 1);
        assert_eq!(ibft.targets().count(), 1);
        assert_eq!(ibft.entries()[1].slot, 2);
        assert!(matches!(ibft.entries()[1].structure, IbftStructure::Target(_)));
    }

    #[test]
    fn control_length_is_clipped_to_table() {
        let mut bytes = sample();
        bytes[CONTROL_OFFSET + 2..CONTROL_OFFSET + 4].copy_from_slice(&0xffffu16.to_le_bytes());
        let len = bytes.len();
        let ibft = parse(bytes);
        assert_eq!(
            ibft.control().slots.len(),
            (len - CONTROL_OFFSET - STRUCTURE_HEADER_LEN) / 2
        );
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let mut bytes = sample();
        bytes[0..4].copy_from_slice(b"aBFT");
        let err = Ibft::parse(AcpiTable::from_bytes(bytes).unwrap()).unwrap_err();
        assert!(matches!(err, DecodeError::WrongSignature { .. }));
    }

    #[test]
    fn boot_targets_carry_nic_mac() {
        let ibft = parse(sample());
        let targets = ibft.boot_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(
            targets[0].nic_mac,
            Some(MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]))
        );
        assert_eq!(targets[0].lun.to_string(), "0001-0000-0000-0000");
    }

    #[test]
    fn json_never_contains_secret() {
        let ibft = parse(sample());
        let json = serde_json::to_string(&ibft).unwrap();
        assert!(json.contains("\"<omitted>\""));
        assert!(!json.contains("secretsecret"));
        assert!(json.contains("\"signature\":\"iBFT\""));
    }
}
