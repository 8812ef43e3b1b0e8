//! Builders for checksummed boot firmware table images.
//!
//! These produce the byte layout that network boot firmware leaves in memory.
//! They are used by the host tool's tests, the fuzz corpus and any emulator that
//! wants to present a SAN boot environment to a guest.

use core::net::Ipv4Addr;

use crate::acpi::{Signature, CHECKSUM_OFFSET, HEADER_LEN};
use crate::checksum::checksum_fixup;
use crate::ibft::{
    ChapType, InitiatorFlags, NicFlags, Origin, StructureKind, TargetFlags, CONTROL_OFFSET,
    FIXED_CONTROL_LEN, INITIATOR_LEN, NIC_GATEWAY_OFFSET, NIC_LEN, STRUCTURE_HEADER_LEN,
    TARGET_LEN,
};
use crate::net::{IbftIpAddr, Lun, MacAddr};
use crate::sbft::{SbftIb, SbftScsi, SbftSrp, IB_LEN, SCSI_LEN, SRP_LEN};

const DEFAULT_OEM_ID: [u8; 6] = *b"FENSYS";
const DEFAULT_OEM_TABLE_ID: [u8; 8] = *b"iPXE\0\0\0\0";

fn build_header(
    signature: Signature,
    revision: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
) -> [u8; HEADER_LEN] {
    let mut hdr = [0u8; HEADER_LEN];
    hdr[0..4].copy_from_slice(signature.as_bytes());
    // Length and checksum are patched in `finish`.
    hdr[8] = revision;
    hdr[10..16].copy_from_slice(&oem_id);
    hdr[16..24].copy_from_slice(&oem_table_id);
    hdr[24..28].copy_from_slice(&1u32.to_le_bytes());
    hdr
}

fn finish(mut table: Vec<u8>) -> Vec<u8> {
    let len = table.len() as u32;
    table[4..8].copy_from_slice(&len.to_le_bytes());
    checksum_fixup(&mut table, CHECKSUM_OFFSET);
    table
}

fn pad_field<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = s.len().min(N);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_ip(buf: &mut [u8], offset: usize, addr: Ipv4Addr) {
    buf[offset..offset + 16].copy_from_slice(IbftIpAddr::from_ipv4(addr).as_bytes());
}

#[derive(Debug, Clone)]
pub struct InitiatorSpec {
    pub valid: bool,
    pub boot_selected: bool,
    pub isns_server: Ipv4Addr,
    pub slp_server: Ipv4Addr,
    pub radius: [Ipv4Addr; 2],
    pub name: String,
}

impl Default for InitiatorSpec {
    fn default() -> Self {
        Self {
            valid: true,
            boot_selected: true,
            isns_server: Ipv4Addr::UNSPECIFIED,
            slp_server: Ipv4Addr::UNSPECIFIED,
            radius: [Ipv4Addr::UNSPECIFIED; 2],
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NicSpec {
    pub valid: bool,
    pub boot_selected: bool,
    pub global: bool,
    pub ip: Ipv4Addr,
    pub prefix: u8,
    pub origin: Origin,
    pub gateway: Ipv4Addr,
    pub dns: [Ipv4Addr; 2],
    pub dhcp: Ipv4Addr,
    pub vlan: u16,
    pub mac: MacAddr,
    pub pci_bdf: u16,
    pub hostname: String,
}

impl Default for NicSpec {
    fn default() -> Self {
        Self {
            valid: true,
            boot_selected: true,
            global: true,
            ip: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
            origin: Origin::Manual,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: [Ipv4Addr::UNSPECIFIED; 2],
            dhcp: Ipv4Addr::UNSPECIFIED,
            vlan: 0,
            mac: MacAddr::default(),
            pci_bdf: 0,
            hostname: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub valid: bool,
    pub boot_selected: bool,
    pub radius_chap: bool,
    pub radius_rchap: bool,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub lun: Lun,
    pub chap_type: ChapType,
    pub nic_association: u8,
    pub name: String,
    pub chap_name: String,
    pub chap_secret: String,
    pub reverse_chap_name: String,
    pub reverse_chap_secret: String,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            valid: true,
            boot_selected: true,
            radius_chap: false,
            radius_rchap: false,
            ip: Ipv4Addr::UNSPECIFIED,
            port: 3260,
            lun: Lun::default(),
            chap_type: ChapType::None,
            nic_association: 0,
            name: String::new(),
            chap_name: String::new(),
            chap_secret: String::new(),
            reverse_chap_name: String::new(),
            reverse_chap_secret: String::new(),
        }
    }
}

/// Collects strings after the structures and hands back `{length, offset}`
/// references to them.
struct StringHeap {
    base: usize,
    data: Vec<u8>,
}

impl StringHeap {
    fn add(&mut self, s: &str) -> (u16, u16) {
        if s.is_empty() {
            return (0, 0);
        }
        let offset = self.base + self.data.len();
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        (s.len() as u16, offset as u16)
    }

    fn put(&mut self, buf: &mut [u8], field: usize, s: &str) {
        let (len, offset) = self.add(s);
        put_u16(buf, field, len);
        put_u16(buf, field + 2, offset);
    }
}

/// Builds an iBFT image.
///
/// Indices are assigned per structure kind in insertion order. The fixed
/// Control layout holds at most two NICs and two targets; more than that, or an
/// explicit [`IbftBuilder::tagged`], produces the tagged layout.
#[derive(Debug, Clone)]
pub struct IbftBuilder {
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    tagged: bool,
    initiator: Option<InitiatorSpec>,
    nics: Vec<NicSpec>,
    targets: Vec<TargetSpec>,
}

impl Default for IbftBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IbftBuilder {
    pub fn new() -> Self {
        Self {
            oem_id: DEFAULT_OEM_ID,
            oem_table_id: DEFAULT_OEM_TABLE_ID,
            tagged: false,
            initiator: None,
            nics: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn oem_id(mut self, oem_id: &str) -> Self {
        self.oem_id = pad_field(oem_id);
        self
    }

    pub fn oem_table_id(mut self, oem_table_id: &str) -> Self {
        self.oem_table_id = pad_field(oem_table_id);
        self
    }

    pub fn tagged(mut self) -> Self {
        self.tagged = true;
        self
    }

    pub fn initiator(mut self, initiator: InitiatorSpec) -> Self {
        self.initiator = Some(initiator);
        self
    }

    pub fn nic(mut self, nic: NicSpec) -> Self {
        self.nics.push(nic);
        self
    }

    pub fn target(mut self, target: TargetSpec) -> Self {
        self.targets.push(target);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let tagged = self.tagged || self.nics.len() > 2 || self.targets.len() > 2;

        // Structures in table order, with the Control slot each one occupies.
        let mut layout: Vec<(usize, StructureKind, usize)> = Vec::new();
        let mut slot_count;
        if tagged {
            slot_count = 0;
            if self.initiator.is_some() {
                layout.push((slot_count, StructureKind::Initiator, 0));
                slot_count += 1;
            }
            for i in 0..self.nics.len() {
                layout.push((slot_count, StructureKind::Nic, i));
                slot_count += 1;
            }
            for i in 0..self.targets.len() {
                layout.push((slot_count, StructureKind::Target, i));
                slot_count += 1;
            }
            // Six slots would read back as the fixed layout.
            if STRUCTURE_HEADER_LEN + 2 * slot_count == usize::from(FIXED_CONTROL_LEN) {
                slot_count += 1;
            }
        } else {
            slot_count = (usize::from(FIXED_CONTROL_LEN) - STRUCTURE_HEADER_LEN) / 2;
            if self.initiator.is_some() {
                layout.push((1, StructureKind::Initiator, 0));
            }
            for i in 0..self.nics.len() {
                layout.push((2 + 2 * i, StructureKind::Nic, i));
            }
            for i in 0..self.targets.len() {
                layout.push((3 + 2 * i, StructureKind::Target, i));
            }
        }

        let control_len = STRUCTURE_HEADER_LEN + 2 * slot_count;
        let mut next = (CONTROL_OFFSET + control_len).next_multiple_of(8);
        let mut placed = Vec::with_capacity(layout.len());
        for &(slot, kind, i) in &layout {
            placed.push((slot, kind, i, next));
            let len = match kind {
                StructureKind::Initiator => INITIATOR_LEN,
                StructureKind::Nic => NIC_LEN,
                _ => TARGET_LEN,
            };
            next = (next + len).next_multiple_of(8);
        }

        let mut table = vec![0u8; next];
        table[..HEADER_LEN].copy_from_slice(&build_header(
            Signature::IBFT,
            1,
            self.oem_id,
            self.oem_table_id,
        ));
        let mut heap = StringHeap {
            base: next,
            data: Vec::new(),
        };

        write_structure_header(
            &mut table,
            CONTROL_OFFSET,
            StructureKind::Control,
            control_len,
            0,
            0,
        );
        for &(slot, kind, i, offset) in &placed {
            put_u16(
                &mut table,
                CONTROL_OFFSET + STRUCTURE_HEADER_LEN + 2 * slot,
                offset as u16,
            );
            match kind {
                StructureKind::Initiator => {
                    if let Some(spec) = &self.initiator {
                        write_initiator(&mut table, offset, spec, &mut heap);
                    }
                }
                StructureKind::Nic => {
                    write_nic(&mut table, offset, i as u8, &self.nics[i], &mut heap)
                }
                _ => {
                    write_target(&mut table, offset, i as u8, &self.targets[i], &mut heap)
                }
            }
        }

        table.extend_from_slice(&heap.data);
        finish(table)
    }
}

fn write_structure_header(
    buf: &mut [u8],
    offset: usize,
    kind: StructureKind,
    length: usize,
    index: u8,
    flags: u8,
) {
    buf[offset] = kind.id();
    buf[offset + 1] = 1;
    put_u16(buf, offset + 2, length as u16);
    buf[offset + 4] = index;
    buf[offset + 5] = flags;
}

fn write_initiator(buf: &mut [u8], offset: usize, spec: &InitiatorSpec, heap: &mut StringHeap) {
    let mut flags = InitiatorFlags::empty();
    flags.set(InitiatorFlags::VALID, spec.valid);
    flags.set(InitiatorFlags::BOOT_SELECTED, spec.boot_selected);
    write_structure_header(
        buf,
        offset,
        StructureKind::Initiator,
        INITIATOR_LEN,
        0,
        flags.bits(),
    );
    let s = &mut buf[offset..offset + INITIATOR_LEN];
    put_ip(s, 6, spec.isns_server);
    put_ip(s, 22, spec.slp_server);
    put_ip(s, 38, spec.radius[0]);
    put_ip(s, 54, spec.radius[1]);
    heap.put(s, 70, &spec.name);
}

fn write_nic(buf: &mut [u8], offset: usize, index: u8, spec: &NicSpec, heap: &mut StringHeap) {
    let mut flags = NicFlags::empty();
    flags.set(NicFlags::VALID, spec.valid);
    flags.set(NicFlags::BOOT_SELECTED, spec.boot_selected);
    flags.set(NicFlags::GLOBAL, spec.global);
    write_structure_header(buf, offset, StructureKind::Nic, NIC_LEN, index, flags.bits());
    let s = &mut buf[offset..offset + NIC_LEN];
    put_ip(s, 6, spec.ip);
    s[22] = spec.prefix;
    s[23] = spec.origin.raw();
    put_ip(s, NIC_GATEWAY_OFFSET, spec.gateway);
    put_ip(s, 40, spec.dns[0]);
    put_ip(s, 56, spec.dns[1]);
    put_ip(s, 72, spec.dhcp);
    put_u16(s, 88, spec.vlan);
    s[90..96].copy_from_slice(&spec.mac.0);
    put_u16(s, 96, spec.pci_bdf);
    heap.put(s, 98, &spec.hostname);
}

fn write_target(
    buf: &mut [u8],
    offset: usize,
    index: u8,
    spec: &TargetSpec,
    heap: &mut StringHeap,
) {
    let mut flags = TargetFlags::empty();
    flags.set(TargetFlags::VALID, spec.valid);
    flags.set(TargetFlags::BOOT_SELECTED, spec.boot_selected);
    flags.set(TargetFlags::RADIUS_CHAP, spec.radius_chap);
    flags.set(TargetFlags::RADIUS_RCHAP, spec.radius_rchap);
    write_structure_header(buf, offset, StructureKind::Target, TARGET_LEN, index, flags.bits());
    let s = &mut buf[offset..offset + TARGET_LEN];
    put_ip(s, 6, spec.ip);
    put_u16(s, 22, spec.port);
    s[24..32].copy_from_slice(&spec.lun.0);
    s[32] = spec.chap_type.raw();
    s[33] = spec.nic_association;
    heap.put(s, 34, &spec.name);
    heap.put(s, 38, &spec.chap_name);
    heap.put(s, 42, &spec.chap_secret);
    heap.put(s, 46, &spec.reverse_chap_name);
    heap.put(s, 50, &spec.reverse_chap_secret);
}

/// Builds an aBFT image.
#[derive(Debug, Clone)]
pub struct AbftBuilder {
    pub shelf: u16,
    pub slot: u8,
    pub mac: MacAddr,
    oem_table_id: [u8; 8],
}

impl AbftBuilder {
    pub fn new(shelf: u16, slot: u8, mac: MacAddr) -> Self {
        Self {
            shelf,
            slot,
            mac,
            oem_table_id: DEFAULT_OEM_TABLE_ID,
        }
    }

    pub fn oem_table_id(mut self, oem_table_id: &str) -> Self {
        self.oem_table_id = pad_field(oem_table_id);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut table =
            build_header(Signature::ABFT, 1, DEFAULT_OEM_ID, self.oem_table_id).to_vec();
        table.extend_from_slice(&self.shelf.to_le_bytes());
        table.push(self.slot);
        table.push(0);
        table.extend_from_slice(&self.mac.0);
        finish(table)
    }
}

/// Builds an sBFT image with any subset of the three subtables.
#[derive(Debug, Clone, Default)]
pub struct SbftBuilder {
    pub scsi: Option<SbftScsi>,
    pub srp: Option<SbftSrp>,
    pub ib: Option<SbftIb>,
}

impl SbftBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scsi(mut self, scsi: SbftScsi) -> Self {
        self.scsi = Some(scsi);
        self
    }

    pub fn srp(mut self, srp: SbftSrp) -> Self {
        self.srp = Some(srp);
        self
    }

    pub fn ib(mut self, ib: SbftIb) -> Self {
        self.ib = Some(ib);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut table =
            build_header(Signature::SBFT, 1, DEFAULT_OEM_ID, DEFAULT_OEM_TABLE_ID).to_vec();
        // Three offsets plus six reserved bytes.
        table.resize(HEADER_LEN + 12, 0);

        if let Some(scsi) = &self.scsi {
            let offset = table.len();
            put_u16(&mut table, 36, offset as u16);
            table.extend_from_slice(&scsi.lun.0);
            debug_assert_eq!(table.len() - offset, SCSI_LEN);
        }
        if let Some(srp) = &self.srp {
            let offset = table.len();
            put_u16(&mut table, 38, offset as u16);
            table.extend_from_slice(&srp.initiator_port_id.0);
            table.extend_from_slice(&srp.target_port_id.0);
            debug_assert_eq!(table.len() - offset, SRP_LEN);
        }
        if let Some(ib) = &self.ib {
            let offset = table.len();
            put_u16(&mut table, 40, offset as u16);
            table.extend_from_slice(&ib.sgid.0);
            table.extend_from_slice(&ib.dgid.0);
            table.extend_from_slice(&ib.service_id.0);
            table.extend_from_slice(&ib.pkey.to_le_bytes());
            table.extend_from_slice(&[0; 6]);
            debug_assert_eq!(table.len() - offset, IB_LEN);
        }
        finish(table)
    }
}
