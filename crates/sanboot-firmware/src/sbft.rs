//! SRP Boot Firmware Table.
//!
//! Three optional subtables (SCSI, SRP, InfiniBand), each reached through a
//! 16-bit offset in the body. Any subset may be present; a bad offset only loses
//! its own subtable.

use core::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::acpi::{AcpiTable, Signature, HEADER_LEN};
use crate::error::DecodeError;
use crate::net::{Gid, HexId, PortId, ScsiLun, ServiceId};
use crate::reader::TableReader;

pub const SCSI_LEN: usize = 8;
pub const SRP_LEN: usize = 32;
pub const IB_LEN: usize = 48;

/// Header plus the three offsets; the six reserved bytes are optional.
pub const SBFT_MIN_LEN: usize = HEADER_LEN + 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SbftScsi {
    pub lun: ScsiLun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SbftSrp {
    pub initiator_port_id: PortId,
    pub target_port_id: PortId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SbftIb {
    pub sgid: Gid,
    pub dgid: Gid,
    pub service_id: ServiceId,
    pub pkey: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Sbft {
    pub scsi: Option<SbftScsi>,
    pub srp: Option<SbftSrp>,
    pub ib: Option<SbftIb>,
}

fn subtable<'a>(
    r: &TableReader<'a>,
    offset: u16,
    len: usize,
    what: &str,
) -> Option<TableReader<'a>> {
    if offset == 0 {
        return None;
    }
    match r.sub(usize::from(offset), len) {
        Ok(sub) => Some(sub),
        Err(err) => {
            warn!("sBFT {what} subtable ignored: {err}");
            None
        }
    }
}

impl Sbft {
    pub fn parse(table: &AcpiTable) -> Result<Self, DecodeError> {
        table.expect_signature(Signature::SBFT)?;
        let r = table.reader();
        if r.len() < SBFT_MIN_LEN {
            return Err(DecodeError::Truncated {
                what: "sBFT",
                need: SBFT_MIN_LEN,
                have: r.len(),
            });
        }
        let scsi_offset = r.u16(36)?;
        let srp_offset = r.u16(38)?;
        let ib_offset = r.u16(40)?;

        let scsi = subtable(&r, scsi_offset, SCSI_LEN, "SCSI")
            .map(|s| -> Result<_, DecodeError> {
                Ok(SbftScsi {
                    lun: ScsiLun(s.array(0)?),
                })
            })
            .transpose()?;
        let srp = subtable(&r, srp_offset, SRP_LEN, "SRP")
            .map(|s| -> Result<_, DecodeError> {
                Ok(SbftSrp {
                    initiator_port_id: HexId(s.array(0)?),
                    target_port_id: HexId(s.array(16)?),
                })
            })
            .transpose()?;
        let ib = subtable(&r, ib_offset, IB_LEN, "IB")
            .map(|s| -> Result<_, DecodeError> {
                Ok(SbftIb {
                    sgid: HexId(s.array(0)?),
                    dgid: HexId(s.array(16)?),
                    service_id: HexId(s.array(32)?),
                    pkey: s.u16(40)?,
                })
            })
            .transpose()?;

        Ok(Self { scsi, srp, ib })
    }

    pub fn log_summary(&self) {
        for line in self.to_string().lines() {
            info!("{line}");
        }
    }
}

impl fmt::Display for Sbft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        if let Some(scsi) = &self.scsi {
            lines.push("Found sBFT SCSI subtable:".to_string());
            lines.push(format!("  LUN = {}", scsi.lun));
        }
        if let Some(srp) = &self.srp {
            lines.push("Found sBFT SRP subtable:".to_string());
            lines.push(format!("  Initiator port ID = {}", srp.initiator_port_id));
            lines.push(format!("  Target port ID = {}", srp.target_port_id));
        }
        if let Some(ib) = &self.ib {
            lines.push("Found sBFT IB subtable:".to_string());
            lines.push(format!("  Source GID = {}", ib.sgid));
            lines.push(format!("  Destination GID = {}", ib.dgid));
            lines.push(format!("  Service ID = {}", ib.service_id));
            lines.push(format!("  Partition key = {:#06x}", ib.pkey));
        }
        f.write_str(&lines.join("\n"))
    }
}
