//! Boot-time discovery of SAN boot firmware tables, and the surface through
//! which the captured tables are handed back to consumers.

use core::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::abft::Abft;
use crate::acpi::{AcpiTable, Signature};
use crate::boottext::{BootDisplay, BootText};
use crate::error::{ExportError, NicError};
use crate::gateway::{disambiguate_gateways, GatewayChange};
use crate::ibft::Ibft;
use crate::memory::PhysicalMemory;
use crate::net::MacAddr;
use crate::nic::{configure_nic, should_configure, NicLocator};
use crate::registry::RegistryStore;
use crate::sbft::Sbft;
use crate::scan::find_table;

pub const FILE_DEVICE_UNKNOWN: u32 = 0x22;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_READ_ACCESS: u32 = 1;

pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

pub const IOCTL_SANBOOTCONF_IBFT: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x001, METHOD_BUFFERED, FILE_READ_ACCESS);
pub const IOCTL_SANBOOTCONF_ABFT: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x861, METHOD_BUFFERED, FILE_READ_ACCESS);
pub const IOCTL_SANBOOTCONF_SBFT: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x873, METHOD_BUFFERED, FILE_READ_ACCESS);

/// OEM table ID of the unsupported predecessor of iPXE.
const GPXE_OEM_TABLE_ID: &str = "gPXE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Ibft,
    Abft,
    Sbft,
}

impl TableKind {
    /// Discovery order.
    pub const ALL: [TableKind; 3] = [TableKind::Ibft, TableKind::Abft, TableKind::Sbft];

    pub fn signature(self) -> Signature {
        match self {
            Self::Ibft => Signature::IBFT,
            Self::Abft => Signature::ABFT,
            Self::Sbft => Signature::SBFT,
        }
    }

    /// Transport name shown on the boot screen.
    pub fn label(self) -> &'static str {
        match self {
            Self::Ibft => "iSCSI",
            Self::Abft => "AoE",
            Self::Sbft => "SRP",
        }
    }

    pub fn ioctl_code(self) -> u32 {
        match self {
            Self::Ibft => IOCTL_SANBOOTCONF_IBFT,
            Self::Abft => IOCTL_SANBOOTCONF_ABFT,
            Self::Sbft => IOCTL_SANBOOTCONF_SBFT,
        }
    }

    pub fn from_ioctl(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.ioctl_code() == code)
    }

    fn slot(self) -> usize {
        match self {
            Self::Ibft => 0,
            Self::Abft => 1,
            Self::Sbft => 2,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.signature(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Rewrite iBFT NIC gateways for directly attached targets.
    pub gateway_fixup: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            gateway_fixup: true,
        }
    }
}

/// Host services that discovery hands the decoded NICs to.
pub struct NicServices<'a> {
    pub locator: &'a dyn NicLocator,
    pub registry: &'a mut dyn RegistryStore,
}

/// What happened when a boot NIC was handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicOutcome {
    pub source: TableKind,
    pub index: u8,
    pub mac: MacAddr,
    /// The interface's `NetCfgInstanceId`, or why it could not be configured.
    pub interface: Result<String, String>,
}

/// Tables captured at boot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SanBoot {
    #[serde(skip)]
    tables: [Option<AcpiTable>; 3],
    pub ibft: Option<Ibft>,
    pub abft: Option<Abft>,
    pub sbft: Option<Sbft>,
    pub gateway_changes: Vec<GatewayChange>,
    pub nics: Vec<NicOutcome>,
}

impl SanBoot {
    /// Scan for every supported table, decode what is found and configure the
    /// boot NICs.
    ///
    /// Nothing here is fatal: a table that cannot be scanned for is treated as
    /// absent, and one that cannot be decoded is still captured for export.
    pub fn discover<M, D>(
        mem: &M,
        boot_text: &mut BootText<D>,
        options: DiscoveryOptions,
        mut services: Option<NicServices<'_>>,
    ) -> Self
    where
        M: PhysicalMemory + ?Sized,
        D: BootDisplay,
    {
        let mut san = Self::default();
        for kind in TableKind::ALL {
            let signature = kind.signature();
            let table = match find_table(mem, signature) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    info!("No {signature} found");
                    continue;
                }
                Err(err) => {
                    warn!("Could not scan for {signature}: {err}");
                    continue;
                }
            };

            let oem_table_id = table.header().oem_table_id();
            boot_text.print(format_args!("{} boot via {oem_table_id}", kind.label()));
            if oem_table_id == GPXE_OEM_TABLE_ID {
                boot_text.print(
                    "WARNING: gPXE is no longer supported; please upgrade to iPXE (http://ipxe.org)",
                );
            }

            match kind {
                TableKind::Ibft => {
                    san.take_ibft(table, options, boot_text, services.as_mut())
                }
                TableKind::Abft => san.take_abft(table, boot_text, services.as_ref()),
                TableKind::Sbft => san.take_sbft(table),
            }
        }

        if san.san_boot_detected() {
            info!("Attempting SAN boot; will wait for system disk");
        } else {
            info!("No SAN boot method detected");
        }
        san
    }

    fn take_ibft<D: BootDisplay>(
        &mut self,
        table: AcpiTable,
        options: DiscoveryOptions,
        boot_text: &mut BootText<D>,
        services: Option<&mut NicServices<'_>>,
    ) {
        let mut ibft = match Ibft::parse(table.clone()) {
            Ok(ibft) => ibft,
            Err(err) => {
                warn!("Could not decode iBFT: {err}");
                self.tables[TableKind::Ibft.slot()] = Some(table);
                return;
            }
        };
        ibft.log_summary();

        if options.gateway_fixup {
            self.gateway_changes = disambiguate_gateways(&mut ibft);
        }

        if let Some(services) = services {
            for nic in ibft.nics().filter(|n| should_configure(n)) {
                let result = configure_nic(services.locator, &mut *services.registry, nic);
                if let Err(err) = &result {
                    report_nic_error(boot_text, nic.mac, err);
                    info!("Could not configure iBFT NIC {}: {err}", nic.index);
                }
                self.nics.push(NicOutcome {
                    source: TableKind::Ibft,
                    index: nic.index,
                    mac: nic.mac,
                    interface: result.map_err(|e| e.to_string()),
                });
            }
        }

        self.tables[TableKind::Ibft.slot()] = Some(ibft.table().clone());
        self.ibft = Some(ibft);
    }

    fn take_abft<D: BootDisplay>(
        &mut self,
        table: AcpiTable,
        boot_text: &mut BootText<D>,
        services: Option<&NicServices<'_>>,
    ) {
        match Abft::parse(&table) {
            Ok(abft) => {
                abft.log_summary();
                boot_text.print(format_args!(
                    "NIC {} target {}",
                    abft.mac,
                    abft.target_name()
                ));
                if let Some(services) = services {
                    let result = services.locator.find_nic(abft.mac);
                    match &result {
                        Ok(_) => info!("Successfully identified aBFT NIC"),
                        Err(err) => {
                            report_nic_error(boot_text, abft.mac, err);
                            info!("Could not identify aBFT NIC");
                        }
                    }
                    self.nics.push(NicOutcome {
                        source: TableKind::Abft,
                        index: 0,
                        mac: abft.mac,
                        interface: result.map_err(|e| e.to_string()),
                    });
                }
                self.abft = Some(abft);
            }
            Err(err) => warn!("Could not decode aBFT: {err}"),
        }
        self.tables[TableKind::Abft.slot()] = Some(table);
    }

    fn take_sbft(&mut self, table: AcpiTable) {
        match Sbft::parse(&table) {
            Ok(sbft) => {
                sbft.log_summary();
                self.sbft = Some(sbft);
            }
            Err(err) => warn!("Could not decode sBFT: {err}"),
        }
        self.tables[TableKind::Sbft.slot()] = Some(table);
    }

    /// True when any boot firmware table was found.
    pub fn san_boot_detected(&self) -> bool {
        self.tables.iter().any(Option::is_some)
    }

    /// The captured table, as it will be exported.
    pub fn table(&self, kind: TableKind) -> Option<&AcpiTable> {
        self.tables[kind.slot()].as_ref()
    }

    /// Copy the captured table into `buf`, truncated to `buf.len()`.
    pub fn fetch_table_copy(&self, kind: TableKind, buf: &mut [u8]) -> Result<usize, ExportError> {
        info!("{kind} requested");
        let Some(table) = self.table(kind) else {
            warn!("No {kind} available!");
            return Err(ExportError::NotPresent(kind.signature()));
        };
        Ok(table.copy_to(buf))
    }

    /// Serve an I/O control request.
    pub fn handle_request(&self, code: u32, buf: &mut [u8]) -> Result<usize, ExportError> {
        let Some(kind) = TableKind::from_ioctl(code) else {
            warn!("Unrecognised IoControl {code:#x}");
            return Err(ExportError::UnknownRequest(code));
        };
        self.fetch_table_copy(kind, buf)
    }
}

fn report_nic_error<D: BootDisplay>(boot_text: &mut BootText<D>, mac: MacAddr, err: &NicError) {
    if let NicError::NotFound(_) = err {
        boot_text.print(format_args!("ERROR: {mac} not found"));
    }
}
