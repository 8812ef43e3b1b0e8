//! SAN boot firmware table support.
//!
//! Boot firmware such as iPXE leaves a description of the SAN boot it performed
//! in low memory: an iBFT for iSCSI, an aBFT for AoE or an sBFT for SRP. This
//! crate finds those tables, decodes them, applies the boot NIC addressing to the
//! host network configuration and keeps a copy of each table for consumers that
//! need to attach the boot disk.

pub mod abft;
pub mod acpi;
pub mod boottext;
pub mod builder;
pub mod checksum;
pub mod error;
pub mod gateway;
pub mod ibft;
pub mod memory;
pub mod net;
pub mod nic;
pub mod params;
pub mod reader;
pub mod registry;
pub mod sanboot;
pub mod sbft;
pub mod scan;

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;

pub use abft::Abft;
pub use acpi::{AcpiHeader, AcpiTable, Signature};
pub use boottext::{BootDisplay, BootText, BootTextConfig, NullDisplay, RecordingDisplay};
pub use error::{DecodeError, ExportError, MapError, NicError, RegistryError, ScanError};
pub use gateway::{disambiguate_gateways, GatewayChange};
pub use ibft::{Ibft, IbftInitiator, IbftNic, IbftStructure, IbftTarget};
pub use memory::{PhysicalMemory, VecMemory};
pub use net::{IbftIpAddr, Lun, MacAddr, Secret};
pub use nic::{configure_nic, NicLocator, StaticNicLocator};
pub use params::DriverParameters;
pub use registry::{MemoryRegistry, RegistryStore, RegistryValue};
pub use sanboot::{DiscoveryOptions, NicServices, SanBoot, TableKind};
pub use sbft::Sbft;
pub use scan::find_table;
