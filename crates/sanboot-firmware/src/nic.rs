//! Applying an iBFT NIC's static addressing to the matching host interface.

use core::net::Ipv4Addr;
use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::NicError;
use crate::ibft::IbftNic;
use crate::net::{subnet_mask, MacAddr};
use crate::registry::{key_path, RegistryStore, RegistryValue};

/// Per-interface TCP/IP settings live under this key, one subkey per
/// `NetCfgInstanceId`.
pub const TCPIP_INTERFACES_KEY: &str =
    "\\Registry\\Machine\\SYSTEM\\CurrentControlSet\\Services\\Tcpip\\Parameters\\Interfaces";

/// Finds the host network interface with a given MAC address.
pub trait NicLocator {
    /// Returns the interface's `NetCfgInstanceId`.
    fn find_nic(&self, mac: MacAddr) -> Result<String, NicError>;
}

/// A [`NicLocator`] over a fixed MAC to interface mapping.
#[derive(Debug, Clone, Default)]
pub struct StaticNicLocator {
    interfaces: HashMap<MacAddr, String>,
}

impl StaticNicLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, mac: MacAddr, netcfg_instance_id: impl Into<String>) -> Self {
        self.interfaces.insert(mac, netcfg_instance_id.into());
        self
    }
}

impl NicLocator for StaticNicLocator {
    fn find_nic(&self, mac: MacAddr) -> Result<String, NicError> {
        let id = self
            .interfaces
            .get(&mac)
            .cloned()
            .ok_or(NicError::NotFound(mac))?;
        debug!("NIC {mac} is NetCfgInstanceId \"{id}\"");
        Ok(id)
    }
}

/// The addressing a boot NIC must come up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicConfig {
    pub index: u8,
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub prefix: u8,
    pub gateway: Option<Ipv4Addr>,
    pub dns: [Option<Ipv4Addr>; 2],
    pub hostname: String,
}

impl From<&IbftNic> for NicConfig {
    fn from(nic: &IbftNic) -> Self {
        Self {
            index: nic.index,
            mac: nic.mac,
            ip: nic.ip.ipv4(),
            prefix: nic.prefix,
            gateway: nic.gateway.ipv4(),
            dns: [nic.dns[0].ipv4(), nic.dns[1].ipv4()],
            hostname: nic.hostname.clone(),
        }
    }
}

/// Registry values that pin an interface to static addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpipParameters {
    pub ip_address: Vec<String>,
    pub subnet_mask: Vec<String>,
    pub default_gateway: Vec<String>,
    pub name_server: String,
    pub enable_dhcp: u32,
}

fn multi(addr: Option<Ipv4Addr>) -> Vec<String> {
    addr.map(|a| a.to_string()).into_iter().collect()
}

impl TcpipParameters {
    pub fn from_config(config: &NicConfig) -> Self {
        let mask = subnet_mask(config.prefix);
        Self {
            ip_address: multi(config.ip),
            subnet_mask: multi(config.ip.map(|_| mask)),
            default_gateway: multi(config.gateway),
            name_server: config.dns[0].map(|a| a.to_string()).unwrap_or_default(),
            enable_dhcp: 0,
        }
    }

    pub fn from_nic(nic: &IbftNic) -> Self {
        Self::from_config(&NicConfig::from(nic))
    }

    /// The values in the order they are written.
    pub fn values(&self) -> [(&'static str, RegistryValue); 5] {
        [
            ("IPAddress", RegistryValue::MultiSz(self.ip_address.clone())),
            ("SubnetMask", RegistryValue::MultiSz(self.subnet_mask.clone())),
            (
                "DefaultGateway",
                RegistryValue::MultiSz(self.default_gateway.clone()),
            ),
            ("NameServer", RegistryValue::Sz(self.name_server.clone())),
            ("EnableDHCP", RegistryValue::Dword(self.enable_dhcp)),
        ]
    }
}

/// Whether a NIC should be configured at all.
pub fn should_configure(nic: &IbftNic) -> bool {
    nic.is_valid() && nic.is_boot_selected()
}

/// Locate the interface for `nic` and write its TCP/IP parameters.
///
/// Returns the interface's `NetCfgInstanceId`.
pub fn configure_nic<L, R>(locator: &L, registry: &mut R, nic: &IbftNic) -> Result<String, NicError>
where
    L: NicLocator + ?Sized,
    R: RegistryStore + ?Sized,
{
    let id = locator.find_nic(nic.mac)?;
    let key = key_path(&[TCPIP_INTERFACES_KEY, &id]);
    for (name, value) in TcpipParameters::from_nic(nic).values() {
        registry.store(&key, name, value)?;
    }
    info!("Successfully configured iBFT NIC {}", nic.index);
    Ok(id)
}
