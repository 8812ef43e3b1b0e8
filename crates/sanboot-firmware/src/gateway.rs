//! Gateway disambiguation for iBFT NICs.
//!
//! Firmware commonly fills in the NIC's default gateway even when the boot
//! target sits on the local subnet. Once the OS applies that gateway, traffic to
//! a directly attached target can end up routed away. For every NIC with a
//! gateway we therefore count the valid targets inside the NIC's own subnet:
//!
//! * none: the gateway is needed and is left alone;
//! * exactly one: the gateway becomes that target's address, so the route to it
//!   stays on-link;
//! * several: the gateway is cleared, since no single next hop is right.

use core::net::Ipv4Addr;

use serde::Serialize;
use tracing::{info, warn};

use crate::ibft::{Ibft, IbftStructure};
use crate::net::subnet_mask;

/// A gateway rewrite applied to one NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayChange {
    pub nic_index: u8,
    pub attached_targets: usize,
    pub old: Ipv4Addr,
    pub new: Ipv4Addr,
}

/// Apply the heuristic to every valid NIC and return the rewrites made.
///
/// Running this twice makes no further changes.
pub fn disambiguate_gateways(ibft: &mut Ibft) -> Vec<GatewayChange> {
    let targets: Vec<Ipv4Addr> = ibft
        .targets()
        .filter(|t| t.is_valid())
        .filter_map(|t| t.ip.ipv4())
        .collect();

    let mut plan = Vec::new();
    for (entry, e) in ibft.entries().iter().enumerate() {
        let IbftStructure::Nic(nic) = &e.structure else {
            continue;
        };
        if !nic.is_valid() {
            continue;
        }
        let (Some(ip), Some(gateway)) = (nic.ip.ipv4(), nic.gateway.ipv4()) else {
            continue;
        };

        let mask = u32::from(subnet_mask(nic.prefix));
        let net = u32::from(ip) & mask;
        let attached: Vec<Ipv4Addr> = targets
            .iter()
            .copied()
            .filter(|t| u32::from(*t) & mask == net)
            .collect();
        info!(
            "Found {} target(s) directly attached via iBFT NIC {}",
            attached.len(),
            nic.index
        );

        let new = match attached.as_slice() {
            [] => continue,
            [only] => *only,
            _ => Ipv4Addr::UNSPECIFIED,
        };
        if new == gateway {
            continue;
        }
        info!(
            "Amending gateway for iBFT NIC {} from {gateway} to {new}",
            nic.index
        );
        plan.push((
            entry,
            GatewayChange {
                nic_index: nic.index,
                attached_targets: attached.len(),
                old: gateway,
                new,
            },
        ));
    }

    let mut applied = Vec::with_capacity(plan.len());
    for (entry, change) in plan {
        match ibft.set_nic_gateway(entry, change.new) {
            Ok(()) => applied.push(change),
            Err(err) => warn!(
                "could not rewrite gateway for iBFT NIC {}: {err}",
                change.nic_index
            ),
        }
    }
    applied
}
