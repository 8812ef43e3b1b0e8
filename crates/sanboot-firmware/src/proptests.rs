use core::net::Ipv4Addr;

use proptest::prelude::*;

use crate::acpi::{AcpiTable, Signature, CHECKSUM_OFFSET, HEADER_LEN};
use crate::builder::{AbftBuilder, IbftBuilder, NicSpec, TargetSpec};
use crate::checksum::{checksum_fixup, checksum_valid};
use crate::gateway::disambiguate_gateways;
use crate::ibft::Ibft;
use crate::net::{subnet_mask, MacAddr};
use crate::scan::scan_window;

fn ipv4_strategy() -> impl Strategy<Value = Ipv4Addr> {
    // Keep addresses in a handful of small subnets so targets are regularly
    // attached to a NIC.
    (prop_oneof![Just(10u8), Just(192u8)], 0u8..3, 0u8..=255)
        .prop_map(|(a, c, d)| Ipv4Addr::new(a, 0, c, d))
}

fn ibft_strategy() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::collection::vec((ipv4_strategy(), 0u8..=32, ipv4_strategy()), 1..=3),
        prop::collection::vec((ipv4_strategy(), any::<bool>()), 0..=4),
    )
        .prop_map(|(nics, targets)| {
            let mut builder = IbftBuilder::new();
            for (i, (ip, prefix, gateway)) in nics.into_iter().enumerate() {
                builder = builder.nic(NicSpec {
                    ip,
                    prefix,
                    gateway,
                    mac: MacAddr([0x02, 0, 0, 0, 0, i as u8]),
                    ..Default::default()
                });
            }
            for (ip, valid) in targets {
                builder = builder.target(TargetSpec {
                    ip,
                    valid,
                    ..Default::default()
                });
            }
            builder.build()
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_single_byte_corruption_breaks_checksum(
        shelf in any::<u16>(),
        slot in any::<u8>(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut table = AbftBuilder::new(shelf, slot, MacAddr::default()).build();
        prop_assert!(checksum_valid(&table));
        let i = index.index(table.len());
        table[i] ^= flip;
        prop_assert!(!checksum_valid(&table));
    }

    #[test]
    fn prop_scan_rejects_forged_length(length in any::<u32>(), at in 0usize..64) {
        let mut table = AbftBuilder::new(1, 1, MacAddr::default()).build();
        let real = table.len();
        table[4..8].copy_from_slice(&length.to_le_bytes());
        checksum_fixup(&mut table, CHECKSUM_OFFSET);

        let mut window = vec![0u8; 2048];
        let offset = at * 16;
        window[offset..offset + real].copy_from_slice(&table);
        let room = window.len() - offset;
        let length = length as usize;

        let found = scan_window(&window, 0x9_0000, Signature::ABFT).unwrap();
        match found {
            Some(found) => {
                prop_assert!((HEADER_LEN..=room).contains(&length));
                prop_assert_eq!(found.len(), length);
                prop_assert!(found.checksum_valid());
            }
            // Zero padding after the image keeps the sum intact.
            None => prop_assert!(!(real..=room).contains(&length)),
        }
    }

    #[test]
    fn prop_gateway_rewrite_is_idempotent(bytes in ibft_strategy()) {
        let mut ibft = Ibft::parse(AcpiTable::from_bytes(bytes).unwrap()).unwrap();
        let changes = disambiguate_gateways(&mut ibft);
        prop_assert!(ibft.table().checksum_valid());
        for change in &changes {
            prop_assert_ne!(change.old, change.new);
        }

        let again = disambiguate_gateways(&mut ibft);
        prop_assert!(again.is_empty());

        // A rewritten table decodes to the same rewritten gateways.
        let reparsed = Ibft::parse(ibft.table().clone()).unwrap();
        let before: Vec<_> = ibft.nics().map(|n| n.gateway).collect();
        let after: Vec<_> = reparsed.nics().map(|n| n.gateway).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_ibft_decode_never_panics(body in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut table = IbftBuilder::new().build();
        table.truncate(HEADER_LEN);
        table.extend_from_slice(&body);
        let len = table.len() as u32;
        table[4..8].copy_from_slice(&len.to_le_bytes());
        checksum_fixup(&mut table, CHECKSUM_OFFSET);

        let Ok(table) = AcpiTable::from_bytes(table) else {
            return Ok(());
        };
        if let Ok(mut ibft) = Ibft::parse(table) {
            for entry in ibft.entries() {
                let _ = entry.structure.to_string();
            }
            disambiguate_gateways(&mut ibft);
            prop_assert!(ibft.table().checksum_valid());
        }
    }

    #[test]
    fn prop_subnet_mask_is_contiguous(prefix in any::<u8>()) {
        let mask = u32::from(subnet_mask(prefix));
        prop_assert_eq!(mask.count_ones(), u32::from(prefix.min(32)));
        prop_assert_eq!(mask.leading_ones(), mask.count_ones());
    }
}
