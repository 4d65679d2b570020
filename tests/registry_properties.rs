mod common;

use ble_device_scanner::{AliasTable, DeviceRegistry};
use common::{address, event};
use proptest::prelude::*;
use std::collections::HashSet;

/// First-occurrence order of a sequence of device numbers.
fn first_seen(ids: &[u16]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|n| seen.insert(**n))
        .map(|n| address(*n))
        .collect()
}

proptest! {
    #[test]
    fn size_counts_distinct_identifiers(ids in prop::collection::vec(0u16..32, 0..200)) {
        let registry = DeviceRegistry::new(AliasTable::empty());
        let mut inserted = 0;
        for n in &ids {
            if registry.insert_if_absent(&event(&address(*n), None)) {
                inserted += 1;
            }
        }

        let distinct: HashSet<_> = ids.iter().collect();
        prop_assert_eq!(registry.len(), distinct.len());
        prop_assert_eq!(inserted, distinct.len());
    }

    #[test]
    fn snapshot_keeps_first_seen_order(ids in prop::collection::vec(0u16..32, 0..200)) {
        let registry = DeviceRegistry::new(AliasTable::empty());
        for n in &ids {
            registry.insert_if_absent(&event(&address(*n), None));
        }

        let order: Vec<String> = registry.snapshot().into_iter().map(|r| r.identifier).collect();
        prop_assert_eq!(order, first_seen(&ids));
    }

    #[test]
    fn clear_forgets_everything(
        before in prop::collection::vec(0u16..16, 1..50),
        after in prop::collection::vec(0u16..16, 0..50),
    ) {
        let registry = DeviceRegistry::new(AliasTable::empty());
        for n in &before {
            registry.insert_if_absent(&event(&address(*n), None));
        }

        registry.clear();
        prop_assert!(registry.snapshot().is_empty());

        for n in &after {
            registry.insert_if_absent(&event(&address(*n), None));
        }
        let order: Vec<String> = registry.snapshot().into_iter().map(|r| r.identifier).collect();
        prop_assert_eq!(order, first_seen(&after));
    }

    #[test]
    fn unnamed_unknown_devices_render_as_unknown(n in 0u16..1000) {
        let registry = DeviceRegistry::default();
        registry.insert_if_absent(&event(&address(n), None));
        let row = registry.snapshot()[0].row();
        prop_assert_eq!(row, format!("Unknown Device - {}", address(n)));
    }
}
