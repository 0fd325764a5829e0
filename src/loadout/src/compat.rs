//! Compatibility graph construction.
//!
//! Breadth-first traversal from a base weapon over slot-allows edges,
//! yielding the set of reachable items, the allowed-items list per slot, the
//! slots owned by each item, and every slot's owner.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::catalog::ItemLookup;
use crate::Error;

/// The modification graph reachable from one base weapon.
///
/// Edges are stored as identifiers; item ownership stays in the
/// [`ItemLookup`]. The allowed-items graph can contain cycles (two items
/// each allowed under the other), which the visited set during construction
/// makes harmless. Keys are ordered so downstream model construction
/// iterates deterministically.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityMap {
    /// Ids of every item reachable from the weapon (never the weapon itself).
    pub reachable: BTreeSet<String>,
    /// slot id -> allowed item ids present in the lookup, in raw order.
    pub slot_items: BTreeMap<String, Vec<String>>,
    /// item id -> slots owned by that item.
    pub item_slots: BTreeMap<String, Vec<String>>,
    /// slot id -> owning item id (the weapon owns its top-level slots).
    pub slot_owner: BTreeMap<String, String>,
}

/// Build the compatibility map for a weapon.
///
/// Unknown identifiers in allowed lists are silently ignored, as are
/// self-referential edges back to the weapon.
pub fn build_compatibility_map(
    weapon_id: &str,
    lookup: &ItemLookup,
) -> Result<CompatibilityMap, Error> {
    let weapon = lookup
        .get(weapon_id)
        .ok_or_else(|| Error::WeaponNotFound(weapon_id.to_string()))?;

    let mut map = CompatibilityMap::default();
    let mut queue = VecDeque::new();

    for slot in &weapon.slots {
        let entry = map.slot_items.entry(slot.id.clone()).or_default();
        map.slot_owner.insert(slot.id.clone(), weapon_id.to_string());
        for allowed_id in &slot.allowed_items {
            if allowed_id == weapon_id || !lookup.contains(allowed_id) {
                continue;
            }
            entry.push(allowed_id.clone());
            queue.push_back(allowed_id.clone());
        }
    }

    let mut visited = BTreeSet::new();
    while let Some(item_id) = queue.pop_front() {
        if !visited.insert(item_id.clone()) {
            continue;
        }
        let Some(item) = lookup.get(&item_id) else {
            continue;
        };

        map.reachable.insert(item_id.clone());
        let owned = map.item_slots.entry(item_id.clone()).or_default();

        for slot in &item.slots {
            map.slot_owner.insert(slot.id.clone(), item_id.clone());
            owned.push(slot.id.clone());
            let entry = map.slot_items.entry(slot.id.clone()).or_default();
            entry.clear();
            for allowed_id in &slot.allowed_items {
                if allowed_id == weapon_id || !lookup.contains(allowed_id) {
                    continue;
                }
                entry.push(allowed_id.clone());
                if !visited.contains(allowed_id) {
                    queue.push_back(allowed_id.clone());
                }
            }
        }
    }

    tracing::debug!(
        weapon = weapon_id,
        reachable = map.reachable.len(),
        slots = map.slot_items.len(),
        "built compatibility map"
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{lookup_from, mod_item, slot, weapon};

    #[test]
    fn test_unknown_weapon_is_an_error() {
        let lookup = lookup_from(vec![]);
        assert!(matches!(
            build_compatibility_map("missing", &lookup),
            Err(Error::WeaponNotFound(_))
        ));
    }

    #[test]
    fn test_bfs_reaches_nested_items() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_grip", false, &["grip"]));
        let mut grip = mod_item("grip", 5.0, 0.0, 1000);
        grip.slots.push(slot("s_tape", false, &["tape"]));
        let tape = mod_item("tape", 1.0, 0.0, 200);

        let lookup = lookup_from(vec![w, grip, tape]);
        let map = build_compatibility_map("w", &lookup).unwrap();

        assert!(map.reachable.contains("grip"));
        assert!(map.reachable.contains("tape"));
        assert!(!map.reachable.contains("w"));
        assert_eq!(map.slot_owner["s_grip"], "w");
        assert_eq!(map.slot_owner["s_tape"], "grip");
        assert_eq!(map.item_slots["grip"], vec!["s_tape".to_string()]);
        assert_eq!(map.slot_items["s_tape"], vec!["tape".to_string()]);
    }

    #[test]
    fn test_unknown_ids_and_self_edges_are_skipped() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["ghost", "w", "real"]));
        let real = mod_item("real", 2.0, 0.0, 500);

        let lookup = lookup_from(vec![w, real]);
        let map = build_compatibility_map("w", &lookup).unwrap();

        assert_eq!(map.slot_items["s1"], vec!["real".to_string()]);
        assert_eq!(map.reachable.len(), 1);
    }

    #[test]
    fn test_cyclic_allow_lists_terminate() {
        // a allows b in its slot, b allows a in its own slot.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s0", false, &["a"]));
        let mut a = mod_item("a", 1.0, 0.0, 100);
        a.slots.push(slot("sa", false, &["b"]));
        let mut b = mod_item("b", 1.0, 0.0, 100);
        b.slots.push(slot("sb", false, &["a"]));

        let lookup = lookup_from(vec![w, a, b]);
        let map = build_compatibility_map("w", &lookup).unwrap();

        assert!(map.reachable.contains("a"));
        assert!(map.reachable.contains("b"));
        assert_eq!(map.slot_items["sb"], vec!["a".to_string()]);
    }

    #[test]
    fn test_slot_items_preserve_allow_list_order() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["z", "a", "m"]));
        let lookup = lookup_from(vec![
            w,
            mod_item("z", 0.0, 0.0, 100),
            mod_item("a", 0.0, 0.0, 100),
            mod_item("m", 0.0, 0.0, 100),
        ]);
        let map = build_compatibility_map("w", &lookup).unwrap();
        assert_eq!(
            map.slot_items["s1"],
            vec!["z".to_string(), "a".to_string(), "m".to_string()]
        );
    }
}
