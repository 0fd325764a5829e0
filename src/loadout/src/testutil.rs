//! Synthetic catalog builders shared by the unit tests.

use crate::catalog::{
    Item, ItemKind, ItemLookup, ModStats, Offer, Preset, SlotDescriptor, WeaponStats,
    NOT_PURCHASABLE_PRICE,
};

pub fn trader_offer(price: u64, vendor: &str, level: i64) -> Offer {
    Offer {
        price,
        source: vendor.to_lowercase(),
        vendor_name: vendor.to_string(),
        vendor_normalized: vendor.to_lowercase(),
        trader_level: Some(level),
    }
}

pub fn weapon(id: &str, ergo: i64, recoil_v: i64, recoil_h: i64, price: u64) -> Item {
    Item {
        id: id.to_string(),
        name: format!("Weapon {id}"),
        icon: None,
        image: None,
        slots: Vec::new(),
        kind: ItemKind::Weapon {
            stats: WeaponStats {
                naked_ergonomics: ergo,
                naked_recoil_v: recoil_v,
                naked_recoil_h: recoil_h,
                default_ergonomics: ergo,
                default_recoil_v: recoil_v,
                default_recoil_h: recoil_h,
                caliber: "5.56x45mm NATO".to_string(),
                weight: 3.0,
                sighting_range: 100,
                category: "Assault rifle".to_string(),
                category_id: "cat-ar".to_string(),
                price,
                price_source: "prapor".to_string(),
            },
            presets: Vec::new(),
        },
    }
}

pub fn weapon_unpurchasable(id: &str, ergo: i64, recoil_v: i64, recoil_h: i64) -> Item {
    let mut item = weapon(id, ergo, recoil_v, recoil_h, NOT_PURCHASABLE_PRICE);
    if let ItemKind::Weapon { stats, .. } = &mut item.kind {
        stats.price_source = "not_available".to_string();
    }
    item
}

pub fn mod_item(id: &str, ergo: f64, recoil: f64, price: u64) -> Item {
    Item {
        id: id.to_string(),
        name: format!("Mod {id}"),
        icon: None,
        image: None,
        slots: Vec::new(),
        kind: ItemKind::Mod {
            stats: ModStats {
                ergonomics: ergo,
                recoil_modifier: recoil,
                weight: 0.1,
                capacity: 0,
                sighting_range: 0,
                min_level_flea: 0,
                category: "Mod".to_string(),
                category_id: "cat-mod".to_string(),
                price,
                price_source: "prapor".to_string(),
                offers: vec![trader_offer(price, "Prapor", 1)],
            },
            conflicts: Vec::new(),
        },
    }
}

pub fn magazine(id: &str, capacity: i64, price: u64) -> Item {
    let mut item = mod_item(id, 0.0, 0.0, price);
    if let ItemKind::Mod { stats, .. } = &mut item.kind {
        stats.capacity = capacity;
        stats.category = "Magazine".to_string();
        stats.category_id = "cat-mag".to_string();
    }
    item
}

pub fn sight(id: &str, sighting_range: i64, ergo: f64, price: u64) -> Item {
    let mut item = mod_item(id, ergo, 0.0, price);
    if let ItemKind::Mod { stats, .. } = &mut item.kind {
        stats.sighting_range = sighting_range;
        stats.category = "Scope".to_string();
        stats.category_id = "cat-scope".to_string();
    }
    item
}

pub fn preset(id: &str, items: &[&str], price: u64) -> Preset {
    let purchasable = price > 0;
    Preset {
        id: id.to_string(),
        name: format!("Preset {id}"),
        items: items.iter().map(|s| s.to_string()).collect(),
        image: None,
        price,
        price_source: if purchasable {
            "prapor".to_string()
        } else {
            "not_available".to_string()
        },
        offers: if purchasable {
            vec![trader_offer(price, "Prapor", 1)]
        } else {
            Vec::new()
        },
        purchasable,
    }
}

pub fn slot(id: &str, required: bool, allowed: &[&str]) -> SlotDescriptor {
    SlotDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        name_id: id.to_string(),
        required,
        allowed_items: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn lookup_from(items: Vec<Item>) -> ItemLookup {
    items.into_iter().collect()
}
