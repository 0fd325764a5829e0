//! Catalog normalization.
//!
//! Consumes raw catalog entries (weapons and modification items, as returned
//! by the upstream GraphQL API) and produces a uniform [`ItemLookup`]: for
//! each item its kind, slot list, stat block, purchase offers, conflicts and,
//! for weapons, factory presets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pricing::FLEA_MARKET;

/// Sentinel price marking an item as not directly purchasable.
pub const NOT_PURCHASABLE_PRICE: u64 = 999_999_999;

/// Any price above this threshold means "not purchasable".
pub const NOT_PURCHASABLE_THRESHOLD: u64 = 100_000_000;

// =============================================================================
// Raw catalog types (upstream GraphQL JSON, camelCase)
// =============================================================================

/// A raw catalog entry, weapon or modification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawItem {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub icon_link: Option<String>,
    pub image_link: Option<String>,
    #[serde(rename = "image512pxLink")]
    pub image512px_link: Option<String>,
    pub weight: f64,
    pub ergonomics_modifier: Option<f64>,
    pub recoil_modifier: Option<f64>,
    pub min_level_for_flea: Option<i64>,
    pub bsg_category: Option<RawCategory>,
    pub buy_for: Vec<RawOffer>,
    pub conflicting_items: Vec<RawRef>,
    pub properties: Option<RawProperties>,
}

/// Reference to another catalog entry by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOffer {
    #[serde(rename = "priceRUB")]
    pub price_rub: Option<i64>,
    pub source: String,
    pub vendor: Option<RawVendor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawVendor {
    pub name: String,
    pub normalized_name: String,
    pub min_trader_level: Option<i64>,
}

/// Polymorphic `properties` object, flattened to all-optional fields.
///
/// Weapons populate the ergonomics/recoil/preset/caliber fields, mods the
/// modifier/capacity fields; both may carry `slots`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawProperties {
    pub caliber: Option<String>,
    pub ergonomics: Option<f64>,
    pub recoil_vertical: Option<i64>,
    pub recoil_horizontal: Option<i64>,
    pub default_ergonomics: Option<f64>,
    pub default_recoil_vertical: Option<i64>,
    pub default_recoil_horizontal: Option<i64>,
    pub sighting_range: Option<i64>,
    pub capacity: Option<i64>,
    pub recoil_modifier: Option<f64>,
    pub default_preset: Option<RawPresetImages>,
    pub presets: Vec<RawPreset>,
    pub slots: Vec<RawSlot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSlot {
    pub id: String,
    pub name: String,
    pub name_id: String,
    pub required: bool,
    pub filters: Option<RawSlotFilters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSlotFilters {
    pub allowed_items: Vec<RawRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPreset {
    pub id: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub contains_items: Vec<RawContained>,
    pub buy_for: Vec<RawOffer>,
    pub icon_link: Option<String>,
    pub image_link: Option<String>,
    #[serde(rename = "image512pxLink")]
    pub image512px_link: Option<String>,
    pub grid_image_link: Option<String>,
    pub base_image_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContained {
    pub item: RawRef,
}

/// Image links of a weapon's factory default preset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPresetImages {
    pub icon_link: Option<String>,
    pub image_link: Option<String>,
    #[serde(rename = "image512pxLink")]
    pub image512px_link: Option<String>,
    pub grid_image_link: Option<String>,
}

// =============================================================================
// Normalized types
// =============================================================================

/// One (price, source, level) tuple under which an item can be bought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub price: u64,
    /// `fleaMarket` or a trader source key.
    pub source: String,
    pub vendor_name: String,
    /// Stable lower-case key used to look up the trader loyalty level.
    pub vendor_normalized: String,
    /// Required loyalty level; `None` for flea-market offers.
    pub trader_level: Option<i64>,
}

/// A factory-configured weapon instance sold at a single bundled price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    /// Item ids bundled into this preset.
    pub items: Vec<String>,
    pub image: Option<String>,
    /// Lowest offer price, 0 when the preset has no positive-price offer.
    pub price: u64,
    pub price_source: String,
    pub offers: Vec<Offer>,
    pub purchasable: bool,
}

/// A modification slot and the items allowed into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub id: String,
    pub name: String,
    pub name_id: String,
    pub required: bool,
    /// Allowed child item ids, in raw catalog order.
    pub allowed_items: Vec<String>,
}

/// Stat block of a weapon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponStats {
    pub naked_ergonomics: i64,
    pub naked_recoil_v: i64,
    pub naked_recoil_h: i64,
    pub default_ergonomics: i64,
    pub default_recoil_v: i64,
    pub default_recoil_h: i64,
    pub caliber: String,
    pub weight: f64,
    pub sighting_range: i64,
    pub category: String,
    pub category_id: String,
    /// Cheapest trader offer, or [`NOT_PURCHASABLE_PRICE`].
    pub price: u64,
    pub price_source: String,
}

/// Stat block of a modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModStats {
    /// Additive ergonomics bonus.
    pub ergonomics: f64,
    /// Fractional recoil delta; positive means worse.
    pub recoil_modifier: f64,
    pub weight: f64,
    /// Magazine capacity (magazines only, else 0).
    pub capacity: i64,
    /// Sighting range (sights only, else 0).
    pub sighting_range: i64,
    pub min_level_flea: i64,
    pub category: String,
    pub category_id: String,
    /// Cheapest offer price regardless of access constraints.
    pub price: u64,
    pub price_source: String,
    /// All positive-price offers, ascending by price.
    pub offers: Vec<Offer>,
}

/// Tagged item payload: weapon or modification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Weapon {
        stats: WeaponStats,
        /// All factory presets, purchasable or not (see [`Preset::purchasable`]).
        presets: Vec<Preset>,
    },
    Mod {
        stats: ModStats,
        /// Ids that cannot coexist with this item.
        conflicts: Vec<String>,
    },
}

/// A normalized catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub image: Option<String>,
    pub slots: Vec<SlotDescriptor>,
    pub kind: ItemKind,
}

/// Offer view used by the pricing resolver: an item's offers plus its
/// fallback price and flea level gate.
#[derive(Debug, Clone, Copy)]
pub struct PriceInfo<'a> {
    pub offers: &'a [Offer],
    pub price: u64,
    pub price_source: &'a str,
    pub min_level_flea: i64,
}

impl Item {
    pub fn is_weapon(&self) -> bool {
        matches!(self.kind, ItemKind::Weapon { .. })
    }

    pub fn weapon_stats(&self) -> Option<&WeaponStats> {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => Some(stats),
            ItemKind::Mod { .. } => None,
        }
    }

    pub fn mod_stats(&self) -> Option<&ModStats> {
        match &self.kind {
            ItemKind::Mod { stats, .. } => Some(stats),
            ItemKind::Weapon { .. } => None,
        }
    }

    /// All factory presets (weapons only; empty for mods).
    pub fn presets(&self) -> &[Preset] {
        match &self.kind {
            ItemKind::Weapon { presets, .. } => presets,
            ItemKind::Mod { .. } => &[],
        }
    }

    /// Conflicting item ids (mods only; empty for weapons).
    pub fn conflicts(&self) -> &[String] {
        match &self.kind {
            ItemKind::Mod { conflicts, .. } => conflicts,
            ItemKind::Weapon { .. } => &[],
        }
    }

    pub fn category(&self) -> &str {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => &stats.category,
            ItemKind::Mod { stats, .. } => &stats.category,
        }
    }

    pub fn category_id(&self) -> &str {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => &stats.category_id,
            ItemKind::Mod { stats, .. } => &stats.category_id,
        }
    }

    /// Additive ergonomics contribution when attached (0 for weapons).
    pub fn ergonomics_modifier(&self) -> f64 {
        self.mod_stats().map(|s| s.ergonomics).unwrap_or(0.0)
    }

    /// Fractional recoil contribution when attached (0 for weapons).
    pub fn recoil_modifier(&self) -> f64 {
        self.mod_stats().map(|s| s.recoil_modifier).unwrap_or(0.0)
    }

    pub fn attached_weight(&self) -> f64 {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => stats.weight,
            ItemKind::Mod { stats, .. } => stats.weight,
        }
    }

    pub fn magazine_capacity(&self) -> i64 {
        self.mod_stats().map(|s| s.capacity).unwrap_or(0)
    }

    pub fn sighting_range(&self) -> i64 {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => stats.sighting_range,
            ItemKind::Mod { stats, .. } => stats.sighting_range,
        }
    }

    /// The pricing-resolver view of this item.
    pub fn price_info(&self) -> PriceInfo<'_> {
        match &self.kind {
            ItemKind::Weapon { stats, .. } => PriceInfo {
                offers: &[],
                price: stats.price,
                price_source: &stats.price_source,
                min_level_flea: 0,
            },
            ItemKind::Mod { stats, .. } => PriceInfo {
                offers: &stats.offers,
                price: stats.price,
                price_source: &stats.price_source,
                min_level_flea: stats.min_level_flea,
            },
        }
    }
}

impl Preset {
    /// The pricing-resolver view of this preset's bundled offers.
    pub fn price_info(&self) -> PriceInfo<'_> {
        PriceInfo {
            offers: &self.offers,
            price: self.price,
            price_source: &self.price_source,
            min_level_flea: 0,
        }
    }
}

/// Mapping from item id to normalized [`Item`] record.
///
/// Built once per catalog snapshot and never mutated afterwards; safe to
/// share behind an `Arc` for concurrent reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemLookup {
    items: HashMap<String, Item>,
}

impl ItemLookup {
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Item)> {
        self.items.iter()
    }

    pub fn weapons(&self) -> impl Iterator<Item = &Item> {
        self.items.values().filter(|i| i.is_weapon())
    }
}

impl FromIterator<Item> for ItemLookup {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Build the item lookup from raw weapon and mod catalog entries.
///
/// Mods with no positive-price offer at any source are dropped: they are
/// obtainable only through presets and re-enter the optimization via the
/// preset that bundles them.
pub fn build_item_lookup(weapons: &[RawItem], mods: &[RawItem]) -> ItemLookup {
    tracing::info!(weapons = weapons.len(), mods = mods.len(), "building item lookup");
    let mut items = HashMap::new();

    for raw in weapons {
        let props = raw.properties.clone().unwrap_or_default();
        let item = Item {
            id: raw.id.clone(),
            name: raw.name.clone(),
            icon: raw.icon_link.clone().or_else(|| raw.image_link.clone()),
            image: weapon_image(raw, &props),
            slots: extract_slots(&props),
            kind: ItemKind::Weapon {
                stats: extract_weapon_stats(raw, &props),
                presets: extract_presets(&props),
            },
        };
        items.insert(raw.id.clone(), item);
    }

    for raw in mods {
        if !has_valid_price(raw) {
            continue;
        }
        let props = raw.properties.clone().unwrap_or_default();
        let item = Item {
            id: raw.id.clone(),
            name: raw.name.clone(),
            icon: raw
                .icon_link
                .clone()
                .or_else(|| raw.image_link.clone())
                .or_else(|| raw.image512px_link.clone()),
            image: raw.image512px_link.clone().or_else(|| raw.image_link.clone()),
            slots: extract_slots(&props),
            kind: ItemKind::Mod {
                stats: extract_mod_stats(raw, &props),
                conflicts: raw.conflicting_items.iter().map(|c| c.id.clone()).collect(),
            },
        };
        items.insert(raw.id.clone(), item);
    }

    ItemLookup { items }
}

/// True when the entry has at least one positive-price offer.
fn has_valid_price(raw: &RawItem) -> bool {
    raw.buy_for.iter().any(|o| o.price_rub.unwrap_or(0) > 0)
}

/// Collect positive-price offers, ascending by price.
fn extract_offers(buy_for: &[RawOffer]) -> Vec<Offer> {
    let mut offers: Vec<Offer> = buy_for
        .iter()
        .filter_map(|raw| {
            let price = raw.price_rub.unwrap_or(0);
            if price <= 0 {
                return None;
            }
            let vendor = raw.vendor.clone().unwrap_or_default();
            let trader_level = if raw.source == FLEA_MARKET {
                None
            } else {
                Some(vendor.min_trader_level.unwrap_or(1))
            };
            Some(Offer {
                price: price as u64,
                source: raw.source.clone(),
                vendor_name: vendor.name,
                vendor_normalized: vendor.normalized_name,
                trader_level,
            })
        })
        .collect();
    offers.sort_by_key(|o| o.price);
    offers
}

/// Slot extraction is identical for weapons and mods.
fn extract_slots(props: &RawProperties) -> Vec<SlotDescriptor> {
    props
        .slots
        .iter()
        .map(|slot| SlotDescriptor {
            id: slot.id.clone(),
            name: slot.name.clone(),
            name_id: slot.name_id.clone(),
            required: slot.required,
            allowed_items: slot
                .filters
                .iter()
                .flat_map(|f| f.allowed_items.iter().map(|r| r.id.clone()))
                .collect(),
        })
        .collect()
}

fn extract_weapon_stats(raw: &RawItem, props: &RawProperties) -> WeaponStats {
    // Naked price is the cheapest trader offer; flea listings are for
    // assembled presets and do not price the stripped receiver.
    let trader_offer = raw
        .buy_for
        .iter()
        .filter(|o| o.source != FLEA_MARKET && o.price_rub.unwrap_or(0) > 0)
        .min_by_key(|o| o.price_rub.unwrap_or(i64::MAX));

    let (price, price_source) = match trader_offer {
        Some(o) => (o.price_rub.unwrap_or(0) as u64, o.source.clone()),
        None => (NOT_PURCHASABLE_PRICE, "not_available".to_string()),
    };

    let (category, category_id) = category_of(raw);

    WeaponStats {
        naked_ergonomics: props.ergonomics.unwrap_or(0.0).round() as i64,
        naked_recoil_v: props.recoil_vertical.unwrap_or(0),
        naked_recoil_h: props.recoil_horizontal.unwrap_or(0),
        default_ergonomics: props.default_ergonomics.unwrap_or(0.0).round() as i64,
        default_recoil_v: props.default_recoil_vertical.unwrap_or(0),
        default_recoil_h: props.default_recoil_horizontal.unwrap_or(0),
        caliber: props.caliber.clone().unwrap_or_default(),
        weight: raw.weight,
        sighting_range: props.sighting_range.unwrap_or(0),
        category,
        category_id,
        price,
        price_source,
    }
}

fn extract_mod_stats(raw: &RawItem, props: &RawProperties) -> ModStats {
    // Recoil modifier precedence: nested fractional value wins; a non-zero
    // top-level value is a percentage and is divided by 100; else 0.
    let props_recoil = props.recoil_modifier.unwrap_or(0.0);
    let top_recoil = raw.recoil_modifier.unwrap_or(0.0);
    let recoil_modifier = if props_recoil != 0.0 {
        props_recoil
    } else if top_recoil != 0.0 {
        top_recoil / 100.0
    } else {
        0.0
    };

    let offers = extract_offers(&raw.buy_for);
    let (price, price_source) = match offers.first() {
        Some(o) => (o.price, o.source.clone()),
        None => (0, "market".to_string()),
    };

    let (category, category_id) = category_of(raw);

    ModStats {
        ergonomics: raw.ergonomics_modifier.unwrap_or(0.0),
        recoil_modifier,
        weight: raw.weight,
        capacity: props.capacity.unwrap_or(0),
        sighting_range: props.sighting_range.unwrap_or(0),
        min_level_flea: raw.min_level_for_flea.unwrap_or(0),
        category,
        category_id,
        price,
        price_source,
        offers,
    }
}

fn extract_presets(props: &RawProperties) -> Vec<Preset> {
    props
        .presets
        .iter()
        .map(|raw| {
            let items: Vec<String> = raw
                .contains_items
                .iter()
                .map(|c| c.item.id.clone())
                .collect();
            let offers = extract_offers(&raw.buy_for);
            let (price, price_source) = match offers.first() {
                Some(o) => (o.price, o.source.clone()),
                None => (0, "not_available".to_string()),
            };
            Preset {
                id: raw.id.clone(),
                name: raw
                    .name
                    .clone()
                    .or_else(|| raw.short_name.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                items,
                image: raw
                    .image512px_link
                    .clone()
                    .or_else(|| raw.image_link.clone())
                    .or_else(|| raw.grid_image_link.clone())
                    .or_else(|| raw.base_image_link.clone()),
                purchasable: price > 0,
                price,
                price_source,
                offers,
            }
        })
        .collect()
}

fn category_of(raw: &RawItem) -> (String, String) {
    match &raw.bsg_category {
        Some(c) => (c.name.clone(), c.id.clone()),
        None => (String::new(), String::new()),
    }
}

fn weapon_image(raw: &RawItem, props: &RawProperties) -> Option<String> {
    let preset = props.default_preset.as_ref();
    preset
        .and_then(|p| p.image512px_link.clone())
        .or_else(|| preset.and_then(|p| p.image_link.clone()))
        .or_else(|| preset.and_then(|p| p.grid_image_link.clone()))
        .or_else(|| preset.and_then(|p| p.icon_link.clone()))
        .or_else(|| raw.image512px_link.clone())
        .or_else(|| raw.image_link.clone())
        .or_else(|| raw.icon_link.clone())
}
