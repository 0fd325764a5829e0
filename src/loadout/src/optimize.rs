//! Loadout optimization.
//!
//! Translates weapon + compatibility graph + user constraints into a 0/1
//! integer program and solves it: decision variables for bases (naked weapon
//! or factory preset), items, purchases and slot placements; linear
//! constraints for slot capacity, conflicts, required slots, budget and stat
//! limits; a weighted linear objective over ergonomics, recoil and price.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, variables, Constraint, Expression, Solution, SolverModel, Variable};
use serde::{Deserialize, Serialize};

use crate::catalog::{Item, ItemLookup, WeaponStats, NOT_PURCHASABLE_THRESHOLD};
use crate::compat::CompatibilityMap;
use crate::pricing::{cheapest_price, TraderLevels, FLEA_MARKET};
use crate::Error;

// Scale factors keeping the model in integer units:
// ergonomics are modeled in tenths, recoil modifiers in thousandths,
// weights in grams, and objective weights are scaled by 1000.
pub const ERGO_SCALE: i64 = 10;
pub const RECOIL_SCALE: i64 = 1000;
pub const WEIGHT_SCALE: i64 = 1000;
pub const OBJECTIVE_SCALE: i64 = 1000;

/// Ergonomics cap (100) in model tenths.
const ERGO_CAP_TENTHS: i64 = 100 * ERGO_SCALE;
/// Big-M for the ergonomics deficit switch; covers any reachable ergo sum.
const ERGO_DEFICIT_BIG: i64 = 5000;

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Wall-clock limit in seconds. The bundled microlp backend exposes no
    /// time-limit parameter, so this is advisory there.
    pub max_time_seconds: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_time_seconds: 120.0,
        }
    }
}

/// User constraints for one optimization request.
///
/// Everything is optional; omitted fields fall back to the documented
/// defaults (objective weights 1/1/0, flea market available, all traders
/// at loyalty 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub max_price: Option<u64>,
    pub min_ergonomics: Option<i64>,
    pub max_recoil_v: Option<f64>,
    /// Upper bound on vertical + horizontal recoil after modifiers.
    pub max_recoil_sum: Option<f64>,
    pub min_mag_capacity: Option<i64>,
    pub min_sighting_range: Option<i64>,
    /// Total weight limit in kilograms.
    pub max_weight: Option<f64>,
    /// Item ids that must appear in the solution.
    pub include_items: Vec<String>,
    pub exclude_items: Vec<String>,
    /// OR-groups of category id or name; each group must be satisfied by at
    /// least one selected item.
    pub include_categories: Vec<Vec<String>>,
    pub exclude_categories: Vec<String>,
    pub ergo_weight: f64,
    pub recoil_weight: f64,
    pub price_weight: f64,
    pub trader_levels: Option<TraderLevels>,
    pub flea_available: bool,
    pub player_level: Option<i64>,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_price: None,
            min_ergonomics: None,
            max_recoil_v: None,
            max_recoil_sum: None,
            min_mag_capacity: None,
            min_sighting_range: None,
            max_weight: None,
            include_items: Vec::new(),
            exclude_items: Vec::new(),
            include_categories: Vec::new(),
            exclude_categories: Vec::new(),
            ergo_weight: 1.0,
            recoil_weight: 1.0,
            price_weight: 0.0,
            trader_levels: None,
            flea_available: true,
            player_level: None,
        }
    }
}

/// Outcome status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeStatus {
    Optimal,
    Feasible,
    Infeasible,
}

/// One selected item with display and stat details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    pub name: String,
    /// Resolved individual price (what buying it separately would cost).
    pub price: u64,
    pub icon: Option<String>,
    pub source: Option<String>,
    pub ergonomics: f64,
    pub recoil_modifier: f64,
}

/// The chosen factory preset, when the base is not the naked weapon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetDetail {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub items: Vec<String>,
    pub icon: Option<String>,
    pub source: Option<String>,
}

/// Base forced without purchase when nothing purchasable exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackBase {
    Preset { id: String, name: String, price: u64 },
    Naked { price: u64 },
}

/// Final stats recomputed from the selected items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalStats {
    pub ergonomics: f64,
    pub recoil_vertical: f64,
    pub recoil_horizontal: f64,
    pub recoil_multiplier: f64,
    pub total_price: u64,
    pub total_weight: f64,
}

/// Result of one optimization request. Infeasibility is reported here, not
/// as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub status: OptimizeStatus,
    pub selected_items: Vec<ItemDetail>,
    pub selected_preset: Option<PresetDetail>,
    pub fallback_base: Option<FallbackBase>,
    pub objective_value: f64,
    pub reason: Option<String>,
    pub final_stats: Option<FinalStats>,
}

impl OptimizeResult {
    fn infeasible(reason: String) -> Self {
        Self {
            status: OptimizeStatus::Infeasible,
            selected_items: Vec::new(),
            selected_preset: None,
            fallback_base: None,
            objective_value: 0.0,
            reason: Some(reason),
            final_stats: None,
        }
    }
}

/// Candidate base configuration: the naked weapon or one factory preset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum BaseId {
    Naked,
    Preset(String),
}

/// Per-item pricing as seen by the model.
#[derive(Debug, Clone)]
struct ItemPricing {
    /// Price charged when bought individually (0 when unavailable).
    price: u64,
    source: Option<String>,
    /// Whether the item can be bought on its own under the access rules.
    available: bool,
}

/// Optimize with the default solver configuration.
pub fn optimize(
    weapon_id: &str,
    lookup: &ItemLookup,
    compat: &CompatibilityMap,
    constraints: &Constraints,
) -> Result<OptimizeResult, Error> {
    optimize_with(weapon_id, lookup, compat, constraints, &SolverConfig::default())
}

/// Build and solve the loadout model for one weapon.
///
/// Returns `Err` only when the weapon id does not resolve to a weapon;
/// every other failure mode (unsatisfiable constraints, solver failure) is
/// an infeasible [`OptimizeResult`].
pub fn optimize_with(
    weapon_id: &str,
    lookup: &ItemLookup,
    compat: &CompatibilityMap,
    c: &Constraints,
    _config: &SolverConfig,
) -> Result<OptimizeResult, Error> {
    let weapon = lookup
        .get(weapon_id)
        .ok_or_else(|| Error::WeaponNotFound(weapon_id.to_string()))?;
    let wstats = weapon
        .weapon_stats()
        .ok_or_else(|| Error::WeaponNotFound(weapon_id.to_string()))?;

    tracing::info!(weapon = weapon_id, "optimization request");

    let reasons = check_feasibility(wstats, lookup, compat, c);
    if !reasons.is_empty() {
        return Ok(OptimizeResult::infeasible(reasons.join("; ")));
    }

    let trader_levels = c.trader_levels.unwrap_or_default();

    // Candidate presets: purchasable under the current access rules.
    let mut preset_prices: BTreeMap<String, u64> = BTreeMap::new();
    let mut preset_items: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut item_presets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for preset in weapon.presets().iter().filter(|p| p.purchasable) {
        let Some(resolved) = cheapest_price(
            &preset.price_info(),
            &trader_levels,
            c.flea_available,
            c.player_level,
        ) else {
            continue;
        };
        let contained: BTreeSet<String> = preset.items.iter().cloned().collect();
        for item_id in &contained {
            item_presets
                .entry(item_id.clone())
                .or_default()
                .push(preset.id.clone());
        }
        preset_prices.insert(preset.id.clone(), resolved.price);
        preset_items.insert(preset.id.clone(), contained);
    }

    // Admissible items: reachable, not excluded, and either individually
    // purchasable or contained by some candidate preset.
    let exclude_items: HashSet<&str> = c.exclude_items.iter().map(String::as_str).collect();
    let exclude_categories: HashSet<&str> =
        c.exclude_categories.iter().map(String::as_str).collect();
    let mut admissible: BTreeMap<String, ItemPricing> = BTreeMap::new();
    for item_id in &compat.reachable {
        if exclude_items.contains(item_id.as_str()) {
            continue;
        }
        let Some(item) = lookup.get(item_id) else {
            continue;
        };
        let category = item.category();
        if !category.is_empty() && exclude_categories.contains(category) {
            continue;
        }

        let resolved = cheapest_price(
            &item.price_info(),
            &trader_levels,
            c.flea_available,
            c.player_level,
        );
        let in_preset = item_presets.contains_key(item_id);
        let (mut price, mut source, mut available) = match resolved {
            Some(r) => (r.price, Some(r.source), true),
            None => (0, None, false),
        };
        // Sentinel-priced entries are never bought directly; they only
        // enter as preset contents.
        if item.price_info().price > NOT_PURCHASABLE_THRESHOLD {
            if !in_preset {
                continue;
            }
            price = 0;
            source = None;
            available = false;
        }
        if !available && !in_preset {
            continue;
        }
        admissible.insert(
            item_id.clone(),
            ItemPricing {
                price,
                source,
                available,
            },
        );
    }

    // Base variables: one per candidate preset, plus naked iff purchasable.
    let mut vars = variables!();
    let mut base_vars: Vec<(BaseId, Variable)> = Vec::new();
    let naked_purchasable = wstats.price < NOT_PURCHASABLE_THRESHOLD;
    let mut fallback_base: Option<FallbackBase> = None;

    if naked_purchasable {
        base_vars.push((BaseId::Naked, vars.add(variable().binary())));
    }
    for preset_id in preset_prices.keys() {
        base_vars.push((BaseId::Preset(preset_id.clone()), vars.add(variable().binary())));
    }

    if base_vars.is_empty() {
        // Nothing purchasable: fall back to the first factory preset at
        // price zero, or to the naked weapon when no presets exist.
        if let Some(first) = weapon.presets().first() {
            base_vars.push((BaseId::Preset(first.id.clone()), vars.add(variable().binary())));
            let contained: BTreeSet<String> = first.items.iter().cloned().collect();
            for item_id in &contained {
                item_presets
                    .entry(item_id.clone())
                    .or_default()
                    .push(first.id.clone());
                if compat.reachable.contains(item_id) && !admissible.contains_key(item_id) {
                    admissible.insert(
                        item_id.clone(),
                        ItemPricing {
                            price: 0,
                            source: Some("fallback_preset".to_string()),
                            available: false,
                        },
                    );
                }
            }
            preset_items.insert(first.id.clone(), contained);
            preset_prices.insert(first.id.clone(), 0);
            fallback_base = Some(FallbackBase::Preset {
                id: first.id.clone(),
                name: first.name.clone(),
                price: 0,
            });
        } else {
            base_vars.push((BaseId::Naked, vars.add(variable().binary())));
            fallback_base = Some(FallbackBase::Naked { price: 0 });
        }
    }

    let x: BTreeMap<String, Variable> = admissible
        .keys()
        .map(|id| (id.clone(), vars.add(variable().binary())))
        .collect();
    let buy: BTreeMap<String, Variable> = admissible
        .keys()
        .map(|id| (id.clone(), vars.add(variable().binary())))
        .collect();

    let mut constraints: Vec<Constraint> = Vec::new();

    // Exactly one base.
    let mut base_sum = Expression::from(0.0);
    for (_, v) in &base_vars {
        base_sum += *v;
    }
    constraints.push(constraint!(base_sum == 1.0));

    // Base variables of the candidate presets containing an item. With base
    // exclusivity, their sum equals the "any containing preset selected"
    // indicator.
    let containing_vars = |item_id: &str| -> Vec<Variable> {
        item_presets
            .get(item_id)
            .map(|pids| {
                pids.iter()
                    .filter_map(|pid| {
                        base_vars.iter().find_map(|(b, v)| match b {
                            BaseId::Preset(p) if p == pid => Some(*v),
                            _ => None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    // Preset-only availability and buy linkage.
    for (item_id, pricing) in &admissible {
        let xv = x[item_id];
        let bv = buy[item_id];
        let containing = containing_vars(item_id);

        if !pricing.available {
            if containing.is_empty() {
                constraints.push(constraint!(Expression::from(xv) == 0.0));
            } else {
                constraints.push(constraint!(Expression::from(xv) - expr_sum(&containing) <= 0.0));
            }
        }

        if containing.is_empty() {
            constraints.push(constraint!(Expression::from(bv) - xv == 0.0));
        } else {
            let covered = expr_sum(&containing);
            constraints.push(constraint!(Expression::from(bv) - xv <= 0.0));
            constraints.push(constraint!(Expression::from(bv) + covered.clone() <= 1.0));
            constraints.push(constraint!(Expression::from(bv) - xv + covered >= 0.0));
        }
    }

    // Legitimate slots per item: the slot allows it and the slot's owner is
    // the weapon or itself a model item.
    let mut valid_slots: BTreeMap<String, Vec<(String, String, bool)>> =
        x.keys().map(|id| (id.clone(), Vec::new())).collect();
    for (slot_id, slot_item_ids) in &compat.slot_items {
        let Some(owner) = compat.slot_owner.get(slot_id) else {
            continue;
        };
        let is_base = owner == weapon_id;
        if !is_base && !x.contains_key(owner) {
            continue;
        }
        for item_id in slot_item_ids {
            if let Some(list) = valid_slots.get_mut(item_id) {
                list.push((slot_id.clone(), owner.clone(), is_base));
            }
        }
    }

    // Placement variables for items that could attach in more than one slot.
    let mut placed: BTreeMap<String, BTreeMap<String, Variable>> = BTreeMap::new();
    for (item_id, slots) in &valid_slots {
        if slots.len() > 1 {
            let slot_vars: BTreeMap<String, Variable> = slots
                .iter()
                .map(|(slot_id, _, _)| (slot_id.clone(), vars.add(variable().binary())))
                .collect();
            placed.insert(item_id.clone(), slot_vars);
        }
    }
    for (item_id, slot_vars) in &placed {
        let mut placements = Expression::from(0.0);
        for v in slot_vars.values() {
            placements += *v;
        }
        constraints.push(constraint!(placements - x[item_id] == 0.0));
    }

    // Contribution of an item to a specific slot's occupancy.
    let slot_contribution = |item_id: &str, slot_id: &str| -> Option<Variable> {
        if let Some(slot_vars) = placed.get(item_id) {
            return slot_vars.get(slot_id).copied();
        }
        let slots = valid_slots.get(item_id)?;
        match slots.as_slice() {
            [(only, _, _)] if only == slot_id => x.get(item_id).copied(),
            _ => None,
        }
    };

    // At most one item per slot.
    for (slot_id, slot_item_ids) in &compat.slot_items {
        let mut terms = Vec::new();
        for item_id in slot_item_ids {
            if let Some(v) = slot_contribution(item_id, slot_id) {
                terms.push(v);
            }
        }
        if !terms.is_empty() {
            constraints.push(constraint!(expr_sum(&terms) <= 1.0));
        }
    }

    // Parent attachment: anything reachable only through a non-top-level
    // owner is gated by that owner being present.
    for (item_id, slots) in &valid_slots {
        let xv = x[item_id];
        if slots.is_empty() {
            constraints.push(constraint!(Expression::from(xv) == 0.0));
            continue;
        }
        if let Some(slot_vars) = placed.get(item_id) {
            for (slot_id, owner, is_base) in slots {
                if *is_base {
                    continue;
                }
                if let (Some(pv), Some(ov)) = (slot_vars.get(slot_id), x.get(owner)) {
                    constraints.push(constraint!(Expression::from(*pv) - *ov <= 0.0));
                }
            }
        } else if let [(_, owner, is_base)] = slots.as_slice() {
            if !is_base {
                if let Some(ov) = x.get(owner) {
                    constraints.push(constraint!(Expression::from(xv) - *ov <= 0.0));
                }
            }
        }
    }

    // Required slots: top-level ones unconditionally, nested ones gated on
    // their owner being selected.
    for slot in &weapon.slots {
        if !slot.required {
            continue;
        }
        let terms = slot_terms(&compat.slot_items, &slot.id, &slot_contribution);
        if !terms.is_empty() {
            constraints.push(constraint!(expr_sum(&terms) >= 1.0));
        }
    }
    for (owner_id, _) in &compat.item_slots {
        let Some(ov) = x.get(owner_id) else {
            continue;
        };
        let Some(owner_item) = lookup.get(owner_id) else {
            continue;
        };
        for slot in &owner_item.slots {
            if !slot.required {
                continue;
            }
            let terms = slot_terms(&compat.slot_items, &slot.id, &slot_contribution);
            if !terms.is_empty() {
                constraints.push(constraint!(expr_sum(&terms) - *ov >= 0.0));
            }
        }
    }

    // Conflicts, each unordered pair once.
    let mut conflict_pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for item_id in admissible.keys() {
        let Some(item) = lookup.get(item_id) else {
            continue;
        };
        for conflict_id in item.conflicts() {
            if !x.contains_key(conflict_id) {
                continue;
            }
            let pair = if item_id < conflict_id {
                (item_id.clone(), conflict_id.clone())
            } else {
                (conflict_id.clone(), item_id.clone())
            };
            if conflict_pairs.insert(pair) {
                constraints.push(constraint!(x[item_id] + x[conflict_id] <= 1.0));
            }
        }
    }

    // Mandatory inclusions.
    for required_id in &c.include_items {
        match x.get(required_id) {
            Some(v) => constraints.push(constraint!(Expression::from(*v) == 1.0)),
            None => {
                let name = item_name(lookup, required_id);
                return Ok(OptimizeResult::infeasible(format!(
                    "Required item '{name}' is not available with the current constraints"
                )));
            }
        }
    }
    for group in &c.include_categories {
        if group.is_empty() {
            continue;
        }
        let mut terms = Vec::new();
        for (item_id, v) in &x {
            let Some(item) = lookup.get(item_id) else {
                continue;
            };
            if group
                .iter()
                .any(|g| g == item.category_id() || g == item.category())
            {
                terms.push(*v);
            }
        }
        if terms.is_empty() {
            return Ok(OptimizeResult::infeasible(format!(
                "No items found for required category group: {group:?}"
            )));
        }
        constraints.push(constraint!(expr_sum(&terms) >= 1.0));
    }

    // Spend: base price plus individually-bought items.
    let model_naked_price = if matches!(fallback_base, Some(FallbackBase::Naked { .. })) {
        0
    } else {
        wstats.price
    };
    let mut price_expr = Expression::from(0.0);
    for (base_id, v) in &base_vars {
        let price = match base_id {
            BaseId::Naked => model_naked_price,
            BaseId::Preset(pid) => preset_prices.get(pid).copied().unwrap_or(0),
        };
        if price > 0 {
            price_expr += price as f64 * *v;
        }
    }
    for (item_id, pricing) in &admissible {
        if pricing.price > 0 {
            price_expr += pricing.price as f64 * buy[item_id];
        }
    }
    if let Some(max_price) = c.max_price {
        let limit = max_price as f64;
        constraints.push(constraint!(price_expr.clone() <= limit));
    }

    // Ergonomics in tenths, capped into [0, 100] for the objective.
    let mut ergo_tenths = Expression::from((wstats.naked_ergonomics * ERGO_SCALE) as f64);
    for item_id in admissible.keys() {
        let Some(item) = lookup.get(item_id) else {
            continue;
        };
        let tenths = (item.ergonomics_modifier() * ERGO_SCALE as f64) as i64;
        if tenths != 0 {
            ergo_tenths += tenths as f64 * x[item_id];
        }
    }
    let cap = ERGO_CAP_TENTHS as f64;
    let deficit_big = ERGO_DEFICIT_BIG as f64;
    let capped_ergo = vars.add(variable().min(0.0).max(cap));
    let ergo_deficit = vars.add(variable().binary());
    constraints.push(constraint!(
        Expression::from(capped_ergo) - ergo_tenths.clone() - deficit_big * ergo_deficit <= 0.0
    ));
    constraints.push(constraint!(
        Expression::from(capped_ergo) + cap * ergo_deficit <= cap
    ));
    if let Some(min_ergo) = c.min_ergonomics {
        let floor = (min_ergo * ERGO_SCALE) as f64;
        constraints.push(constraint!(ergo_tenths.clone() >= floor));
    }

    // Recoil modifier sum in thousandths.
    let mut recoil_milli = Expression::from(0.0);
    let mut recoil_milli_of: BTreeMap<String, i64> = BTreeMap::new();
    for item_id in admissible.keys() {
        let Some(item) = lookup.get(item_id) else {
            continue;
        };
        let milli = (item.recoil_modifier() * RECOIL_SCALE as f64) as i64;
        recoil_milli_of.insert(item_id.clone(), milli);
        if milli != 0 {
            recoil_milli += milli as f64 * x[item_id];
        }
    }
    if let Some(max_v) = c.max_recoil_v {
        if wstats.naked_recoil_v > 0 {
            let bound =
                (RECOIL_SCALE as f64 * (max_v / wstats.naked_recoil_v as f64 - 1.0)) as i64 as f64;
            constraints.push(constraint!(recoil_milli.clone() <= bound));
        }
    }
    if let Some(max_sum) = c.max_recoil_sum {
        let naked_sum = wstats.naked_recoil_v + wstats.naked_recoil_h;
        if naked_sum > 0 {
            let bound = (RECOIL_SCALE as f64 * (max_sum / naked_sum as f64 - 1.0)) as i64 as f64;
            constraints.push(constraint!(recoil_milli.clone() <= bound));
        }
    }

    // Magazine capacity gate (always when requested) and sighting range gate
    // (only when the weapon's own range is insufficient).
    if let Some(min_cap) = c.min_mag_capacity {
        let terms: Vec<Variable> = admissible
            .keys()
            .filter(|id| {
                lookup
                    .get(id)
                    .is_some_and(|item| item.magazine_capacity() >= min_cap)
            })
            .filter_map(|id| x.get(id).copied())
            .collect();
        if terms.is_empty() {
            return Ok(OptimizeResult::infeasible(format!(
                "No magazine with capacity >= {min_cap} rounds available"
            )));
        }
        constraints.push(constraint!(expr_sum(&terms) >= 1.0));
    }
    if let Some(min_range) = c.min_sighting_range {
        if wstats.sighting_range < min_range {
            let terms: Vec<Variable> = admissible
                .keys()
                .filter(|id| {
                    lookup
                        .get(id)
                        .is_some_and(|item| item.sighting_range() >= min_range)
                })
                .filter_map(|id| x.get(id).copied())
                .collect();
            if terms.is_empty() {
                return Ok(OptimizeResult::infeasible(format!(
                    "No sight with sighting range >= {min_range}m available"
                )));
            }
            constraints.push(constraint!(expr_sum(&terms) >= 1.0));
        }
    }

    // Weight limit in grams.
    if let Some(max_weight) = c.max_weight {
        let base_grams = (wstats.weight * WEIGHT_SCALE as f64) as i64;
        let max_grams = (max_weight * WEIGHT_SCALE as f64) as i64;
        let mut weight_expr = Expression::from(0.0);
        let mut any = false;
        for item_id in admissible.keys() {
            let Some(item) = lookup.get(item_id) else {
                continue;
            };
            let grams = (item.attached_weight() * WEIGHT_SCALE as f64) as i64;
            if grams > 0 {
                weight_expr += grams as f64 * x[item_id];
                any = true;
            }
        }
        if any {
            let allowance = (max_grams - base_grams) as f64;
            constraints.push(constraint!(weight_expr <= allowance));
        }
    }

    // Weighted objective: capped ergonomics up, recoil and spend down.
    let mut objective = Expression::from(0.0);
    objective +=
        c.ergo_weight * (OBJECTIVE_SCALE / ERGO_SCALE) as f64 * capped_ergo;
    objective += -c.recoil_weight * OBJECTIVE_SCALE as f64 * recoil_milli;
    if c.price_weight > 0.0 {
        objective += -c.price_weight * price_expr;
    }

    let mut model = vars.maximise(objective).using(microlp);
    for con in constraints {
        model = model.with(con);
    }

    let solution = match model.solve() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(weapon = weapon_id, error = ?e, "solver returned no solution");
            return Ok(OptimizeResult::infeasible(
                "No valid configuration found".to_string(),
            ));
        }
    };

    // Decode the assignment.
    let selected: Vec<String> = x
        .iter()
        .filter(|(_, v)| solution.value(**v) > 0.5)
        .map(|(id, _)| id.clone())
        .collect();
    let chosen_base = base_vars
        .iter()
        .find(|(_, v)| solution.value(*v) > 0.5)
        .map(|(b, _)| b.clone());

    let mut selected_preset = None;
    let mut base_price: u64 = 0;
    match &chosen_base {
        Some(BaseId::Preset(preset_id)) => {
            base_price = preset_prices.get(preset_id).copied().unwrap_or(0);
            let info = weapon.presets().iter().find(|p| p.id == *preset_id);
            selected_preset = Some(match info {
                Some(preset) => PresetDetail {
                    id: preset_id.clone(),
                    name: preset.name.clone(),
                    price: base_price,
                    items: preset_items
                        .get(preset_id)
                        .map(|s| s.iter().cloned().collect())
                        .unwrap_or_default(),
                    icon: preset.image.clone(),
                    source: preset_source(preset),
                },
                None => PresetDetail {
                    id: preset_id.clone(),
                    name: "Unknown Preset".to_string(),
                    price: base_price,
                    items: Vec::new(),
                    icon: None,
                    source: None,
                },
            });
        }
        Some(BaseId::Naked) | None => {
            if !matches!(fallback_base, Some(FallbackBase::Naked { .. })) && naked_purchasable {
                base_price = wstats.price;
            }
        }
    }

    // Recompute final stats independently of the solver's scaled
    // intermediates; preset-included items cost nothing (buy = 0).
    let mut total_ergo = wstats.naked_ergonomics as f64;
    let mut total_recoil_mod = 0.0;
    let mut total_weight = wstats.weight;
    let mut items_price: u64 = 0;
    let mut recoil_milli_sum: i64 = 0;
    let mut details = Vec::with_capacity(selected.len());
    for item_id in &selected {
        let Some(item) = lookup.get(item_id) else {
            continue;
        };
        let pricing = &admissible[item_id];
        total_ergo += item.ergonomics_modifier();
        total_recoil_mod += item.recoil_modifier();
        total_weight += item.attached_weight();
        recoil_milli_sum += recoil_milli_of.get(item_id).copied().unwrap_or(0);
        if solution.value(buy[item_id]) > 0.5 {
            items_price += pricing.price;
        }
        details.push(ItemDetail {
            id: item_id.clone(),
            name: item.name.clone(),
            price: pricing.price,
            icon: item.icon.clone(),
            source: pricing.source.clone(),
            ergonomics: item.ergonomics_modifier(),
            recoil_modifier: item.recoil_modifier(),
        });
    }

    let recoil_multiplier = 1.0 + total_recoil_mod;
    let final_stats = FinalStats {
        ergonomics: total_ergo,
        recoil_vertical: wstats.naked_recoil_v as f64 * recoil_multiplier,
        recoil_horizontal: wstats.naked_recoil_h as f64 * recoil_multiplier,
        recoil_multiplier,
        total_price: base_price + items_price,
        total_weight,
    };

    let mut objective_value = c.ergo_weight * (OBJECTIVE_SCALE / ERGO_SCALE) as f64
        * solution.value(capped_ergo)
        - c.recoil_weight * OBJECTIVE_SCALE as f64 * recoil_milli_sum as f64;
    if c.price_weight > 0.0 {
        let model_base_price = match &chosen_base {
            Some(BaseId::Preset(pid)) => preset_prices.get(pid).copied().unwrap_or(0),
            _ => model_naked_price,
        };
        objective_value -= c.price_weight * (model_base_price + items_price) as f64;
    }

    Ok(OptimizeResult {
        status: OptimizeStatus::Optimal,
        selected_items: details,
        selected_preset,
        fallback_base,
        objective_value,
        reason: None,
        final_stats: Some(final_stats),
    })
}

/// Hierarchical feasibility pre-check; returns human-readable reasons for
/// every detected impossibility.
fn check_feasibility(
    wstats: &WeaponStats,
    lookup: &ItemLookup,
    compat: &CompatibilityMap,
    c: &Constraints,
) -> Vec<String> {
    let mut reasons = Vec::new();

    for required_id in &c.include_items {
        if !compat.reachable.contains(required_id) {
            reasons.push(format!(
                "Required item '{}' is not compatible with this weapon",
                item_name(lookup, required_id)
            ));
        }
    }

    // Two mandatory items that conflict can never coexist.
    for (i, a) in c.include_items.iter().enumerate() {
        for b in &c.include_items[i + 1..] {
            let conflicting = lookup
                .get(a)
                .is_some_and(|item| item.conflicts().iter().any(|id| id == b))
                || lookup
                    .get(b)
                    .is_some_and(|item| item.conflicts().iter().any(|id| id == a));
            if conflicting {
                reasons.push(format!(
                    "Required items '{}' and '{}' conflict with each other",
                    item_name(lookup, a),
                    item_name(lookup, b)
                ));
            }
        }
    }

    for group in &c.include_categories {
        if group.is_empty() {
            continue;
        }
        let found = compat.reachable.iter().any(|id| {
            lookup.get(id).is_some_and(|item| {
                group
                    .iter()
                    .any(|g| g == item.category_id() || g == item.category())
            })
        });
        if !found {
            reasons.push(format!(
                "No items found for required category group: {group:?}"
            ));
        }
    }

    if let Some(min_cap) = c.min_mag_capacity {
        let found = compat
            .reachable
            .iter()
            .any(|id| lookup.get(id).is_some_and(|item| item.magazine_capacity() >= min_cap));
        if !found {
            reasons.push(format!(
                "No magazine with capacity >= {min_cap} rounds available"
            ));
        }
    }

    if let Some(min_range) = c.min_sighting_range {
        if wstats.sighting_range < min_range {
            let found = compat
                .reachable
                .iter()
                .any(|id| lookup.get(id).is_some_and(|item| item.sighting_range() >= min_range));
            if !found {
                reasons.push(format!(
                    "No sight with sighting range >= {min_range}m available"
                ));
            }
        }
    }

    if let Some(max_weight) = c.max_weight {
        // Lightest positive mod weight; zero when nothing reachable weighs
        // anything.
        let lightest = compat
            .reachable
            .iter()
            .filter_map(|id| lookup.get(id).map(Item::attached_weight))
            .filter(|w| *w > 0.0)
            .fold(f64::INFINITY, f64::min);
        let lightest = if lightest.is_finite() { lightest } else { 0.0 };
        let total_min = wstats.weight + lightest;
        if total_min > max_weight {
            reasons.push(format!(
                "Weight exceeds limit even with lightest mods ({total_min:.2}kg > {max_weight}kg)"
            ));
        }
    }

    reasons
}

fn expr_sum(vars: &[Variable]) -> Expression {
    let mut sum = Expression::from(0.0);
    for v in vars {
        sum += *v;
    }
    sum
}

fn slot_terms(
    slot_items: &BTreeMap<String, Vec<String>>,
    slot_id: &str,
    contribution: &impl Fn(&str, &str) -> Option<Variable>,
) -> Vec<Variable> {
    slot_items
        .get(slot_id)
        .map(|ids| {
            ids.iter()
                .filter_map(|item_id| contribution(item_id, slot_id))
                .collect()
        })
        .unwrap_or_default()
}

fn item_name<'a>(lookup: &'a ItemLookup, id: &'a str) -> &'a str {
    lookup.get(id).map(|item| item.name.as_str()).unwrap_or(id)
}

/// Human-readable purchase source of a preset.
fn preset_source(preset: &crate::catalog::Preset) -> Option<String> {
    if preset.price_source == FLEA_MARKET {
        return Some("Flea Market".to_string());
    }
    if let Some(offer) = preset.offers.first() {
        if !offer.vendor_name.is_empty() {
            return Some(offer.vendor_name.clone());
        }
    }
    if preset.price_source.is_empty() || preset.price_source == "not_available" {
        None
    } else {
        Some(preset.price_source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_compatibility_map;
    use crate::testutil::{
        lookup_from, magazine, mod_item, preset, sight, slot, weapon, weapon_unpurchasable,
    };

    fn solve(
        lookup: &ItemLookup,
        weapon_id: &str,
        constraints: &Constraints,
    ) -> OptimizeResult {
        let compat = build_compatibility_map(weapon_id, lookup).unwrap();
        optimize(weapon_id, lookup, &compat, constraints).unwrap()
    }

    #[test]
    fn test_unknown_weapon_is_an_error() {
        let lookup = lookup_from(vec![]);
        let compat = crate::CompatibilityMap::default();
        assert!(matches!(
            optimize("nope", &lookup, &compat, &Constraints::default()),
            Err(Error::WeaponNotFound(_))
        ));
    }

    #[test]
    fn test_naked_weapon_no_constraints() {
        // Scenario: a bare weapon with no slots solves to itself.
        let lookup = lookup_from(vec![weapon("w", 50, 100, 50, 10_000)]);
        let result = solve(&lookup, "w", &Constraints::default());

        assert_eq!(result.status, OptimizeStatus::Optimal);
        assert!(result.selected_items.is_empty());
        assert!(result.selected_preset.is_none());
        assert!(result.fallback_base.is_none());
        let stats = result.final_stats.unwrap();
        assert_eq!(stats.ergonomics, 50.0);
        assert_eq!(stats.recoil_vertical, 100.0);
        assert_eq!(stats.total_price, 10_000);
    }

    #[test]
    fn test_required_slot_picks_dominating_item() {
        // M1 beats M2 on both ergonomics-per-recoil axes under (1, 1, 0).
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", true, &["m1", "m2"]));
        let lookup = lookup_from(vec![
            w,
            mod_item("m1", 5.0, -0.10, 2000),
            mod_item("m2", 10.0, 0.05, 3000),
        ]);
        let result = solve(&lookup, "w", &Constraints::default());

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["m1"]);
        let stats = result.final_stats.unwrap();
        assert_eq!(stats.ergonomics, 55.0);
        assert!((stats.recoil_vertical - 90.0).abs() < 1e-9);
        assert_eq!(stats.total_price, 12_000);
    }

    #[test]
    fn test_conflicting_includes_are_infeasible_with_reason() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["m1"]));
        w.slots.push(slot("s2", false, &["m2"]));
        let mut m1 = mod_item("m1", 5.0, -0.05, 1000);
        if let crate::catalog::ItemKind::Mod { conflicts, .. } = &mut m1.kind {
            conflicts.push("m2".to_string());
        }
        let lookup = lookup_from(vec![w, m1, mod_item("m2", 5.0, -0.05, 1000)]);

        let constraints = Constraints {
            include_items: vec!["m1".to_string(), "m2".to_string()],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);

        assert_eq!(result.status, OptimizeStatus::Infeasible);
        assert!(result.reason.unwrap().contains("conflict"));
    }

    #[test]
    fn test_conflict_pair_never_selected_together() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["m1"]));
        w.slots.push(slot("s2", false, &["m2"]));
        let mut m1 = mod_item("m1", 8.0, -0.05, 1000);
        if let crate::catalog::ItemKind::Mod { conflicts, .. } = &mut m1.kind {
            conflicts.push("m2".to_string());
        }
        let lookup = lookup_from(vec![w, m1, mod_item("m2", 5.0, -0.04, 900)]);
        let result = solve(&lookup, "w", &Constraints::default());

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        // Both are beneficial but conflicting; only the better one survives.
        assert_eq!(ids, ["m1"]);
    }

    #[test]
    fn test_preset_covers_contained_item_price() {
        // Scenario: naked receiver is unpurchasable, a preset bundles m1.
        let mut w = weapon_unpurchasable("w", 50, 100, 50);
        w.slots.push(slot("s1", false, &["m1"]));
        if let crate::catalog::ItemKind::Weapon { presets, .. } = &mut w.kind {
            presets.push(preset("p1", &["m1"], 5000));
        }
        let lookup = lookup_from(vec![w, mod_item("m1", 5.0, -0.05, 2000)]);

        let constraints = Constraints {
            price_weight: 1.0,
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let chosen = result.selected_preset.expect("preset base expected");
        assert_eq!(chosen.id, "p1");
        assert_eq!(chosen.price, 5000);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["m1"]);
        // Preset price charged once; the bundled item is free.
        assert_eq!(result.final_stats.unwrap().total_price, 5000);
    }

    #[test]
    fn test_fallback_base_when_nothing_purchasable() {
        let mut w = weapon_unpurchasable("w", 50, 100, 50);
        w.slots.push(slot("s1", false, &["m1"]));
        if let crate::catalog::ItemKind::Weapon { presets, .. } = &mut w.kind {
            let mut p = preset("p1", &["m1"], 0);
            p.purchasable = false;
            p.price_source = "not_available".to_string();
            presets.push(p);
        }
        let lookup = lookup_from(vec![w, mod_item("m1", 5.0, -0.05, 2000)]);
        let result = solve(&lookup, "w", &Constraints::default());

        assert_eq!(result.status, OptimizeStatus::Optimal);
        assert!(matches!(
            result.fallback_base,
            Some(FallbackBase::Preset { ref id, price: 0, .. }) if id == "p1"
        ));
        // The fallback base costs nothing.
        let chosen = result.selected_preset.unwrap();
        assert_eq!(chosen.price, 0);
    }

    #[test]
    fn test_magazine_capacity_gate() {
        // Scenario: only one reachable magazine holds 30 rounds.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_mag", false, &["mag10", "mag30"]));
        let lookup = lookup_from(vec![
            w,
            magazine("mag10", 10, 500),
            magazine("mag30", 30, 3000),
        ]);

        let constraints = Constraints {
            min_mag_capacity: Some(30),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert!(ids.contains(&"mag30"));
    }

    #[test]
    fn test_unreachable_magazine_capacity_is_infeasible() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_mag", false, &["mag10"]));
        let lookup = lookup_from(vec![w, magazine("mag10", 10, 500)]);

        let constraints = Constraints {
            min_mag_capacity: Some(60),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Infeasible);
        assert!(result.reason.unwrap().contains("capacity >= 60"));
    }

    #[test]
    fn test_sighting_range_gate_only_when_base_insufficient() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_scope", false, &["scope"]));
        let lookup = lookup_from(vec![w, sight("scope", 600, -2.0, 20_000)]);

        // Base range 100 (testutil default) is below 400: the sight becomes
        // mandatory even though it hurts ergonomics.
        let constraints = Constraints {
            min_sighting_range: Some(400),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Optimal);
        assert_eq!(result.selected_items.len(), 1);
        assert_eq!(result.selected_items[0].id, "scope");

        // A requirement the base already meets adds nothing.
        let constraints = Constraints {
            min_sighting_range: Some(50),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert!(result.selected_items.is_empty());
    }

    #[test]
    fn test_budget_excludes_expensive_upgrade() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["cheap", "pricey"]));
        let lookup = lookup_from(vec![
            w,
            mod_item("cheap", 3.0, 0.0, 1000),
            mod_item("pricey", 12.0, 0.0, 50_000),
        ]);

        let constraints = Constraints {
            max_price: Some(12_000),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["cheap"]);
        assert!(result.final_stats.unwrap().total_price <= 12_000);
    }

    #[test]
    fn test_min_ergonomics_and_max_recoil_bounds_respected() {
        let mut w = weapon("w", 40, 120, 60, 10_000);
        w.slots.push(slot("s1", false, &["grip"]));
        w.slots.push(slot("s2", false, &["brake"]));
        let lookup = lookup_from(vec![
            w,
            mod_item("grip", 12.0, 0.02, 4000),
            mod_item("brake", -2.0, -0.12, 6000),
        ]);

        let constraints = Constraints {
            min_ergonomics: Some(50),
            max_recoil_v: Some(110.0),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);

        assert_eq!(result.status, OptimizeStatus::Optimal);
        let stats = result.final_stats.unwrap();
        assert!(stats.ergonomics >= 50.0);
        assert!(stats.recoil_vertical <= 110.0 + 1e-9);
    }

    #[test]
    fn test_exclude_items_and_categories() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["m1", "m2"]));
        let mut m2 = mod_item("m2", 9.0, -0.08, 1500);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut m2.kind {
            stats.category = "Silencer".to_string();
            stats.category_id = "cat-sil".to_string();
        }
        let lookup = lookup_from(vec![w, mod_item("m1", 5.0, -0.05, 1000), m2]);

        let constraints = Constraints {
            exclude_categories: vec!["Silencer".to_string()],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["m1"]);

        let constraints = Constraints {
            exclude_items: vec!["m1".to_string(), "m2".to_string()],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert!(result.selected_items.is_empty());
    }

    #[test]
    fn test_include_category_group_forces_selection() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["tac"]));
        let mut tac = mod_item("tac", -1.0, 0.0, 2500);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut tac.kind {
            stats.category = "Tactical combo device".to_string();
            stats.category_id = "cat-tac".to_string();
        }
        let lookup = lookup_from(vec![w, tac]);

        // Matched by category id; the item costs ergonomics, so only the
        // group constraint can be selecting it.
        let constraints = Constraints {
            include_categories: vec![vec!["cat-tac".to_string()]],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Optimal);
        assert_eq!(result.selected_items[0].id, "tac");

        let constraints = Constraints {
            include_categories: vec![vec!["No such category".to_string()]],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Infeasible);
        assert!(result.reason.unwrap().contains("category group"));
    }

    #[test]
    fn test_nested_mod_requires_parent() {
        // tape attaches only under grip; selecting tape alone is illegal.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_grip", false, &["grip"]));
        let mut grip = mod_item("grip", -3.0, 0.0, 1000);
        grip.slots.push(slot("s_tape", false, &["tape"]));
        let tape = mod_item("tape", 2.0, 0.0, 100);
        let lookup = lookup_from(vec![w, grip, tape]);

        let result = solve(&lookup, "w", &Constraints::default());
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        // grip costs 3 ergo, tape restores 2: the pair is a net loss, and
        // tape without grip must be impossible.
        assert!(ids.is_empty());

        let constraints = Constraints {
            include_items: vec!["tape".to_string()],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["grip", "tape"]);
    }

    #[test]
    fn test_required_slot_of_selected_owner_is_filled() {
        // mount has a required ring slot; picking mount forces a ring.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s_mount", false, &["mount"]));
        let mut mount = mod_item("mount", 6.0, 0.0, 1500);
        mount.slots.push(slot("s_ring", true, &["ring"]));
        let ring = mod_item("ring", -1.0, 0.0, 800);
        let lookup = lookup_from(vec![w, mount, ring]);

        let result = solve(&lookup, "w", &Constraints::default());
        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        // Net +5 ergo: worth it, but only with the ring along.
        assert_eq!(ids, ["mount", "ring"]);
    }

    #[test]
    fn test_weight_limit_constrains_selection() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["light", "heavy"]));
        let mut light = mod_item("light", 2.0, 0.0, 1000);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut light.kind {
            stats.weight = 0.3;
        }
        let mut heavy = mod_item("heavy", 10.0, -0.05, 2000);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut heavy.kind {
            stats.weight = 1.5;
        }
        let lookup = lookup_from(vec![w, light, heavy]);

        // Weapon weighs 3.0 kg (testutil default); the better mod tips the
        // build over the limit, the lighter one fits.
        let constraints = Constraints {
            max_weight: Some(4.0),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Optimal);
        let ids: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["light"]);
        assert!(result.final_stats.unwrap().total_weight <= 4.0);
    }

    #[test]
    fn test_weight_precheck_uses_lightest_positive_mod() {
        // Weapon 3.0 kg + lightest positive mod 0.2 kg > 3.1 kg limit, even
        // though a weightless mod is also reachable.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", false, &["light", "zero"]));
        let mut light = mod_item("light", 1.0, 0.0, 100);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut light.kind {
            stats.weight = 0.2;
        }
        let mut zero = mod_item("zero", 1.0, 0.0, 100);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut zero.kind {
            stats.weight = 0.0;
        }
        let lookup = lookup_from(vec![w, light, zero]);

        let constraints = Constraints {
            max_weight: Some(3.1),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Infeasible);
        assert!(result.reason.unwrap().contains("Weight exceeds limit"));
    }

    #[test]
    fn test_include_item_not_reachable_reported_in_precheck() {
        let lookup = lookup_from(vec![weapon("w", 50, 100, 50, 10_000)]);
        let constraints = Constraints {
            include_items: vec!["ghost".to_string()],
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.status, OptimizeStatus::Infeasible);
        assert!(result
            .reason
            .unwrap()
            .contains("not compatible with this weapon"));
    }

    #[test]
    fn test_trader_levels_shift_resolved_prices() {
        // skier sells cheaper but requires loyalty 3.
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", true, &["m1"]));
        let mut m1 = mod_item("m1", 5.0, 0.0, 1000);
        if let crate::catalog::ItemKind::Mod { stats, .. } = &mut m1.kind {
            stats.offers.push(crate::catalog::Offer {
                price: 700,
                source: "skier".to_string(),
                vendor_name: "Skier".to_string(),
                vendor_normalized: "skier".to_string(),
                trader_level: Some(3),
            });
            stats.offers.sort_by_key(|o| o.price);
            stats.price = stats.offers[0].price;
        }
        let lookup = lookup_from(vec![w, m1]);

        let constraints = Constraints {
            trader_levels: Some(crate::TraderLevels {
                skier: 1,
                ..crate::TraderLevels::default()
            }),
            ..Constraints::default()
        };
        let result = solve(&lookup, "w", &constraints);
        assert_eq!(result.selected_items[0].price, 1000);

        let result = solve(&lookup, "w", &Constraints::default());
        assert_eq!(result.selected_items[0].price, 700);
    }

    #[test]
    fn test_idempotent_across_runs() {
        let mut w = weapon("w", 50, 100, 50, 10_000);
        w.slots.push(slot("s1", true, &["m1", "m2"]));
        w.slots.push(slot("s2", false, &["m3"]));
        let lookup = lookup_from(vec![
            w,
            mod_item("m1", 5.0, -0.10, 2000),
            mod_item("m2", 10.0, 0.05, 3000),
            mod_item("m3", 3.0, -0.02, 1200),
        ]);

        let first = solve(&lookup, "w", &Constraints::default());
        let second = solve(&lookup, "w", &Constraints::default());
        assert_eq!(first.status, second.status);
        let a = first.final_stats.unwrap();
        let b = second.final_stats.unwrap();
        assert_eq!(a.ergonomics, b.ergonomics);
        assert_eq!(a.recoil_vertical, b.recoil_vertical);
        assert_eq!(a.total_price, b.total_price);
    }

    #[test]
    fn test_selected_items_are_tree_reachable_and_stats_round_trip() {
        let mut w = weapon("w", 45, 140, 70, 20_000);
        w.slots.push(slot("s_grip", false, &["grip"]));
        w.slots.push(slot("s_muzzle", false, &["brake"]));
        let mut grip = mod_item("grip", 7.0, -0.02, 2500);
        grip.slots.push(slot("s_tape", false, &["tape"]));
        let lookup = lookup_from(vec![
            w,
            grip,
            mod_item("tape", 1.0, 0.0, 300),
            mod_item("brake", -1.0, -0.15, 9000),
        ]);
        let compat = build_compatibility_map("w", &lookup).unwrap();
        let result = optimize("w", &lookup, &compat, &Constraints::default()).unwrap();
        assert_eq!(result.status, OptimizeStatus::Optimal);

        let selected: Vec<&str> = result.selected_items.iter().map(|d| d.id.as_str()).collect();
        // Tree reachability: each selected item sits in some slot whose
        // owner is the weapon or another selected item.
        for detail in &result.selected_items {
            let placed_somewhere = compat.slot_items.iter().any(|(slot_id, items)| {
                items.contains(&detail.id)
                    && compat
                        .slot_owner
                        .get(slot_id)
                        .is_some_and(|owner| owner == "w" || selected.contains(&owner.as_str()))
            });
            assert!(placed_somewhere, "{} is floating", detail.id);
        }

        // Round-trip: response stats equal stats recomputed from the items.
        let stats = result.final_stats.unwrap();
        let ergo: f64 = 45.0
            + result
                .selected_items
                .iter()
                .map(|d| d.ergonomics)
                .sum::<f64>();
        let recoil_mult: f64 = 1.0
            + result
                .selected_items
                .iter()
                .map(|d| d.recoil_modifier)
                .sum::<f64>();
        assert_eq!(stats.ergonomics, ergo);
        assert!((stats.recoil_vertical - 140.0 * recoil_mult).abs() < 1e-9);
    }
}
