//! Pareto frontier exploration.
//!
//! Repeatedly re-runs the optimizer with pure single-axis weight vectors and
//! a moving hard target to trace the efficient frontier along a chosen axis.
//! Using a different objective for each endpoint (rather than one weighted
//! sweep) keeps coverage monotone even when the axes are strongly
//! correlated.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::catalog::ItemLookup;
use crate::compat::CompatibilityMap;
use crate::optimize::{
    optimize, Constraints, FinalStats, ItemDetail, OptimizeResult, OptimizeStatus, PresetDetail,
};
use crate::Error;

/// The axis the caller wants to sweep against (left out of the trade-off).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParetoAxis {
    Price,
    Recoil,
    Ergo,
}

/// One point on the efficient frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub ergo: i64,
    /// Recoil change in percent, negative is better.
    pub recoil_pct: f64,
    pub recoil_v: f64,
    pub recoil_h: f64,
    pub price: u64,
    pub selected_items: Vec<ItemDetail>,
    pub selected_preset: Option<PresetDetail>,
    pub status: OptimizeStatus,
}

/// Objective weight vectors as (ergo, recoil, price).
const RECOIL_WEIGHTS: (f64, f64, f64) = (0.0, 1.0, 0.0);
const ERGO_WEIGHTS: (f64, f64, f64) = (1.0, 0.0, 0.0);
const PRICE_WEIGHTS: (f64, f64, f64) = (0.0, 0.0, 1.0);

/// Sample `steps` frontier points along the driven axis.
///
/// The driven axis is ergonomics for `ignore` in {price, recoil} and
/// vertical recoil for `ignore = ergo`. Two bounding optimizations with
/// opposing single-axis objectives establish the range; interpolated targets
/// are then promoted into hard constraints. Points are deduplicated by
/// (ergo, recoil, price).
pub fn explore(
    weapon_id: &str,
    lookup: &ItemLookup,
    compat: &CompatibilityMap,
    base: &Constraints,
    ignore: ParetoAxis,
    steps: usize,
) -> Result<Vec<FrontierPoint>, Error> {
    let weapon = lookup
        .get(weapon_id)
        .ok_or_else(|| Error::WeaponNotFound(weapon_id.to_string()))?;
    let wstats = weapon
        .weapon_stats()
        .ok_or_else(|| Error::WeaponNotFound(weapon_id.to_string()))?;
    let steps = steps.max(1);

    tracing::info!(weapon = weapon_id, ?ignore, steps, "pareto exploration");

    let run = |weights: (f64, f64, f64),
               min_ergonomics: Option<i64>,
               max_recoil_v: Option<f64>|
     -> Result<OptimizeResult, Error> {
        let mut c = base.clone();
        (c.ergo_weight, c.recoil_weight, c.price_weight) = weights;
        c.min_ergonomics = min_ergonomics;
        c.max_recoil_v = max_recoil_v;
        optimize(weapon_id, lookup, compat, &c)
    };

    let mut frontier = Vec::new();

    match ignore {
        ParetoAxis::Price | ParetoAxis::Recoil => {
            // Driven axis: ergonomics. The low endpoint optimizes the axis
            // that is traded (recoil resp. price); the high endpoint pushes
            // ergonomics.
            let step_weights = match ignore {
                ParetoAxis::Price => RECOIL_WEIGHTS,
                _ => PRICE_WEIGHTS,
            };
            let low = run(step_weights, None, base.max_recoil_v)?;
            let high = run(ERGO_WEIGHTS, None, base.max_recoil_v)?;

            let Some(low_stats) = ok_stats(&low) else {
                return Ok(Vec::new());
            };
            let mut range_min = low_stats.ergonomics as i64;
            let mut range_max = match ok_stats(&high) {
                Some(stats) => stats.ergonomics as i64,
                None => 100,
            };

            if let Some(min_ergo) = base.min_ergonomics {
                range_min = range_min.max(min_ergo);
            }
            range_min = range_min.max(0);
            range_max = range_max.min(100);
            if range_max <= range_min {
                range_max = range_min + 1;
            }

            let step_size = interpolation_step(range_min as f64, range_max as f64, steps);
            for i in 0..steps {
                let target = (range_min as f64 + i as f64 * step_size) as i64;
                let result = run(step_weights, Some(target), base.max_recoil_v)?;
                push_point(&mut frontier, result);
            }
        }
        ParetoAxis::Ergo => {
            // Driven axis: vertical recoil, swept from best achievable to
            // the cheapest build's level.
            let low = run(RECOIL_WEIGHTS, base.min_ergonomics, None)?;
            let high = run(PRICE_WEIGHTS, base.min_ergonomics, None)?;

            let Some(low_stats) = ok_stats(&low) else {
                return Ok(Vec::new());
            };
            let range_min = low_stats.recoil_vertical;
            let mut range_max = match ok_stats(&high) {
                Some(stats) => stats.recoil_vertical,
                None => wstats.naked_recoil_v as f64,
            };

            if let Some(max_v) = base.max_recoil_v {
                range_max = range_max.min(max_v);
            }
            if range_max <= range_min {
                range_max = range_min + 1.0;
            }

            let step_size = interpolation_step(range_min, range_max, steps);
            for i in 0..steps {
                let target = range_min + i as f64 * step_size;
                let result = run(PRICE_WEIGHTS, base.min_ergonomics, Some(target))?;
                push_point(&mut frontier, result);
            }
        }
    }

    // Deduplicate by the (ergo, recoil_v, price) triple.
    let mut seen: BTreeSet<(i64, i64, u64)> = BTreeSet::new();
    frontier.retain(|p| seen.insert((p.ergo, (p.recoil_v * 10.0).round() as i64, p.price)));
    Ok(frontier)
}

fn ok_stats(result: &OptimizeResult) -> Option<&FinalStats> {
    if result.status == OptimizeStatus::Infeasible {
        return None;
    }
    result.final_stats.as_ref()
}

fn interpolation_step(min: f64, max: f64, steps: usize) -> f64 {
    if steps > 1 {
        (max - min) / (steps - 1) as f64
    } else {
        0.0
    }
}

fn push_point(frontier: &mut Vec<FrontierPoint>, result: OptimizeResult) {
    let Some(stats) = ok_stats(&result).cloned() else {
        return;
    };
    frontier.push(FrontierPoint {
        ergo: stats.ergonomics as i64,
        recoil_pct: round1((stats.recoil_multiplier - 1.0) * 100.0),
        recoil_v: round1(stats.recoil_vertical),
        recoil_h: round1(stats.recoil_horizontal),
        price: stats.total_price,
        selected_items: result.selected_items,
        selected_preset: result.selected_preset,
        status: result.status,
    });
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
