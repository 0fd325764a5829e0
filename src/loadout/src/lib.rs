//! # loadout
//!
//! Weapon modification optimizer library.
//!
//! This library provides functionality to:
//! - Normalize a raw inventory catalog into an [`ItemLookup`]
//! - Derive the compatibility graph reachable from a base weapon
//! - Resolve item prices under trader/flea-market access constraints
//! - Solve loadout selection as an integer program maximizing a weighted
//!   ergonomics/recoil/price objective
//! - Trace a Pareto frontier along a chosen objective axis
//!
//! ## Example
//!
//! ```no_run
//! use loadout::{build_compatibility_map, build_item_lookup, optimize, Constraints};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let weapons: Vec<loadout::catalog::RawItem> =
//!     serde_json::from_str(&std::fs::read_to_string("weapons.json")?)?;
//! let mods: Vec<loadout::catalog::RawItem> =
//!     serde_json::from_str(&std::fs::read_to_string("mods.json")?)?;
//!
//! let lookup = build_item_lookup(&weapons, &mods);
//! let compat = build_compatibility_map("5644bd2b4bdc2d3b4c8b4572", &lookup)?;
//!
//! let result = optimize(
//!     "5644bd2b4bdc2d3b4c8b4572",
//!     &lookup,
//!     &compat,
//!     &Constraints::default(),
//! )?;
//! println!("status: {:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod compat;
pub mod optimize;
pub mod pareto;
pub mod pricing;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used items
#[doc(inline)]
pub use catalog::{
    build_item_lookup, Item, ItemKind, ItemLookup, Offer, Preset, SlotDescriptor,
};
#[doc(inline)]
pub use compat::{build_compatibility_map, CompatibilityMap};
#[doc(inline)]
pub use optimize::{
    optimize, optimize_with, Constraints, FallbackBase, FinalStats, ItemDetail, OptimizeResult,
    OptimizeStatus, PresetDetail, SolverConfig,
};
#[doc(inline)]
pub use pareto::{explore, FrontierPoint, ParetoAxis};
#[doc(inline)]
pub use pricing::{cheapest_price, ResolvedPrice, TraderLevels};

/// Errors that can occur in the optimizer core.
///
/// Infeasibility is not an error: it is reported as a first-class
/// [`OptimizeResult`] with `status = infeasible`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested base weapon is not part of the item lookup.
    #[error("weapon {0} not found in item lookup")]
    WeaponNotFound(String),
}
