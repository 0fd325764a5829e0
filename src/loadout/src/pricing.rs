//! Pricing resolution.
//!
//! Given an item's purchase offers, the character's trader loyalty levels,
//! flea-market availability and player level, finds the cheapest offer the
//! character can actually buy.

use serde::{Deserialize, Serialize};

use crate::catalog::PriceInfo;

/// Offer source key of the flea market.
pub const FLEA_MARKET: &str = "fleaMarket";

/// Loyalty level (1..4) per trader. Unknown traders resolve to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderLevels {
    pub prapor: u8,
    pub skier: u8,
    pub peacekeeper: u8,
    pub mechanic: u8,
    pub jaeger: u8,
}

impl Default for TraderLevels {
    fn default() -> Self {
        Self {
            prapor: 4,
            skier: 4,
            peacekeeper: 4,
            mechanic: 4,
            jaeger: 4,
        }
    }
}

impl TraderLevels {
    /// Level for a normalized (lower-case) vendor key.
    pub fn level_for(&self, vendor: &str) -> u8 {
        match vendor {
            "prapor" => self.prapor,
            "skier" => self.skier,
            "peacekeeper" => self.peacekeeper,
            "mechanic" => self.mechanic,
            "jaeger" => self.jaeger,
            _ => 4,
        }
    }
}

/// Cheapest price the character can actually pay, and its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub price: u64,
    pub source: String,
}

/// Resolve the cheapest available price for an item or preset.
///
/// Offers are filtered by access: flea offers require flea availability and
/// a sufficient player level, trader offers require the loyalty level of the
/// vendor. An item with no offers but a positive fallback price is treated
/// as flea-only. `None` means the item cannot be bought at all under the
/// given access constraints.
pub fn cheapest_price(
    info: &PriceInfo<'_>,
    trader_levels: &TraderLevels,
    flea_available: bool,
    player_level: Option<i64>,
) -> Option<ResolvedPrice> {
    let level_blocks_flea =
        |min_level: i64| player_level.is_some_and(|level| min_level > level);

    if info.offers.is_empty() {
        if info.price > 0 && flea_available && !level_blocks_flea(info.min_level_flea) {
            return Some(ResolvedPrice {
                price: info.price,
                source: info.price_source.to_string(),
            });
        }
        return None;
    }

    let mut best: Option<&crate::catalog::Offer> = None;
    for offer in info.offers {
        if offer.source == FLEA_MARKET {
            if !flea_available || level_blocks_flea(info.min_level_flea) {
                continue;
            }
        } else {
            let have = trader_levels.level_for(&offer.vendor_normalized.to_lowercase());
            if offer.trader_level.is_some_and(|required| required > i64::from(have)) {
                continue;
            }
        }
        if best.is_none_or(|b| offer.price < b.price) {
            best = Some(offer);
        }
    }

    best.map(|offer| ResolvedPrice {
        price: offer.price,
        source: offer.source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Offer;

    fn trader_offer(price: u64, vendor: &str, level: i64) -> Offer {
        Offer {
            price,
            source: vendor.to_string(),
            vendor_name: vendor.to_string(),
            vendor_normalized: vendor.to_string(),
            trader_level: Some(level),
        }
    }

    fn flea_offer(price: u64) -> Offer {
        Offer {
            price,
            source: FLEA_MARKET.to_string(),
            vendor_name: "Flea Market".to_string(),
            vendor_normalized: String::new(),
            trader_level: None,
        }
    }

    fn info<'a>(offers: &'a [Offer], price: u64, min_level_flea: i64) -> PriceInfo<'a> {
        PriceInfo {
            offers,
            price,
            price_source: "market",
            min_level_flea,
        }
    }

    #[test]
    fn test_cheapest_available_offer_wins() {
        let offers = vec![trader_offer(1000, "prapor", 1), trader_offer(800, "skier", 3)];
        let resolved =
            cheapest_price(&info(&offers, 0, 0), &TraderLevels::default(), true, None).unwrap();
        assert_eq!(resolved.price, 800);
        assert_eq!(resolved.source, "skier");
    }

    #[test]
    fn test_trader_level_gates_offer() {
        let offers = vec![trader_offer(1000, "prapor", 1), trader_offer(800, "skier", 3)];
        let levels = TraderLevels {
            skier: 2,
            ..TraderLevels::default()
        };
        let resolved = cheapest_price(&info(&offers, 0, 0), &levels, true, None).unwrap();
        assert_eq!(resolved.price, 1000);
        assert_eq!(resolved.source, "prapor");
    }

    #[test]
    fn test_flea_unavailable_skips_flea_offers() {
        let offers = vec![flea_offer(500), trader_offer(1200, "mechanic", 2)];
        let resolved =
            cheapest_price(&info(&offers, 0, 0), &TraderLevels::default(), false, None).unwrap();
        assert_eq!(resolved.price, 1200);
    }

    #[test]
    fn test_player_level_gates_flea() {
        let offers = vec![flea_offer(500)];
        assert!(cheapest_price(
            &info(&offers, 0, 20),
            &TraderLevels::default(),
            true,
            Some(10),
        )
        .is_none());
        assert!(cheapest_price(
            &info(&offers, 0, 20),
            &TraderLevels::default(),
            true,
            Some(25),
        )
        .is_some());
    }

    #[test]
    fn test_fallback_price_is_flea_only() {
        let resolved =
            cheapest_price(&info(&[], 3000, 0), &TraderLevels::default(), true, None).unwrap();
        assert_eq!(resolved.price, 3000);

        assert!(cheapest_price(&info(&[], 3000, 0), &TraderLevels::default(), false, None).is_none());
        assert!(cheapest_price(
            &info(&[], 3000, 30),
            &TraderLevels::default(),
            true,
            Some(10),
        )
        .is_none());
        assert!(cheapest_price(&info(&[], 0, 0), &TraderLevels::default(), true, None).is_none());
    }

    #[test]
    fn test_all_offers_gated_is_unreachable() {
        let offers = vec![trader_offer(900, "jaeger", 4)];
        let levels = TraderLevels {
            jaeger: 1,
            ..TraderLevels::default()
        };
        assert!(cheapest_price(&info(&offers, 0, 0), &levels, true, None).is_none());
    }
}
