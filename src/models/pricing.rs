use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl PriceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Small => "small",
            PriceTier::Medium => "medium",
            PriceTier::Large => "large",
            PriceTier::ExtraLarge => "extra_large",
        }
    }

    /// (price, compare-at price) as the storefront displays them.
    pub fn prices(&self) -> (&'static str, &'static str) {
        match self {
            PriceTier::Small => ("29.99", "39.99"),
            PriceTier::Medium => ("49.99", "64.99"),
            PriceTier::Large => ("79.99", "99.99"),
            PriceTier::ExtraLarge => ("119.99", "149.99"),
        }
    }

    pub fn from_area(area_cm2: f64) -> Self {
        if area_cm2 <= 600.0 {
            PriceTier::Small
        } else if area_cm2 <= 1800.0 {
            PriceTier::Medium
        } else if area_cm2 <= 4000.0 {
            PriceTier::Large
        } else {
            PriceTier::ExtraLarge
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TierPrice {
    pub tier: PriceTier,
    pub price: String,
    pub compare_price: String,
}

pub fn price_tier(max_width_cm: f64, max_height_cm: f64) -> TierPrice {
    let tier = PriceTier::from_area(max_width_cm * max_height_cm);
    let (price, compare) = tier.prices();
    TierPrice {
        tier,
        price: price.to_string(),
        compare_price: compare.to_string(),
    }
}

/// The skeleton price map document served read-only by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceMap {
    /// Tier name to its skeleton product and prices.
    #[serde(default)]
    pub tiers: HashMap<String, serde_json::Value>,
    /// `"<size>|<frame>"` to the fulfillment provider's variant id.
    #[serde(default)]
    pub fulfillment_variants: HashMap<String, i64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl PriceMap {
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn fulfillment_variant(&self, size: &str, frame: Option<&str>) -> Option<i64> {
        let frame = frame.filter(|f| !f.is_empty()).unwrap_or("none");
        self.fulfillment_variants
            .get(&format!("{size}|{frame}"))
            .or_else(|| self.fulfillment_variants.get(size))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_at_breakpoints() {
        assert_eq!(PriceTier::from_area(600.0), PriceTier::Small);
        assert_eq!(PriceTier::from_area(600.01), PriceTier::Medium);
        assert_eq!(PriceTier::from_area(1800.0), PriceTier::Medium);
        assert_eq!(PriceTier::from_area(4000.0), PriceTier::Large);
        assert_eq!(PriceTier::from_area(4000.5), PriceTier::ExtraLarge);
    }

    #[test]
    fn tier_is_monotone_in_area() {
        let mut last = PriceTier::Small;
        let mut area = 0.0;
        while area < 10_000.0 {
            let tier = PriceTier::from_area(area);
            assert!(tier >= last, "tier dropped at area {area}");
            last = tier;
            area += 7.5;
        }
    }

    #[test]
    fn large_portrait_is_extra_large() {
        let p = price_tier(112.9, 169.35);
        assert_eq!(p.tier, PriceTier::ExtraLarge);
        assert_eq!(p.price, "119.99");
        assert_eq!(p.compare_price, "149.99");
    }

    #[test]
    fn fulfillment_variant_lookup() {
        let map: PriceMap = serde_json::from_value(serde_json::json!({
            "tiers": {},
            "fulfillment_variants": {"30x40|black": 101, "30x40|none": 100, "50x70": 200},
            "currency": "EUR"
        }))
        .unwrap();
        assert_eq!(map.fulfillment_variant("30x40", Some("black")), Some(101));
        assert_eq!(map.fulfillment_variant("30x40", None), Some(100));
        assert_eq!(map.fulfillment_variant("50x70", Some("oak")), Some(200));
        assert_eq!(map.fulfillment_variant("10x10", None), None);
        assert!(map.extra.contains_key("currency"));
    }
}
