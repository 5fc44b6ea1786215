//! Composite and final display scores.
//!
//! The composite score blends three sub-scores on a 1 to 10 scale: the
//! dataset's traffic rating, an inverse-linear price score, and a district
//! lookup on the site's location text. The final display score blends the
//! normalized retrieval score with the composite, optionally mixed with
//! structural rule satisfaction.

use geosite_core::models::{columns, ScoreBreakdown, ScoringWeights, Site, SiteId, SiteTable};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const TRAFFIC_TERMS: &[&str] = &["交通便利", "靠近地铁", "地铁", "公交", "交通"];
const COST_TERMS: &[&str] = &["性价比", "价格", "便宜", "预算", "成本"];

/// Region weight ceiling when the request pins a district
const REGION_CAP: f64 = 0.10;

/// Share of structural satisfaction inside the POI score
const STRUCT_RATIO: f64 = 0.2;

const NEUTRAL_SCORE: f64 = 5.0;
const UNKNOWN_REGION_SCORE: f64 = 7.0;

/// Requirement-driven composite weights.
///
/// Traffic terms boost the traffic weight; cost terms then skew toward price,
/// with a different triple depending on whether traffic was boosted. A positive
/// region hard constraint caps the region weight and renormalizes.
pub fn derive_weights(positive_texts: &[&str], has_region_constraint: bool) -> ScoringWeights {
    let joined = positive_texts.join(" ");
    let mentions = |terms: &[&str]| terms.iter().any(|t| joined.contains(t));

    let mut weights = ScoringWeights::BASELINE;
    if mentions(TRAFFIC_TERMS) {
        weights = ScoringWeights::TRAFFIC_FOCUSED;
    }
    if mentions(COST_TERMS) {
        weights = if weights.traffic >= 0.5 {
            ScoringWeights::TRAFFIC_AND_COST
        } else {
            ScoringWeights::COST_FOCUSED
        };
    }
    if has_region_constraint {
        weights = weights.with_region_cap(REGION_CAP);
    }
    weights
}

/// Map a retrieval score into [1, 10] against the run's observed range.
///
/// A site without a retrieval score, or a flat range, scores the midpoint.
pub fn normalize_text_score(score: Option<f64>, min: f64, max: f64) -> f64 {
    let Some(score) = score else {
        return NEUTRAL_SCORE;
    };
    let span = max - min;
    if span <= 1e-8 {
        return NEUTRAL_SCORE;
    }
    1.0 + 9.0 * (score - min) / span
}

/// District name to region score, matched by substring in listed order
#[derive(Debug, Clone, PartialEq)]
pub struct DistrictTable {
    entries: Vec<(String, f64)>,
}

const GUANGZHOU_DISTRICTS: [(&str, f64); 11] = [
    ("天河区", 9.5),
    ("越秀区", 9.3),
    ("海珠区", 9.0),
    ("荔湾区", 8.5),
    ("黄埔区", 7.8),
    ("白云区", 7.5),
    ("番禺区", 7.2),
    ("花都区", 6.8),
    ("南沙区", 6.5),
    ("增城区", 6.2),
    ("从化区", 6.0),
];

/// Informal spellings resolved when no district name matches directly
const DISTRICT_ALIASES: [(&str, &str); 11] = [
    ("广州天河", "天河区"),
    ("广州海珠", "海珠区"),
    ("广州越秀", "越秀区"),
    ("广州黄埔", "黄埔区"),
    ("广州荔湾", "荔湾区"),
    ("广州白云", "白云区"),
    ("广州番禺", "番禺区"),
    ("广州花都", "花都区"),
    ("广州南沙", "南沙区"),
    ("广州增城", "增城区"),
    ("广州从化", "从化区"),
];

impl Default for DistrictTable {
    fn default() -> Self {
        Self {
            entries: GUANGZHOU_DISTRICTS
                .iter()
                .map(|(name, score)| (name.to_string(), *score))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, f64>> for DistrictTable {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Self { entries: map.into_iter().collect() }
    }
}

impl DistrictTable {
    /// District named in free text, direct names before aliases
    pub fn district_of<'a>(&'a self, text: &'a str) -> Option<&'a str> {
        if text.trim().is_empty() {
            return None;
        }
        self.entries
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| text.contains(name))
            .or_else(|| {
                DISTRICT_ALIASES
                    .iter()
                    .find(|(alias, _)| text.contains(alias))
                    .map(|(_, district)| *district)
            })
    }

    pub fn score(&self, text: &str) -> f64 {
        self.district_of(text)
            .and_then(|district| self.entries.iter().find(|(name, _)| name == district))
            .map(|(_, score)| *score)
            .unwrap_or(UNKNOWN_REGION_SCORE)
    }
}

/// The three sub-scores of one site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub traffic: f64,
    pub price: f64,
    pub region: f64,
}

impl SubScores {
    /// Weighted composite clamped to [1, 10]
    pub fn composite(&self, weights: ScoringWeights) -> f64 {
        let score = weights.traffic * self.traffic + weights.price * self.price + weights.region * self.region;
        score.clamp(1.0, 10.0)
    }
}

/// Inputs of the final display score for one site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalScoreInputs {
    /// Retrieval score already normalized into [1, 10]
    pub vector_normalized: f64,

    /// Structural satisfaction in [0, 1], when structural scoring ran
    pub satisfaction: Option<f64>,

    pub weights: ScoringWeights,

    /// Weight of the retrieval score against the POI score
    pub vector_weight: f64,
}

/// Per-site scoring over a site table
pub struct ScoringEngine {
    table: Arc<SiteTable>,
    districts: DistrictTable,
    price_min: f64,
    price_max: f64,
}

impl ScoringEngine {
    pub fn new(table: Arc<SiteTable>, districts: DistrictTable) -> Self {
        let (price_min, mut price_max) = table.numeric_range(columns::PRICE_PER_M2).unwrap_or((0.0, 1.0));
        if (price_max - price_min).abs() < 1e-8 {
            price_max = price_min + 1.0;
        }
        Self { table, districts, price_min, price_max }
    }

    pub fn districts(&self) -> &DistrictTable {
        &self.districts
    }

    /// Traffic rating clamped to [0, 10]; missing ratings are neutral
    pub fn traffic_score(&self, site: &Site) -> f64 {
        site.traffic_score().unwrap_or(NEUTRAL_SCORE).clamp(0.0, 10.0)
    }

    /// Cheaper sites score higher, mapped onto [1, 10]
    pub fn price_score(&self, site: &Site) -> f64 {
        let Some(price) = site.price_per_m2() else {
            return NEUTRAL_SCORE;
        };
        let inverse = (self.price_max - price) / (self.price_max - self.price_min);
        (1.0 + 9.0 * inverse).clamp(1.0, 10.0)
    }

    pub fn region_score(&self, site: &Site) -> f64 {
        self.districts.score(&site.location_text())
    }

    pub fn sub_scores(&self, site: &Site) -> SubScores {
        SubScores {
            traffic: self.traffic_score(site),
            price: self.price_score(site),
            region: self.region_score(site),
        }
    }

    /// Composite score in [1, 10]; unknown sites score the midpoint
    pub fn composite(&self, site_id: SiteId, weights: ScoringWeights) -> f64 {
        self.table
            .get(site_id)
            .map(|site| self.sub_scores(site).composite(weights))
            .unwrap_or(NEUTRAL_SCORE)
    }

    /// Full score breakdown and final display score for one site
    pub fn breakdown(&self, site_id: SiteId, inputs: FinalScoreInputs) -> ScoreBreakdown {
        let sub = self
            .table
            .get(site_id)
            .map(|site| self.sub_scores(site))
            .unwrap_or(SubScores {
                traffic: NEUTRAL_SCORE,
                price: NEUTRAL_SCORE,
                region: UNKNOWN_REGION_SCORE,
            });
        let composite = sub.composite(inputs.weights);

        let structural_normalized = inputs.satisfaction.map(|s| 1.0 + 9.0 * s);
        let poi = match structural_normalized {
            Some(structural) => (1.0 - STRUCT_RATIO) * composite + STRUCT_RATIO * structural,
            None => composite,
        };
        let w = inputs.vector_weight;
        let final_score = (w * inputs.vector_normalized + (1.0 - w) * poi).clamp(1.0, 10.0);

        ScoreBreakdown {
            site_id,
            vector_normalized: inputs.vector_normalized,
            composite_score: composite,
            structural_normalized: structural_normalized.unwrap_or(0.0),
            poi_score: poi,
            final_score,
            traffic_score: sub.traffic,
            price_score: sub.price,
            region_score: sub.region,
            weights: inputs.weights,
        }
    }
}

/// Satisfaction per site id from a row-aligned satisfaction vector
pub fn satisfaction_by_site(table: &SiteTable, satisfaction: &[f64]) -> HashMap<SiteId, f64> {
    table
        .sites()
        .iter()
        .zip(satisfaction)
        .map(|(site, s)| (site.id, *s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_table, table_from};
    use proptest::prelude::*;
    use serde_json::json;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(Arc::new(sample_table()), DistrictTable::default())
    }

    #[test]
    fn test_weights_baseline_and_boosts() {
        assert_eq!(derive_weights(&["商业用地"], false), ScoringWeights::BASELINE);
        assert_eq!(derive_weights(&["靠近地铁"], false), ScoringWeights::TRAFFIC_FOCUSED);
        assert_eq!(derive_weights(&["便宜"], false), ScoringWeights::COST_FOCUSED);
        assert_eq!(derive_weights(&["地铁", "性价比"], false), ScoringWeights::TRAFFIC_AND_COST);
    }

    #[test]
    fn test_region_constraint_caps_region_weight() {
        let weights = derive_weights(&["天河区"], true);
        assert!((weights.sum() - 1.0).abs() < 1e-9);
        assert!((weights.region - 0.10 / 0.77).abs() < 1e-9);

        let focused = derive_weights(&["交通便利"], true);
        assert!((focused.region - 0.10 / 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_district_lookup_with_aliases() {
        let districts = DistrictTable::default();
        assert_eq!(districts.score("广州市天河区珠江新城"), 9.5);
        assert_eq!(districts.score("广州白云机场附近"), 7.5);
        assert_eq!(districts.score("深圳南山"), 7.0);
        assert_eq!(districts.score(""), 7.0);
    }

    #[test]
    fn test_configured_districts_replace_defaults() {
        let mut map = BTreeMap::new();
        map.insert("南山区".to_string(), 9.9);
        let districts = DistrictTable::from(map);
        assert_eq!(districts.score("深圳南山区"), 9.9);
        // Aliases resolve to districts absent from the table
        assert_eq!(districts.score("广州天河"), 7.0);
    }

    #[test]
    fn test_sub_scores() {
        let engine = engine();
        let table = sample_table();
        let a = engine.sub_scores(table.get(SiteId(0)).unwrap());
        let c = engine.sub_scores(table.get(SiteId(2)).unwrap());

        assert_eq!(a.traffic, 9.0);
        assert_eq!(a.price, 1.0);
        assert_eq!(c.price, 10.0);
        assert_eq!(a.region, 9.5);
        assert_eq!(c.region, 7.5);
    }

    #[test]
    fn test_missing_fields_are_neutral() {
        let table = Arc::new(table_from(vec![
            json!({ "id": 0, "lon": 113.3, "lat": 23.1, "traffic_score": "?" }),
            json!({ "id": 1, "lon": 113.3, "lat": 23.1, "traffic_score": 42, "price_per_m2": 5 }),
        ]));
        let engine = ScoringEngine::new(table.clone(), DistrictTable::default());

        let missing = engine.sub_scores(table.get(SiteId(0)).unwrap());
        assert_eq!(missing.traffic, 5.0);
        assert_eq!(missing.price, 5.0);

        // Single observed price: flat range widened to one unit
        let clamped = engine.sub_scores(table.get(SiteId(1)).unwrap());
        assert_eq!(clamped.traffic, 10.0);
        assert_eq!(clamped.price, 10.0);
    }

    #[test]
    fn test_text_normalization() {
        assert_eq!(normalize_text_score(Some(0.5), 0.0, 1.0), 5.5);
        assert_eq!(normalize_text_score(Some(1.0), 0.0, 1.0), 10.0);
        assert_eq!(normalize_text_score(None, 0.0, 1.0), 5.0);
        assert_eq!(normalize_text_score(Some(0.3), 0.3, 0.3), 5.0);
    }

    #[test]
    fn test_breakdown_blends_structure() {
        let engine = engine();
        let weights = ScoringWeights::BASELINE;
        let without = engine.breakdown(
            SiteId(0),
            FinalScoreInputs { vector_normalized: 10.0, satisfaction: None, weights, vector_weight: 0.5 },
        );
        assert_eq!(without.poi_score, without.composite_score);

        let with = engine.breakdown(
            SiteId(0),
            FinalScoreInputs { vector_normalized: 10.0, satisfaction: Some(1.0), weights, vector_weight: 0.5 },
        );
        assert!((with.poi_score - (0.8 * with.composite_score + 0.2 * 10.0)).abs() < 1e-9);
        assert!((with.final_score - (0.5 * 10.0 + 0.5 * with.poi_score)).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_weights_sum_to_one(texts in prop::collection::vec(".{0,12}", 0..4), region in any::<bool>()) {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let weights = derive_weights(&refs, region);
            prop_assert!((weights.sum() - 1.0).abs() < 1e-6);
            prop_assert!(weights.traffic >= 0.0 && weights.price >= 0.0 && weights.region >= 0.0);
        }

        #[test]
        fn prop_composite_in_range(
            traffic in prop::option::of(-100.0f64..100.0),
            price in prop::option::of(-1e6f64..1e6),
            t in 0.0f64..1.0,
            p in 0.0f64..1.0,
        ) {
            let mut row = json!({ "id": 7, "lon": 113.3, "lat": 23.1, "parcel_location": "海珠区" });
            if let Some(traffic) = traffic {
                row["traffic_score"] = json!(traffic);
            }
            if let Some(price) = price {
                row["price_per_m2"] = json!(price);
            }
            let table = Arc::new(table_from(vec![
                row,
                json!({ "id": 8, "lon": 113.3, "lat": 23.1, "price_per_m2": 100.0 }),
            ]));
            let engine = ScoringEngine::new(table, DistrictTable::default());
            let weights = ScoringWeights::new(t, p, 1.0 - t * 0.5).normalized();

            let score = engine.composite(SiteId(7), weights);
            prop_assert!((1.0..=10.0).contains(&score));
        }
    }
}
