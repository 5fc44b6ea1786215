use crate::models::site::SiteId;
use serde::{Deserialize, Serialize};

/// A candidate `(site_id, score)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteScore {
    pub site_id: SiteId,
    pub score: f64,
}

impl SiteScore {
    pub fn new(site_id: SiteId, score: f64) -> Self {
        Self { site_id, score }
    }
}

/// Sort candidates by descending score; equal scores keep their current order
pub fn sort_by_score_desc(candidates: &mut [SiteScore]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Weights of the traffic, price and region sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub traffic: f64,
    pub price: f64,
    pub region: f64,
}

impl ScoringWeights {
    pub const BASELINE: ScoringWeights = ScoringWeights::new(0.34, 0.33, 0.33);
    pub const TRAFFIC_FOCUSED: ScoringWeights = ScoringWeights::new(0.5, 0.25, 0.25);
    pub const TRAFFIC_AND_COST: ScoringWeights = ScoringWeights::new(0.45, 0.45, 0.10);
    pub const COST_FOCUSED: ScoringWeights = ScoringWeights::new(0.25, 0.5, 0.25);
    pub const TRAFFIC_INTENT: ScoringWeights = ScoringWeights::new(0.80, 0.15, 0.05);

    pub const fn new(traffic: f64, price: f64, region: f64) -> Self {
        Self { traffic, price, region }
    }

    pub fn sum(&self) -> f64 {
        self.traffic + self.price + self.region
    }

    /// Rescale to sum 1.0; a degenerate triple becomes the baseline
    pub fn normalized(self) -> Self {
        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Self::BASELINE;
        }
        Self::new(self.traffic / sum, self.price / sum, self.region / sum)
    }

    /// Cap the region weight and renormalize the triple
    pub fn with_region_cap(self, cap: f64) -> Self {
        Self::new(self.traffic, self.price, self.region.min(cap)).normalized()
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// Per-site score breakdown exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub site_id: SiteId,
    pub vector_normalized: f64,
    pub composite_score: f64,
    pub structural_normalized: f64,
    pub poi_score: f64,
    pub final_score: f64,
    pub traffic_score: f64,
    pub price_score: f64,
    pub region_score: f64,
    pub weights: ScoringWeights,
}

/// Spatial cluster of selected sites, members in visit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<SiteId>,
}

impl Cluster {
    pub fn new(id: usize, members: Vec<SiteId>) -> Self {
        Self { id, members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
