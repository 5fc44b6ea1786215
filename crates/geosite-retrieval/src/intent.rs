//! Deterministic overrides driven by keywords in the request.
//!
//! These run after structural filtering and may replace the ranking entirely.

use crate::models::StageResult;
use geosite_core::models::{columns, sort_by_score_desc, RequirementSet, Site, SiteScore, SiteTable};

const TRAFFIC_INTENT_TERMS: &[&str] = &[
    "交通", "交通便利", "便捷", "地铁", "公交", "通勤", "运输", "物流", "transit", "subway", "commute",
    "logistics",
];
const INDUSTRIAL_INTENT_TERMS: &[&str] = &[
    "工厂", "工业", "制造", "生产", "食品", "厂房", "产业园", "工业用地", "factory", "industrial",
    "manufactur",
];
const INDUSTRIAL_LAND_USE: &[&str] = &["工业", "industrial"];

/// Intents signalled by the raw request and its positive requirement texts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestIntent {
    pub prioritize_traffic: bool,
    pub industrial: bool,
}

impl RequestIntent {
    pub fn detect(requirements: &RequirementSet) -> Self {
        let mut texts = vec![requirements.request.as_str()];
        texts.extend(requirements.positive_texts());
        let joined = texts.join(" ").to_lowercase();
        let mentions = |terms: &[&str]| terms.iter().any(|t| joined.contains(t));

        Self {
            prioritize_traffic: mentions(TRAFFIC_INTENT_TERMS),
            industrial: mentions(INDUSTRIAL_INTENT_TERMS),
        }
    }

    /// Apply the industrial land-use filter, then the traffic re-ranking.
    ///
    /// An industrial filter that would empty the set is dropped. Traffic
    /// re-ranking replaces each score with the site's clamped traffic rating;
    /// sites without a rating sort last.
    pub fn apply(&self, table: &SiteTable, candidates: Vec<SiteScore>) -> StageResult<Vec<SiteScore>> {
        if candidates.is_empty() {
            return StageResult::Complete(candidates);
        }

        let mut current = candidates;
        let mut fallback = None;

        if self.industrial && table.has_column(columns::LAND_USE) {
            let industrial: Vec<SiteScore> = current
                .iter()
                .filter(|c| table.get(c.site_id).is_some_and(is_industrial))
                .copied()
                .collect();

            tracing::info!(kept = industrial.len(), candidates = current.len(), "Industrial land-use override");
            if industrial.is_empty() {
                fallback = Some("industrial land-use filter removed every candidate; keeping unfiltered set");
            } else {
                current = industrial;
            }
        }

        if self.prioritize_traffic && table.has_column(columns::TRAFFIC_SCORE) {
            current = rank_by_traffic(table, current);
            tracing::info!(candidates = current.len(), "Traffic override re-ranked candidates");
        }

        match fallback {
            Some(reason) => StageResult::degraded(current, reason),
            None => StageResult::Complete(current),
        }
    }
}

fn is_industrial(site: &Site) -> bool {
    let land_use = site.land_use().to_lowercase();
    INDUSTRIAL_LAND_USE.iter().any(|t| land_use.contains(t))
}

fn rank_by_traffic(table: &SiteTable, candidates: Vec<SiteScore>) -> Vec<SiteScore> {
    let mut ranked: Vec<SiteScore> = candidates
        .into_iter()
        .map(|c| {
            let traffic = table
                .get(c.site_id)
                .and_then(|site| site.traffic_score())
                .map(|t| t.clamp(0.0, 10.0))
                .unwrap_or(0.0);
            SiteScore::new(c.site_id, traffic)
        })
        .collect();
    sort_by_score_desc(&mut ranked);
    ranked
}
