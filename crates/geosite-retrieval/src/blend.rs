//! Blending of retrieval scores with an external per-cell probability.

use crate::constraints::TextScoreRange;
use geosite_core::models::{sort_by_score_desc, SiteScore, SiteTable};
use geosite_core::ports::ProbabilitySource;
use geosite_geo::geohash;

/// Blend weights and geo-cell precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub text: f64,
    pub probability: f64,
    pub geohash_precision: usize,
}

/// Re-rank candidates by `text·minmax(score) + probability·coverage·p`.
///
/// Candidates without a known cell take the median of the known probabilities
/// (0 when none is known). The probability weight is scaled by the fraction of
/// candidates with a known cell.
pub fn blend_probabilities(
    table: &SiteTable,
    source: &dyn ProbabilitySource,
    candidates: &[SiteScore],
    weights: BlendWeights,
) -> Vec<SiteScore> {
    if candidates.is_empty() || weights.probability <= 0.0 {
        return candidates.to_vec();
    }

    let range = TextScoreRange::of(candidates);
    let probabilities: Vec<Option<f64>> = candidates
        .iter()
        .map(|c| {
            table
                .get(c.site_id)
                .map(|site| geohash::encode(site.lat, site.lon, weights.geohash_precision))
                .and_then(|cell| source.lookup(&cell))
        })
        .collect();

    let known: Vec<f64> = probabilities.iter().flatten().copied().collect();
    let coverage = known.len() as f64 / candidates.len() as f64;
    let imputed = median(known).unwrap_or(0.0);
    let probability_weight = weights.probability * coverage;

    tracing::info!(
        covered = (coverage * candidates.len() as f64).round() as usize,
        candidates = candidates.len(),
        weight = probability_weight,
        "Blending cell probabilities"
    );

    let mut blended: Vec<SiteScore> = candidates
        .iter()
        .zip(probabilities)
        .map(|(c, p)| {
            let p = p.unwrap_or(imputed);
            SiteScore::new(c.site_id, weights.text * range.normalize(c.score) + probability_weight * p)
        })
        .collect();
    sort_by_score_desc(&mut blended);
    blended
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
