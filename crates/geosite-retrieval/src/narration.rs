//! Narration request assembly, narrative enrichment and map output

use crate::models::{MapCenter, RankedSite};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use geosite_core::models::{columns, NarrationRequest, Narrative, RequirementSet, SiteNarrative, SiteTable};
use serde_json::{Map, Value as JsonValue};

/// Build the narrator input from the ranked sites, first `max_sites` only
pub fn narration_request(
    requirements: &RequirementSet,
    table: &SiteTable,
    ranked: &[RankedSite],
    max_sites: usize,
) -> NarrationRequest {
    let candidates = ranked
        .iter()
        .take(max_sites)
        .filter_map(|r| table.get(r.site_id))
        .map(|site| {
            let context = if site.context.trim().is_empty() { &site.desc } else { &site.context };
            NarrationRequest::truncate_context(context)
        })
        .collect();

    NarrationRequest {
        request: requirements.request.clone(),
        requirements: requirements.positive_texts().into_iter().map(str::to_string).collect(),
        constraint_summary: requirements.constraint_summary(),
        candidates,
        max_sites,
    }
}

/// Fill the narrative with dataset facts.
///
/// Dataset names win over model names, final scores replace model scores, and
/// empty advantages or reasons are backfilled from the site context. Every
/// ranked site gets an entry keyed by its 1-based rank.
pub fn enrich(mut narrative: Narrative, table: &SiteTable, ranked: &[RankedSite]) -> Narrative {
    for (position, ranked_site) in ranked.iter().enumerate() {
        let key = (position + 1).to_string();
        let mut entry = narrative.sites.remove(&key).unwrap_or_default();
        let site = table.get(ranked_site.site_id);

        let dataset_name = site
            .map(|s| s.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                site.map(|s| s.text(columns::PARCEL_LOCATION).trim().to_string())
                    .filter(|n| !n.is_empty())
            });
        entry.name = match dataset_name {
            Some(name) => name,
            None if !entry.name.trim().is_empty() => entry.name,
            None => format!("地块{}", key),
        };

        entry.score = Some(ranked_site.breakdown.final_score);

        let context = site.map(|s| s.context.clone()).unwrap_or_default();
        if entry.advantages.is_empty() && !context.is_empty() {
            entry.advantages = vec![context.clone()];
        }
        if entry.reason.trim().is_empty() {
            entry.reason = NarrationRequest::truncate_context(&context);
        }

        narrative.sites.insert(key, entry);
    }
    narrative
}

/// Point features of the ranked sites, with narrative names and reasons when present
pub fn to_geojson(ranked: &[RankedSite], narrative: Option<&Narrative>) -> FeatureCollection {
    let features = ranked
        .iter()
        .enumerate()
        .map(|(position, site)| {
            let entry: Option<&SiteNarrative> = narrative.and_then(|n| n.site(position));

            let mut properties = Map::new();
            properties.insert("index".to_string(), JsonValue::from(position + 1));
            properties.insert("id".to_string(), JsonValue::from(site.site_id.to_string()));
            properties.insert(
                "name".to_string(),
                JsonValue::from(entry.map(|e| e.name.clone()).unwrap_or_else(|| site.name.clone())),
            );
            properties.insert("score".to_string(), JsonValue::from(site.breakdown.final_score));
            properties.insert(
                "reason".to_string(),
                JsonValue::from(entry.map(|e| e.reason.clone()).unwrap_or_default()),
            );

            Feature {
                geometry: Some(Geometry::new(GeoJsonValue::Point(vec![site.lon, site.lat]))),
                properties: Some(properties),
                id: None,
                bbox: None,
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    }
}

/// Mean position of the ranked sites; the origin when there are none
pub fn map_center(ranked: &[RankedSite]) -> MapCenter {
    if ranked.is_empty() {
        return MapCenter { lon: 0.0, lat: 0.0 };
    }
    let n = ranked.len() as f64;
    MapCenter {
        lon: ranked.iter().map(|r| r.lon).sum::<f64>() / n,
        lat: ranked.iter().map(|r| r.lat).sum::<f64>() / n,
    }
}
