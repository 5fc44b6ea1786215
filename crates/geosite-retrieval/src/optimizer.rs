//! Spatial selection and route ordering.
//!
//! Two selection modes exist. Simple mode walks candidates in score order and
//! greedily suppresses sites closer than a minimum great-circle distance to
//! an already selected one. Clustering mode partitions candidates into seeded
//! clusters and down-samples them to the site budget. Route ordering then
//! walks each cluster and orders clusters by a TSP tour over their centroids.

use geosite_core::models::{sort_by_score_desc, Cluster, SiteId, SiteScore, SiteTable};
use geosite_geo::{
    centroid, cluster_points, haversine_m, nearest_neighbour_order, rotate_after_longest_edge, tsp_order,
    ClusterParams,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Synthetic score that ranks anchors ahead of every retrieved candidate
pub const ANCHOR_SCORE: f64 = 1000.0;

/// Budget and spacing of a selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionParams {
    pub max_sites: usize,

    /// Minimum great-circle spacing in simple mode; 0 disables suppression
    pub min_distance_m: f64,

    pub cluster: ClusterParams,
}

/// Sites kept by a selection mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Selected sites in descending score order
    pub sites: Vec<SiteScore>,

    /// Cluster membership, members in descending score order
    pub clusters: Vec<Vec<SiteId>>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn site_ids(&self) -> Vec<SiteId> {
        self.sites.iter().map(|s| s.site_id).collect()
    }
}

/// Visit order over a selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutePlan {
    pub visit_order: Vec<SiteId>,

    /// Clusters with members listed in visit order
    pub clusters: Vec<Cluster>,

    /// Positions into `clusters` in visiting order
    pub cluster_order: Vec<usize>,
}

/// Spatial selection over a site table
pub struct SpatialOptimizer {
    table: Arc<SiteTable>,
    params: SelectionParams,
}

impl SpatialOptimizer {
    pub fn new(table: Arc<SiteTable>, params: SelectionParams) -> Self {
        Self { table, params }
    }

    /// Greedy score-ordered selection with minimum-distance suppression.
    ///
    /// Anchors take [`ANCHOR_SCORE`], so they are considered first, and are
    /// never suppressed. If suppression leaves nothing, the raw top
    /// candidates are returned instead.
    pub fn select_simple(&self, candidates: &[SiteScore], anchors: &[SiteId]) -> Selection {
        let max_sites = self.params.max_sites;
        if max_sites == 0 {
            return Selection::default();
        }

        let anchors = self.known_anchors(anchors);
        let mut pool: Vec<SiteScore> = anchors.iter().map(|&a| SiteScore::new(a, ANCHOR_SCORE)).collect();
        pool.extend(candidates.iter().filter(|c| !anchors.contains(&c.site_id)));
        sort_by_score_desc(&mut pool);

        let mut selected: Vec<SiteScore> = Vec::new();
        for candidate in pool {
            if selected.iter().any(|s| s.site_id == candidate.site_id) {
                continue;
            }
            if self.params.min_distance_m <= 0.0
                || anchors.contains(&candidate.site_id)
                || !self.too_close(candidate.site_id, &selected)
            {
                selected.push(candidate);
            }
            if selected.len() >= max_sites {
                break;
            }
        }

        if selected.is_empty() {
            tracing::warn!("Distance suppression kept no site; using raw top candidates");
            selected = candidates.iter().take(max_sites).copied().collect();
        }

        tracing::info!(selected = selected.len(), candidates = candidates.len(), "Simple selection");
        let clusters = vec![selected.iter().map(|s| s.site_id).collect()];
        Selection { sites: selected, clusters }
    }

    /// Seeded clustering followed by deterministic down-sampling.
    ///
    /// Anchors and pseudo-anchors seed the clusters and always survive the
    /// down-sampling, so the result can only exceed `max_sites` when they
    /// alone do.
    pub fn select_clustered(
        &self,
        candidates: &[SiteScore],
        anchors: &[SiteId],
        pseudo_anchors: &[SiteId],
    ) -> Selection {
        let anchors = self.known_anchors(anchors);

        let mut pool: Vec<SiteScore> = candidates
            .iter()
            .filter(|c| self.table.get(c.site_id).is_some())
            .copied()
            .collect();
        for &anchor in &anchors {
            if !pool.iter().any(|c| c.site_id == anchor) {
                pool.push(SiteScore::new(anchor, ANCHOR_SCORE));
            }
        }
        if pool.is_empty() {
            return Selection::default();
        }

        let protected: HashSet<SiteId> = anchors.iter().chain(pseudo_anchors).copied().collect();
        let points: Vec<[f64; 2]> = pool.iter().map(|c| self.planar(c.site_id)).collect();
        let seeds: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, c)| protected.contains(&c.site_id))
            .map(|(i, _)| i)
            .collect();

        let mut clusters: Vec<Vec<SiteScore>> = cluster_points(&points, &seeds, self.params.cluster)
            .into_iter()
            .map(|members| {
                let mut members: Vec<SiteScore> = members.into_iter().map(|i| pool[i]).collect();
                sort_by_score_desc(&mut members);
                members
            })
            .collect();

        let total: usize = clusters.iter().map(Vec::len).sum();
        if total > self.params.max_sites {
            clusters = down_sample(clusters, &protected, self.params.max_sites);
        }
        clusters.retain(|c| !c.is_empty());

        let mut sites: Vec<SiteScore> = clusters.iter().flatten().copied().collect();
        sort_by_score_desc(&mut sites);

        tracing::info!(
            selected = sites.len(),
            clusters = clusters.len(),
            candidates = candidates.len(),
            "Clustered selection"
        );
        Selection {
            sites,
            clusters: clusters
                .into_iter()
                .map(|members| members.into_iter().map(|m| m.site_id).collect())
                .collect(),
        }
    }

    /// Order sites within and across clusters.
    ///
    /// Disabled ordering keeps score order as one pseudo-cluster.
    pub fn route_order(&self, selection: &Selection, enabled: bool) -> RoutePlan {
        if selection.is_empty() {
            return RoutePlan::default();
        }
        if !enabled {
            let ids = selection.site_ids();
            return RoutePlan {
                visit_order: ids.clone(),
                clusters: vec![Cluster::new(0, ids)],
                cluster_order: vec![0],
            };
        }

        let clusters: Vec<Cluster> = selection
            .clusters
            .iter()
            .filter(|members| !members.is_empty())
            .enumerate()
            .map(|(id, members)| {
                let points: Vec<[f64; 2]> = members.iter().map(|m| self.planar(*m)).collect();
                let walk = nearest_neighbour_order(&points, 0);
                Cluster::new(id, walk.into_iter().map(|i| members[i]).collect())
            })
            .collect();

        let centroids: Vec<[f64; 2]> = clusters
            .iter()
            .map(|cluster| {
                let points: Vec<[f64; 2]> = cluster.members.iter().map(|m| self.planar(*m)).collect();
                centroid(&points).unwrap_or([0.0, 0.0])
            })
            .collect();
        let tour = tsp_order(&centroids);
        let cluster_order = rotate_after_longest_edge(&centroids, &tour);

        let visit_order = cluster_order
            .iter()
            .flat_map(|&c| clusters[c].members.iter().copied())
            .collect();

        tracing::debug!(clusters = clusters.len(), order = ?cluster_order, "Route ordered");
        RoutePlan { visit_order, clusters, cluster_order }
    }

    fn known_anchors(&self, anchors: &[SiteId]) -> Vec<SiteId> {
        let mut known = Vec::new();
        for &anchor in anchors {
            if self.table.get(anchor).is_none() {
                tracing::warn!(site = %anchor, "Ignoring unknown anchor site");
            } else if !known.contains(&anchor) {
                known.push(anchor);
            }
        }
        known
    }

    fn too_close(&self, site_id: SiteId, selected: &[SiteScore]) -> bool {
        let Some(site) = self.table.get(site_id) else {
            return false;
        };
        selected.iter().any(|s| {
            self.table
                .get(s.site_id)
                .is_some_and(|other| haversine_m((site.lon, site.lat), (other.lon, other.lat)) < self.params.min_distance_m)
        })
    }

    fn planar(&self, site_id: SiteId) -> [f64; 2] {
        self.table.get(site_id).map(|s| [s.x, s.y]).unwrap_or([0.0, 0.0])
    }
}

/// Cut clusters down to `max_sites` members.
///
/// Protected members are always kept. The remaining budget is shared across
/// clusters in proportion to their unprotected member counts (largest
/// remainder, earlier clusters first on ties); each cluster keeps its
/// highest-scoring unprotected members.
fn down_sample(
    clusters: Vec<Vec<SiteScore>>,
    protected: &HashSet<SiteId>,
    max_sites: usize,
) -> Vec<Vec<SiteScore>> {
    let protected_count: usize = clusters
        .iter()
        .flatten()
        .filter(|m| protected.contains(&m.site_id))
        .count();
    let budget = max_sites.saturating_sub(protected_count);

    let open: Vec<usize> = clusters
        .iter()
        .map(|members| members.iter().filter(|m| !protected.contains(&m.site_id)).count())
        .collect();
    let open_total: usize = open.iter().sum();

    let mut quotas: Vec<usize> = vec![0; clusters.len()];
    if open_total > 0 && budget > 0 {
        let budget = budget.min(open_total);
        let shares: Vec<f64> = open
            .iter()
            .map(|&n| budget as f64 * n as f64 / open_total as f64)
            .collect();
        for (quota, share) in quotas.iter_mut().zip(&shares) {
            *quota = share.floor() as usize;
        }

        let mut remaining = budget - quotas.iter().sum::<usize>();
        let mut by_remainder: Vec<usize> = (0..clusters.len()).collect();
        by_remainder.sort_by(|&a, &b| (shares[b] - shares[b].floor()).total_cmp(&(shares[a] - shares[a].floor())));
        for c in by_remainder {
            if remaining == 0 {
                break;
            }
            if quotas[c] < open[c] {
                quotas[c] += 1;
                remaining -= 1;
            }
        }
    }

    tracing::debug!(max_sites, protected = protected_count, ?quotas, "Down-sampling clusters");

    clusters
        .into_iter()
        .zip(quotas)
        .map(|(members, quota)| {
            let mut taken = 0;
            members
                .into_iter()
                .filter(|m| {
                    if protected.contains(&m.site_id) {
                        return true;
                    }
                    taken += 1;
                    taken <= quota
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::table_from;
    use proptest::prelude::*;
    use serde_json::json;

    /// Two groups of sites about 5 km apart, each a few hundred meters across
    fn grouped_table() -> Arc<SiteTable> {
        let rows = [
            (0, 113.3000, 23.1000),
            (1, 113.3010, 23.1000),
            (2, 113.3000, 23.1010),
            (3, 113.3490, 23.1000),
            (4, 113.3500, 23.1010),
            (5, 113.3510, 23.1000),
        ];
        Arc::new(table_from(
            rows.iter()
                .map(|(id, lon, lat)| json!({ "id": id, "lon": lon, "lat": lat }))
                .collect(),
        ))
    }

    fn params(max_sites: usize, min_distance_m: f64) -> SelectionParams {
        SelectionParams {
            max_sites,
            min_distance_m,
            cluster: ClusterParams { threshold_m: 2_000.0, min_clusters: 2, min_cluster_size: 2 },
        }
    }

    fn scores(ids_and_scores: &[(u64, f64)]) -> Vec<SiteScore> {
        ids_and_scores.iter().map(|(id, s)| SiteScore::new(SiteId(*id), *s)).collect()
    }

    fn ids(sites: &[SiteScore]) -> Vec<u64> {
        sites.iter().map(|s| s.site_id.0).collect()
    }

    #[test]
    fn test_simple_without_suppression_takes_top_scores() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(3, 0.0));
        let candidates = scores(&[(0, 0.9), (3, 0.8), (1, 0.7), (4, 0.6)]);
        let selection = optimizer.select_simple(&candidates, &[]);
        assert_eq!(ids(&selection.sites), vec![0, 3, 1]);
        assert_eq!(selection.clusters.len(), 1);
    }

    #[test]
    fn test_simple_suppresses_nearby_sites() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(3, 1_000.0));
        let candidates = scores(&[(0, 0.9), (1, 0.8), (3, 0.7), (4, 0.6)]);
        let selection = optimizer.select_simple(&candidates, &[]);
        assert_eq!(ids(&selection.sites), vec![0, 3]);
    }

    #[test]
    fn test_simple_anchors_bypass_suppression() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(3, 1_000.0));
        let candidates = scores(&[(0, 0.9), (3, 0.7)]);
        let selection = optimizer.select_simple(&candidates, &[SiteId(1), SiteId(99)]);
        // Site 0 lies within 1 km of the anchor
        assert_eq!(ids(&selection.sites), vec![1, 3]);
        assert_eq!(selection.sites[0].score, ANCHOR_SCORE);
    }

    #[test]
    fn test_zero_budget_selects_nothing() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(0, 0.0));
        assert!(optimizer.select_simple(&scores(&[(0, 0.9)]), &[SiteId(1)]).is_empty());
    }

    #[test]
    fn test_clustered_selection_splits_groups() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(10, 0.0));
        let candidates = scores(&[(0, 0.9), (3, 0.8), (1, 0.7), (4, 0.6), (2, 0.5), (5, 0.4)]);
        let selection = optimizer.select_clustered(&candidates, &[], &[]);

        assert_eq!(selection.len(), 6);
        assert_eq!(selection.clusters.len(), 2);
        let first: HashSet<u64> = selection.clusters[0].iter().map(|s| s.0).collect();
        assert_eq!(first, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn test_clustered_down_sampling_keeps_protected_sites() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(3, 0.0));
        let candidates = scores(&[(0, 0.9), (3, 0.8), (1, 0.7), (4, 0.6), (2, 0.5), (5, 0.4)]);
        let selection = optimizer.select_clustered(&candidates, &[SiteId(5)], &[SiteId(2)]);

        assert_eq!(selection.len(), 3);
        let kept: HashSet<u64> = ids(&selection.sites).into_iter().collect();
        assert!(kept.contains(&5) && kept.contains(&2));
        assert!(selection.clusters.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_down_sample_largest_remainder() {
        let clusters = vec![
            scores(&[(0, 0.9), (1, 0.8), (2, 0.7), (3, 0.6)]),
            scores(&[(4, 0.5), (5, 0.4)]),
        ];
        let sampled = down_sample(clusters, &HashSet::new(), 3);
        assert_eq!(ids(&sampled[0]), vec![0, 1]);
        assert_eq!(ids(&sampled[1]), vec![4]);
    }

    #[test]
    fn test_route_disabled_keeps_score_order() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(10, 0.0));
        let selection = Selection {
            sites: scores(&[(3, 0.9), (0, 0.8)]),
            clusters: vec![vec![SiteId(0)], vec![SiteId(3)]],
        };
        let plan = optimizer.route_order(&selection, false);
        assert_eq!(plan.visit_order, vec![SiteId(3), SiteId(0)]);
        assert_eq!(plan.cluster_order, vec![0]);
        assert_eq!(plan.clusters.len(), 1);
    }

    #[test]
    fn test_route_visits_every_site_once() {
        let optimizer = SpatialOptimizer::new(grouped_table(), params(10, 0.0));
        let selection = Selection {
            sites: scores(&[(0, 0.9), (3, 0.8), (1, 0.7), (4, 0.6), (2, 0.5), (5, 0.4)]),
            clusters: vec![
                vec![SiteId(0), SiteId(1), SiteId(2)],
                vec![SiteId(3), SiteId(4), SiteId(5)],
            ],
        };
        let plan = optimizer.route_order(&selection, true);

        let mut visited: Vec<u64> = plan.visit_order.iter().map(|s| s.0).collect();
        visited.sort_unstable();
        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);
        // Two clusters: the rotation leaves the tour unchanged
        assert_eq!(plan.cluster_order, vec![0, 1]);
        assert_eq!(plan.clusters[0].members[0], SiteId(0));
    }

    proptest! {
        #[test]
        fn prop_suppression_respects_cap_and_anchors(
            raw in prop::collection::vec(0.0f64..1.0, 1..6),
            max_sites in 1usize..5,
            min_distance in 0.0f64..8_000.0,
            anchor in 0u64..6,
        ) {
            let optimizer = SpatialOptimizer::new(grouped_table(), params(max_sites, min_distance));
            let candidates: Vec<SiteScore> = raw
                .iter()
                .enumerate()
                .map(|(i, s)| SiteScore::new(SiteId(i as u64), *s))
                .collect();
            let selection = optimizer.select_simple(&candidates, &[SiteId(anchor)]);

            prop_assert!(selection.len() <= max_sites);
            prop_assert!(selection.sites.iter().any(|s| s.site_id == SiteId(anchor)));
        }
    }
}
