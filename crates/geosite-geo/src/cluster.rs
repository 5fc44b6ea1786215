//! Seeded leader clustering over projected points.
//!
//! Seeds are the anchor points first; every point farther than the threshold
//! from all existing seeds opens a new cluster. When fewer than `min_clusters`
//! seeds exist, the point farthest from the current seeds is promoted until the
//! minimum is met. Points join their nearest seed. Clusters smaller than
//! `min_cluster_size` that hold no anchor are dissolved into their neighbours
//! while more than `min_clusters` clusters remain.

use crate::index::PointIndex;
use crate::spatial::planar_m;

/// Parameters of a clustering run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Radius in meters a seed covers
    pub threshold_m: f64,
    pub min_clusters: usize,
    pub min_cluster_size: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { threshold_m: 10_000.0, min_clusters: 2, min_cluster_size: 2 }
    }
}

/// Partition point positions into clusters.
///
/// `points` is expected in priority order (best candidates first); `anchors` are
/// positions into `points`. Returned clusters list member positions in input
/// order and are ordered by their seed's priority.
pub fn cluster_points(points: &[[f64; 2]], anchors: &[usize], params: ClusterParams) -> Vec<Vec<usize>> {
    if points.is_empty() {
        return Vec::new();
    }

    let mut seeds: Vec<usize> = Vec::new();
    for &a in anchors {
        if a < points.len() && !seeds.contains(&a) {
            seeds.push(a);
        }
    }

    let index = PointIndex::from_points(points);
    let mut covered = vec![false; points.len()];
    for &seed in &seeds {
        for hit in index.within(points[seed], params.threshold_m) {
            covered[hit] = true;
        }
    }
    for i in 0..points.len() {
        if !covered[i] {
            seeds.push(i);
            for hit in index.within(points[i], params.threshold_m) {
                covered[hit] = true;
            }
        }
    }

    while seeds.len() < params.min_clusters.min(points.len()) {
        let farthest = (0..points.len())
            .filter(|i| !seeds.contains(i))
            .map(|i| (i, distance_to_nearest(points, &seeds, points[i])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        match farthest {
            Some((i, _)) => seeds.push(i),
            None => break,
        }
    }

    let mut members = assign(points, &seeds);

    loop {
        if seeds.len() <= params.min_clusters.max(1) {
            break;
        }
        let weakest = (0..seeds.len())
            .filter(|&c| members[c].len() < params.min_cluster_size)
            .filter(|&c| !members[c].iter().any(|m| anchors.contains(m)))
            .min_by_key(|&c| (members[c].len(), std::cmp::Reverse(c)));

        match weakest {
            Some(c) => {
                tracing::debug!(seed = seeds[c], size = members[c].len(), "Dissolving small cluster");
                seeds.remove(c);
                members = assign(points, &seeds);
            }
            None => break,
        }
    }

    members.into_iter().filter(|m| !m.is_empty()).collect()
}

fn distance_to_nearest(points: &[[f64; 2]], seeds: &[usize], p: [f64; 2]) -> f64 {
    seeds
        .iter()
        .map(|&s| planar_m(points[s], p))
        .fold(f64::INFINITY, f64::min)
}

/// Assign every point to its nearest seed; ties go to the earlier seed
fn assign(points: &[[f64; 2]], seeds: &[usize]) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); seeds.len()];
    for (i, p) in points.iter().enumerate() {
        let nearest = seeds
            .iter()
            .enumerate()
            .map(|(c, &s)| (c, planar_m(points[s], *p)))
            .fold(None, |best: Option<(usize, f64)>, (c, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((c, d)),
            });
        if let Some((c, _)) = nearest {
            members[c].push(i);
        }
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> Vec<[f64; 2]> {
        vec![
            [0.0, 0.0],
            [100.0, 0.0],
            [50_000.0, 0.0],
            [0.0, 150.0],
            [50_100.0, 50.0],
        ]
    }

    #[test]
    fn test_two_distant_groups() {
        let clusters = cluster_points(&two_groups(), &[], ClusterParams::default());
        assert_eq!(clusters, vec![vec![0, 1, 3], vec![2, 4]]);
    }

    #[test]
    fn test_min_clusters_splits_single_group() {
        let points = vec![[0.0, 0.0], [100.0, 0.0], [200.0, 0.0], [300.0, 0.0]];
        let clusters = cluster_points(&points, &[], ClusterParams { min_cluster_size: 1, ..Default::default() });
        assert_eq!(clusters.len(), 2);
        // The farthest point from the first seed opens the second cluster
        assert!(clusters[1].contains(&3));
    }

    #[test]
    fn test_small_clusters_dissolve_unless_anchored() {
        let mut points = two_groups();
        points.push([200_000.0, 0.0]);

        let clusters = cluster_points(&points, &[], ClusterParams::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.iter().map(Vec::len).sum::<usize>(), points.len());

        let anchored = cluster_points(&points, &[5], ClusterParams::default());
        assert_eq!(anchored.len(), 3);
        assert_eq!(anchored[0], vec![5]);
    }

    #[test]
    fn test_every_point_assigned_once() {
        let points: Vec<[f64; 2]> = (0..30).map(|i| [(i * 1_700) as f64, ((i % 4) * 900) as f64]).collect();
        let clusters = cluster_points(&points, &[7, 21], ClusterParams { threshold_m: 5_000.0, ..Default::default() });

        let mut seen: Vec<usize> = clusters.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_points(&[], &[], ClusterParams::default()).is_empty());
    }
}
