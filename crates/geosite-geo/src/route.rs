//! Visit ordering: nearest-neighbour walks and a TSP heuristic over cluster centroids

use crate::spatial::planar_m;

/// Greedy nearest-neighbour walk over `points` starting at `start`
pub fn nearest_neighbour_order(points: &[[f64; 2]], start: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let start = start.min(points.len() - 1);

    let mut visited = vec![false; points.len()];
    let mut order = Vec::with_capacity(points.len());
    let mut current = start;
    visited[current] = true;
    order.push(current);

    while order.len() < points.len() {
        let next = (0..points.len())
            .filter(|&i| !visited[i])
            .map(|i| (i, planar_m(points[current], points[i])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            });
        match next {
            Some((i, _)) => {
                visited[i] = true;
                order.push(i);
                current = i;
            }
            None => break,
        }
    }

    order
}

/// Length of the closed tour visiting `order` and returning to its start
pub fn tour_length(points: &[[f64; 2]], order: &[usize]) -> f64 {
    consecutive_distances(points, order).iter().sum()
}

/// Edge lengths of the closed cycle `order + [order[0]]`
pub fn consecutive_distances(points: &[[f64; 2]], order: &[usize]) -> Vec<f64> {
    if order.len() < 2 {
        return vec![0.0; order.len()];
    }
    (0..order.len())
        .map(|i| planar_m(points[order[i]], points[order[(i + 1) % order.len()]]))
        .collect()
}

/// Closed-tour order over `points`: nearest-neighbour construction refined by 2-opt
pub fn tsp_order(points: &[[f64; 2]]) -> Vec<usize> {
    let mut order = nearest_neighbour_order(points, 0);
    let n = order.len();
    if n < 4 {
        return order;
    }

    let dist = |a: usize, b: usize| planar_m(points[a], points[b]);
    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..n - 1 {
            for j in i + 2..n {
                // Reversing the whole tail of a cycle is a no-op
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (a, b) = (order[i], order[i + 1]);
                let (c, d) = (order[j], order[(j + 1) % n]);
                let delta = dist(a, c) + dist(b, d) - dist(a, b) - dist(c, d);
                if delta < -1e-9 {
                    order[i + 1..=j].reverse();
                    improved = true;
                }
            }
        }
    }

    order
}

/// Break the cycle at its longest edge so the open path starts right after it.
///
/// With several equally long edges the last one wins, which leaves a two-node
/// cycle unchanged.
pub fn rotate_after_longest_edge(points: &[[f64; 2]], order: &[usize]) -> Vec<usize> {
    if order.len() < 2 {
        return order.to_vec();
    }
    let distances = consecutive_distances(points, order);
    let longest = distances
        .iter()
        .enumerate()
        .fold(0, |best, (i, d)| if *d >= distances[best] { i } else { best });

    order[longest + 1..]
        .iter()
        .chain(order[..=longest].iter())
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_neighbour_walk() {
        let points = [[0.0, 0.0], [10.0, 0.0], [1.0, 0.0], [5.0, 0.0]];
        assert_eq!(nearest_neighbour_order(&points, 0), vec![0, 2, 3, 1]);
        assert!(nearest_neighbour_order(&[], 0).is_empty());
    }

    #[test]
    fn test_two_opt_removes_crossing() {
        // Square visited in a crossing order by construction
        let points = [[0.0, 0.0], [0.0, 10.0], [10.0, 0.0], [10.0, 10.0], [5.0, -1.0]];
        let order = tsp_order(&points);

        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
        assert!(tour_length(&points, &order) <= 42.0, "tour {:?}", order);
    }

    #[test]
    fn test_two_centroids_any_order_is_equal() {
        let points = [[0.0, 0.0], [5_000.0, 0.0]];
        let forward = tour_length(&points, &[0, 1]);
        let backward = tour_length(&points, &[1, 0]);
        assert_eq!(forward, backward);
        assert_eq!(tsp_order(&points).len(), 2);
    }

    #[test]
    fn test_rotation_on_two_nodes_is_noop() {
        let points = [[0.0, 0.0], [5_000.0, 0.0]];
        assert_eq!(rotate_after_longest_edge(&points, &[0, 1]), vec![0, 1]);
        assert_eq!(rotate_after_longest_edge(&points, &[1, 0]), vec![1, 0]);
    }

    #[test]
    fn test_rotation_starts_after_longest_edge() {
        // Edges: 0->1 = 1, 1->2 = 1, 2->0 = 2; longest closes the cycle
        let points = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        assert_eq!(rotate_after_longest_edge(&points, &[0, 1, 2]), vec![0, 1, 2]);

        // Edges: 0->2 = 2, 2->1 = 1, 1->0 = 1; path starts at 2
        assert_eq!(rotate_after_longest_edge(&points, &[0, 2, 1]), vec![2, 1, 0]);
    }
}
