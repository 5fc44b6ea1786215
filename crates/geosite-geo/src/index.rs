use crate::spatial::planar_m;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

/// Planar point tagged with its position in the input slice
pub type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Spatial index over projected site positions
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    /// Bulk-load the index; each point keeps its slice position as data
    pub fn from_points(points: &[[f64; 2]]) -> Self {
        let indexed: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(*p, i))
            .collect();

        Self { tree: RTree::bulk_load(indexed) }
    }

    /// Positions of all points within `radius` meters of `center`, ascending
    pub fn within(&self, center: [f64; 2], radius: f64) -> Vec<usize> {
        let bbox = AABB::from_corners(
            [center[0] - radius, center[1] - radius],
            [center[0] + radius, center[1] + radius],
        );

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&bbox)
            .filter(|p| planar_m(*p.geom(), center) <= radius)
            .map(|p| p.data)
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_radius() {
        let index = PointIndex::from_points(&[[0.0, 0.0], [300.0, 400.0], [900.0, 0.0], [10.0, 10.0]]);

        assert_eq!(index.len(), 4);
        assert_eq!(index.within([0.0, 0.0], 500.0), vec![0, 1, 3]);
        assert_eq!(index.within([0.0, 0.0], 499.0), vec![0, 3]);
        assert_eq!(index.within([5000.0, 5000.0], 10.0), Vec::<usize>::new());
    }

    #[test]
    fn test_empty_index() {
        let index = PointIndex::from_points(&[]);
        assert!(index.is_empty());
        assert!(index.within([0.0, 0.0], 1000.0).is_empty());
    }
}
