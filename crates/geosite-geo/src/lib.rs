//! GeoSite Geo - Distances, geo-cell keys, clustering, and route ordering
//!
//! This crate handles the geospatial operations of site selection: haversine and
//! planar distances, geohash encoding, R-tree backed clustering of projected
//! positions, and TSP ordering of cluster centroids.

pub mod cluster;
pub mod geohash;
pub mod index;
pub mod route;
pub mod spatial;

pub use cluster::{cluster_points, ClusterParams};
pub use index::PointIndex;
pub use route::{
    consecutive_distances, nearest_neighbour_order, rotate_after_longest_edge, tour_length,
    tsp_order,
};
pub use spatial::{centroid, haversine_m, planar_m};
