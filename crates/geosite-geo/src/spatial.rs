use geo::{Centroid, Distance, Euclidean, Haversine, MultiPoint, Point};

/// Great-circle distance in meters between two `(lon, lat)` positions
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    Haversine.distance(Point::new(a.0, a.1), Point::new(b.0, b.1))
}

/// Planar distance in meters between two projected positions
pub fn planar_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    Euclidean.distance(Point::new(a[0], a[1]), Point::new(b[0], b[1]))
}

/// Centroid of a set of planar points
pub fn centroid(points: &[[f64; 2]]) -> Option<[f64; 2]> {
    let multi: MultiPoint<f64> = points.iter().map(|p| Point::new(p[0], p[1])).collect();
    multi.centroid().map(|c| [c.x(), c.y()])
}
