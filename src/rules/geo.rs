//! Geospatial primitives: distance and point-in-polygon containment.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned bounding rectangle, used for coarse region resolution.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeoRect {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoRect {
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Ray-casting point-in-polygon test.
///
/// Casts a ray in the +longitude direction and counts edge crossings; an odd
/// count means the point is inside. Vertices are taken in order, the polygon
/// is implicitly closed. Polygons with fewer than 3 vertices contain nothing.
pub fn point_in_polygon(p: GeoPoint, polygon: &[GeoPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (vi, vj) = (polygon[i], polygon[j]);
        let crosses = (vi.lat > p.lat) != (vj.lat > p.lat);
        if crosses {
            let intersect_lon = (vj.lon - vi.lon) * (p.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon;
            if p.lon < intersect_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(10.0, 10.0),
            GeoPoint::new(10.0, 0.0),
        ]
    }

    #[test]
    fn test_point_inside_square() {
        assert!(point_in_polygon(GeoPoint::new(5.0, 5.0), &square()));
    }

    #[test]
    fn test_point_outside_square() {
        assert!(!point_in_polygon(GeoPoint::new(15.0, 5.0), &square()));
        assert!(!point_in_polygon(GeoPoint::new(-1.0, 5.0), &square()));
    }

    #[test]
    fn test_concave_polygon() {
        // L-shape: the notch at the upper right is outside
        let poly = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 10.0),
            GeoPoint::new(5.0, 10.0),
            GeoPoint::new(5.0, 5.0),
            GeoPoint::new(10.0, 5.0),
            GeoPoint::new(10.0, 0.0),
        ];
        assert!(point_in_polygon(GeoPoint::new(2.0, 2.0), &poly));
        assert!(point_in_polygon(GeoPoint::new(8.0, 2.0), &poly));
        assert!(!point_in_polygon(GeoPoint::new(8.0, 8.0), &poly));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)];
        assert!(!point_in_polygon(GeoPoint::new(0.5, 0.5), &line));
        assert!(!point_in_polygon(GeoPoint::new(0.5, 0.5), &[]));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Manila city hall to Quezon City memorial circle, roughly 11 km
        let manila = GeoPoint::new(14.5896, 120.9817);
        let qc = GeoPoint::new(14.6515, 121.0493);
        let d = haversine_km(manila, qc);
        assert!((10.0..13.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        let p = GeoPoint::new(14.6, 121.0);
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn test_rect_contains() {
        let r = GeoRect {
            min_lat: 14.3,
            min_lon: 120.9,
            max_lat: 14.9,
            max_lon: 121.2,
        };
        assert!(r.contains(GeoPoint::new(14.6, 121.0)));
        assert!(!r.contains(GeoPoint::new(15.2, 121.0)));
    }
}
