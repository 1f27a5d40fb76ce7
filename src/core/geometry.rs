use crate::config::toml_config::MapConfig;
use crate::domain::model::{Coordinate, ResolvedPath};
use serde::Serialize;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let dlat = lat2_rad - lat1_rad;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_distance(a, b) * 1000.0
}

/// Length of the polyline in metres.
pub fn path_length_meters(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance_meters(&pair[0], &pair[1]))
        .sum()
}

/// Length from `index` to the end of the path.
pub fn remaining_meters(points: &[Coordinate], index: usize) -> f64 {
    match points.get(index..) {
        Some(rest) => path_length_meters(rest),
        None => 0.0,
    }
}

/// Index of the path point closest to `target`.
pub fn nearest_index(points: &[Coordinate], target: &Coordinate) -> Option<usize> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| (i, haversine_distance(point, target)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Map region framing a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRegion {
    pub center: Coordinate,
    pub span_lat: f64,
    pub span_lng: f64,
}

impl BoundingRegion {
    pub fn around(center: Coordinate, span: f64) -> Self {
        Self {
            center,
            span_lat: span,
            span_lng: span,
        }
    }

    /// The configured fallback region for paths with no points.
    pub fn default_region(map: &MapConfig) -> Self {
        Self::around(map.default_center, map.default_span_degrees)
    }
}

/// Region from min/max over all points, padded by `padding_factor`. Spans
/// never drop below `min_span_degrees`. `None` for an empty slice.
pub fn bounding_region_of(points: &[Coordinate], map: &MapConfig) -> Option<BoundingRegion> {
    let first = points.first()?;
    let (mut min_lat, mut max_lat) = (first.latitude, first.latitude);
    let (mut min_lng, mut max_lng) = (first.longitude, first.longitude);

    for point in &points[1..] {
        min_lat = min_lat.min(point.latitude);
        max_lat = max_lat.max(point.latitude);
        min_lng = min_lng.min(point.longitude);
        max_lng = max_lng.max(point.longitude);
    }

    Some(BoundingRegion {
        center: Coordinate {
            latitude: (min_lat + max_lat) / 2.0,
            longitude: (min_lng + max_lng) / 2.0,
        },
        span_lat: ((max_lat - min_lat) * map.padding_factor).max(map.min_span_degrees),
        span_lng: ((max_lng - min_lng) * map.padding_factor).max(map.min_span_degrees),
    })
}

pub fn bounding_region(path: &ResolvedPath, map: &MapConfig) -> Option<BoundingRegion> {
    bounding_region_of(&path.points, map)
}
