//! Great-circle distance, polyline length, and route-overlap extraction.

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlapSegment {
    pub meet_point: OverlapPoint,
    pub split_point: OverlapPoint,
    pub overlap_distance_meters: f64,
}

pub fn haversine_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = a;
    let (lat2, lng2) = b;
    let (lat1_r, lng1_r) = (lat1.to_radians(), lng1.to_radians());
    let (lat2_r, lng2_r) = (lat2.to_radians(), lng2.to_radians());
    let delta_lat = lat2_r - lat1_r;
    let delta_lng = lng2_r - lng1_r;

    let value = (delta_lat / 2.0).sin().powi(2)
        + lat1_r.cos() * lat2_r.cos() * (delta_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * value.sqrt().atan2((1.0 - value).sqrt())
}

pub fn polyline_length_meters(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .windows(2)
        .map(|pair| haversine_meters(pair[0], pair[1]))
        .sum()
}

/// Ordered subsequence of `left_route` whose points fall within `tolerance_meters`
/// of some point in `right_route`. `None` if fewer than two points match or the
/// matched subsequence has zero length.
pub fn route_overlap_segment(
    left_route: &[(f64, f64)],
    right_route: &[(f64, f64)],
    tolerance_meters: f64,
) -> Option<OverlapSegment> {
    if left_route.is_empty() || right_route.is_empty() {
        return None;
    }

    let matched_points: Vec<(f64, f64)> = left_route
        .iter()
        .copied()
        .filter(|point| {
            right_route
                .iter()
                .any(|other| haversine_meters(*point, *other) <= tolerance_meters)
        })
        .collect();

    if matched_points.len() < 2 {
        return None;
    }

    let overlap_distance = polyline_length_meters(&matched_points);
    if overlap_distance <= 0.0 {
        return None;
    }

    let (meet_lat, meet_lng) = matched_points[0];
    let (split_lat, split_lng) = *matched_points.last().unwrap();
    Some(OverlapSegment {
        meet_point: OverlapPoint {
            lat: meet_lat,
            lng: meet_lng,
        },
        split_point: OverlapPoint {
            lat: split_lat,
            lng: split_lng,
        },
        overlap_distance_meters: overlap_distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_same_point_is_zero() {
        assert_eq!(haversine_meters((45.0, 9.0), (45.0, 9.0)), 0.0);
    }

    #[test]
    fn haversine_known_distance_roughly_111km_per_degree_lat() {
        let dist = haversine_meters((0.0, 0.0), (1.0, 0.0));
        assert!((dist - 111_195.0).abs() < 500.0);
    }

    #[test]
    fn polyline_length_of_single_point_is_zero() {
        assert_eq!(polyline_length_meters(&[(0.0, 0.0)]), 0.0);
    }

    #[test]
    fn polyline_length_sums_segments() {
        let points = vec![(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)];
        let total = polyline_length_meters(&points);
        let leg = haversine_meters((0.0, 0.0), (0.0, 1.0));
        assert!((total - 2.0 * leg).abs() < 1e-6);
    }

    #[test]
    fn overlap_segment_requires_two_matching_points() {
        let left = vec![(0.0, 0.0)];
        let right = vec![(0.0, 0.0)];
        assert!(route_overlap_segment(&left, &right, 50.0).is_none());
    }

    #[test]
    fn overlap_segment_finds_shared_subsequence() {
        let left = vec![(0.0, 0.0), (0.0, 0.001), (0.0, 0.002), (0.0, 5.0)];
        let right = vec![(0.0, 0.0), (0.0, 0.001), (0.0, 0.002)];
        let overlap = route_overlap_segment(&left, &right, 10.0).expect("overlap expected");
        assert_eq!(overlap.meet_point, OverlapPoint { lat: 0.0, lng: 0.0 });
        assert_eq!(
            overlap.split_point,
            OverlapPoint {
                lat: 0.0,
                lng: 0.002
            }
        );
        assert!(overlap.overlap_distance_meters > 0.0);
    }

    #[test]
    fn empty_routes_have_no_overlap() {
        assert!(route_overlap_segment(&[], &[(0.0, 0.0)], 10.0).is_none());
    }
}
