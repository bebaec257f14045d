//! Hard eligibility filters and pairwise/group compatibility scores.
//!
//! No error type appears anywhere in this module: predicates return `bool`,
//! numeric edge cases degrade to zero scores.

use std::collections::HashSet;

use crate::geo::{self, OverlapSegment};
use crate::models::{Commute, GenderPreference, User};

pub fn normalized_gender(gender: &str) -> String {
    gender.trim().to_lowercase()
}

pub fn can_match_gender(left_user: &User, left_commute: &Commute, right_user: &User, right_commute: &Commute) -> bool {
    let left_gender = normalized_gender(&left_user.gender);
    let right_gender = normalized_gender(&right_user.gender);

    if left_commute.gender_preference == GenderPreference::Same && left_gender != right_gender {
        return false;
    }
    if right_commute.gender_preference == GenderPreference::Same && left_gender != right_gender {
        return false;
    }
    true
}

pub fn window_overlap_minutes(left: &Commute, right: &Commute) -> i32 {
    let start = left.time_window.start_minute.max(right.time_window.start_minute);
    let end = left.time_window.end_minute.min(right.time_window.end_minute);
    (end - start).max(0)
}

fn interest_set(interests: &[String]) -> HashSet<String> {
    interests
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn interest_score(left: &User, right: &User) -> f64 {
    let left_set = interest_set(&left.interests);
    let right_set = interest_set(&right.interests);
    if left_set.is_empty() && right_set.is_empty() {
        return 0.0;
    }
    let intersection = left_set.intersection(&right_set).count();
    let union = left_set.union(&right_set).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn overlap_score(overlap_distance_meters: f64, left_route: &[(f64, f64)], right_route: &[(f64, f64)]) -> f64 {
    let left_length = geo::polyline_length_meters(left_route);
    let right_length = geo::polyline_length_meters(right_route);
    let baseline = left_length.min(right_length);
    if baseline <= 0.0 {
        return 0.0;
    }
    (overlap_distance_meters / baseline).min(1.0)
}

#[derive(Debug, Clone, Copy)]
pub struct PairScore {
    pub overlap_score: f64,
    pub interest_score: f64,
    pub composite_score: f64,
}

pub struct AlgorithmWeights {
    pub min_time_overlap_minutes: i32,
    pub min_overlap_distance_meters: f64,
    pub overlap_tolerance_meters: f64,
    pub overlap_weight: f64,
    pub interest_weight: f64,
    pub shared_meters_per_minute: f64,
}

#[derive(Debug, Clone)]
pub struct PairCompatibility {
    pub left_user_id: String,
    pub right_user_id: String,
    pub score: PairScore,
    pub overlap: OverlapSegment,
    pub transport_mode: crate::models::TransportMode,
    pub estimated_shared_minutes: i32,
}

impl PairCompatibility {
    pub fn transport_mode(&self) -> crate::models::TransportMode {
        self.transport_mode
    }
}

/// Runs the four hard filters (§4.2) plus scoring for one ordered pair;
/// `None` if the pair fails any hard filter.
pub fn evaluate_pair(
    left_user: &User,
    left_commute: &Commute,
    right_user: &User,
    right_commute: &Commute,
    weights: &AlgorithmWeights,
) -> Option<PairCompatibility> {
    if left_commute.transport_mode != right_commute.transport_mode {
        return None;
    }
    if window_overlap_minutes(left_commute, right_commute) < weights.min_time_overlap_minutes {
        return None;
    }
    if !can_match_gender(left_user, left_commute, right_user, right_commute) {
        return None;
    }

    let left_route = left_commute.flattened_route();
    let right_route = right_commute.flattened_route();
    let overlap = geo::route_overlap_segment(&left_route, &right_route, weights.overlap_tolerance_meters)?;
    if overlap.overlap_distance_meters < weights.min_overlap_distance_meters {
        return None;
    }

    let overlap_sc = overlap_score(overlap.overlap_distance_meters, &left_route, &right_route);
    let interest_sc = interest_score(left_user, right_user);
    let composite = weights.overlap_weight * overlap_sc + weights.interest_weight * interest_sc;

    let meters_per_minute = weights.shared_meters_per_minute.max(1.0);
    let estimated_minutes =
        ((overlap.overlap_distance_meters / meters_per_minute).round() as i32).max(1);

    Some(PairCompatibility {
        left_user_id: left_user.id.clone(),
        right_user_id: right_user.id.clone(),
        transport_mode: left_commute.transport_mode,
        score: PairScore {
            overlap_score: overlap_sc,
            interest_score: interest_sc,
            composite_score: composite,
        },
        overlap,
        estimated_shared_minutes: estimated_minutes,
    })
}
