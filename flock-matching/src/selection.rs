//! Greedy individual pairing and group clique enumeration.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::geo::OverlapSegment;
use crate::models::{Commute, MatchKind, TransportMode, User};
use crate::scoring::{self, AlgorithmWeights, PairCompatibility, PairScore};

#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub participants: Vec<String>,
    pub kind: MatchKind,
    pub transport_mode: TransportMode,
    pub scores: PairScore,
    pub overlap: OverlapSegment,
    pub estimated_shared_minutes: i32,
}

fn sorted_pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn build_pair_compatibilities(
    users: &HashMap<String, User>,
    commutes: &HashMap<String, Commute>,
    weights: &AlgorithmWeights,
) -> Vec<PairCompatibility> {
    let mut user_ids: Vec<&String> = users.keys().collect();
    user_ids.sort();

    let mut compatibilities = Vec::new();
    for pair in user_ids.iter().combinations(2) {
        let left_id = pair[0];
        let right_id = pair[1];
        let left_user = &users[*left_id];
        let right_user = &users[*right_id];
        let left_commute = &commutes[*left_id];
        let right_commute = &commutes[*right_id];

        if let Some(compatibility) =
            scoring::evaluate_pair(left_user, left_commute, right_user, right_commute, weights)
        {
            compatibilities.push(compatibility);
        }
    }
    compatibilities
}

fn build_individual_matches(compatibilities: Vec<PairCompatibility>) -> Vec<MatchCandidate> {
    let mut sorted_pairs = compatibilities;
    sorted_pairs.sort_by(|a, b| {
        b.score
            .composite_score
            .partial_cmp(&a.score.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                sorted_pair_key(&a.left_user_id, &a.right_user_id)
                    .cmp(&sorted_pair_key(&b.left_user_id, &b.right_user_id))
            })
    });

    let mut consumed: HashSet<String> = HashSet::new();
    let mut selected = Vec::new();

    for pair in sorted_pairs {
        if consumed.contains(&pair.left_user_id) || consumed.contains(&pair.right_user_id) {
            continue;
        }
        consumed.insert(pair.left_user_id.clone());
        consumed.insert(pair.right_user_id.clone());

        selected.push(MatchCandidate {
            participants: vec![pair.left_user_id.clone(), pair.right_user_id.clone()],
            kind: MatchKind::Individual,
            transport_mode: pair.transport_mode(),
            scores: pair.score,
            overlap: pair.overlap,
            estimated_shared_minutes: pair.estimated_shared_minutes,
        });
    }
    selected
}

fn supports_group_size(commute: &Commute, size: usize) -> bool {
    let size = size as i32;
    commute.group_size_pref.min <= size && size <= commute.group_size_pref.max
}

fn is_clique(members: &[&String], pair_lookup: &HashMap<(String, String), &PairCompatibility>) -> bool {
    members
        .iter()
        .combinations(2)
        .all(|pair| pair_lookup.contains_key(&sorted_pair_key(pair[0], pair[1])))
}

fn aggregate_group_score(
    members: &[&String],
    pair_lookup: &HashMap<(String, String), &PairCompatibility>,
) -> (PairScore, OverlapSegment, TransportMode, i32) {
    let pairs: Vec<&PairCompatibility> = members
        .iter()
        .combinations(2)
        .map(|pair| pair_lookup[&sorted_pair_key(pair[0], pair[1])])
        .collect();

    let n = pairs.len() as f64;
    let overlap_avg = pairs.iter().map(|p| p.score.overlap_score).sum::<f64>() / n;
    let interest_avg = pairs.iter().map(|p| p.score.interest_score).sum::<f64>() / n;
    let composite_avg = pairs.iter().map(|p| p.score.composite_score).sum::<f64>() / n;
    let longest_overlap = pairs
        .iter()
        .max_by(|a, b| {
            a.overlap
                .overlap_distance_meters
                .partial_cmp(&b.overlap.overlap_distance_meters)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap()
        .overlap
        .clone();
    let avg_minutes = ((pairs.iter().map(|p| p.estimated_shared_minutes).sum::<i32>() as f64
        / n)
        .round() as i32)
        .max(1);
    let mode = pairs[0].transport_mode();

    (
        PairScore {
            overlap_score: overlap_avg,
            interest_score: interest_avg,
            composite_score: composite_avg,
        },
        longest_overlap,
        mode,
        avg_minutes,
    )
}

fn build_group_matches(
    compatibilities: Vec<PairCompatibility>,
    commutes: &HashMap<String, Commute>,
) -> Vec<MatchCandidate> {
    let pair_lookup: HashMap<(String, String), &PairCompatibility> = compatibilities
        .iter()
        .map(|pair| (sorted_pair_key(&pair.left_user_id, &pair.right_user_id), pair))
        .collect();

    // `commutes` has already been narrowed to users whose preference permits
    // this kind (including "both") by the caller's snapshot filter — the
    // clique composition stage does not re-restrict by preference (spec's
    // open question: mirror the source's lack of further restriction here).
    let mut available: HashSet<String> = commutes.keys().cloned().collect();

    let mut selected = Vec::new();

    loop {
        let mut best: Option<(MatchCandidate, Vec<String>)> = None;

        for target_size in [4usize, 3usize] {
            if available.len() < target_size {
                continue;
            }
            let mut sorted_available: Vec<&String> = available.iter().collect();
            sorted_available.sort();

            for members in sorted_available.iter().copied().combinations(target_size) {
                if !members
                    .iter()
                    .all(|member| supports_group_size(&commutes[*member], target_size))
                {
                    continue;
                }
                if !is_clique(&members, &pair_lookup) {
                    continue;
                }
                let (score, overlap, mode, estimated_minutes) =
                    aggregate_group_score(&members, &pair_lookup);
                let candidate = MatchCandidate {
                    participants: members.iter().map(|m| (*m).clone()).collect(),
                    kind: MatchKind::Group,
                    transport_mode: mode,
                    scores: score,
                    overlap,
                    estimated_shared_minutes: estimated_minutes,
                };
                let is_better = best
                    .as_ref()
                    .map(|(existing, _)| candidate.scores.composite_score > existing.scores.composite_score)
                    .unwrap_or(true);
                if is_better {
                    let member_ids: Vec<String> = members.iter().map(|m| (*m).clone()).collect();
                    best = Some((candidate, member_ids));
                }
            }
        }

        let Some((candidate, members)) = best else {
            break;
        };
        for member in &members {
            available.remove(member);
        }
        selected.push(candidate);
    }

    selected
}

/// Runs individual or group selection (depending on `kind`) over users whose
/// commute's `match_preference` permits this `kind`.
pub fn run_matching_algorithm(
    users: &[User],
    commutes: &[Commute],
    kind: MatchKind,
    weights: &AlgorithmWeights,
) -> Vec<MatchCandidate> {
    let users_by_id: HashMap<String, User> = users.iter().map(|u| (u.id.clone(), u.clone())).collect();
    let commutes_by_user: HashMap<String, Commute> =
        commutes.iter().map(|c| (c.user_id.clone(), c.clone())).collect();

    let eligible_ids: Vec<String> = users
        .iter()
        .filter(|u| {
            commutes_by_user
                .get(&u.id)
                .map(|c| c.match_preference.permits(kind))
                .unwrap_or(false)
        })
        .map(|u| u.id.clone())
        .collect();

    let filtered_users: HashMap<String, User> = eligible_ids
        .iter()
        .map(|id| (id.clone(), users_by_id[id].clone()))
        .collect();
    let filtered_commutes: HashMap<String, Commute> = eligible_ids
        .iter()
        .map(|id| (id.clone(), commutes_by_user[id].clone()))
        .collect();

    if filtered_users.len() < 2 {
        return Vec::new();
    }

    let compatibilities = build_pair_compatibilities(&filtered_users, &filtered_commutes, weights);
    if compatibilities.is_empty() {
        return Vec::new();
    }

    match kind {
        MatchKind::Individual => build_individual_matches(compatibilities),
        MatchKind::Group => build_group_matches(compatibilities, &filtered_commutes),
    }
}
