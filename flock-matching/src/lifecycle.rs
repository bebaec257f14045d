//! Cycle orchestration (§4.5): the suggestions phase, the queue-assignment
//! phase (with its promotion pass), and point naming for newly created
//! matches.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::geo;
use crate::models::{
    ChatRoom, Commute, MatchDocument, MatchKind, MatchScores, MatchSource, MatchStatus, NamedPoint,
    ParticipantDecision, User,
};
use crate::scoring::AlgorithmWeights;
use crate::selection::{self, MatchCandidate};
use crate::snapshot;
use crate::store::{MatchFilter, Store};

const POINT_NAMING_RADIUS_METERS: f64 = 400.0;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleCounts {
    pub suggestions_individual: i32,
    pub suggestions_group: i32,
    pub assignments_individual: i32,
    pub assignments_group: i32,
}

/// One queue-assignment-phase transition: either a fresh assignment
/// (`fresh = true`, fires `assignment.created`) or a promoted suggestion
/// (`fresh = false`, fires `match.activated`) — §4.K needs to tell them
/// apart even though both end in `MatchStatus::Active`.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub document: MatchDocument,
    pub fresh: bool,
}

/// Everything a matching cycle produced, for the caller to both log and
/// publish domain events from (component K fires events at the HTTP
/// handler layer, same as the teacher's publisher calls in route handlers).
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub counts: CycleCounts,
    pub suggestions_created: Vec<MatchDocument>,
    pub queue_events: Vec<QueueEvent>,
}

/// Names the overlap's meet and split point by scanning both participants'
/// named anchors for the nearest one within 400 m, falling back to generic
/// labels when nothing qualifies.
fn name_point(anchors: &[NamedPoint], point: (f64, f64), fallback: &str) -> NamedPoint {
    let mut best: Option<(&NamedPoint, f64)> = None;
    for anchor in anchors {
        let distance = geo::haversine_meters((anchor.lat, anchor.lng), point);
        if distance <= POINT_NAMING_RADIUS_METERS {
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((anchor, distance));
            }
        }
    }
    match best {
        Some((anchor, _)) => NamedPoint { name: anchor.name.clone(), lat: point.0, lng: point.1 },
        None => NamedPoint { name: fallback.to_string(), lat: point.0, lng: point.1 },
    }
}

fn named_overlap_points(candidate: &MatchCandidate, commutes_by_user: &HashMap<String, Commute>) -> (NamedPoint, NamedPoint) {
    let mut anchors = Vec::new();
    for participant in &candidate.participants {
        if let Some(commute) = commutes_by_user.get(participant) {
            anchors.extend(commute.named_anchors());
        }
    }
    let meet_point = (candidate.overlap.meet_point.lat, candidate.overlap.meet_point.lng);
    let split_point = (candidate.overlap.split_point.lat, candidate.overlap.split_point.lng);
    let start = name_point(&anchors, meet_point, "Shared route start");
    let end = name_point(&anchors, split_point, "Shared route end");
    (start, end)
}

fn candidate_into_document(
    candidate: MatchCandidate,
    source: MatchSource,
    status: MatchStatus,
    commutes_by_user: &HashMap<String, Commute>,
    commute_date: Option<NaiveDate>,
) -> MatchDocument {
    let (shared_segment_start, shared_segment_end) = named_overlap_points(&candidate, commutes_by_user);
    let now = Utc::now();
    let decisions = candidate.participants.iter().map(ParticipantDecision::new).collect();
    MatchDocument {
        id: None,
        source,
        kind: candidate.kind,
        status,
        participants: candidate.participants,
        transport_mode: candidate.transport_mode,
        scores: MatchScores {
            overlap_score: candidate.scores.overlap_score,
            interest_score: candidate.scores.interest_score,
            composite_score: candidate.scores.composite_score,
        },
        compatibility_percent: (candidate.scores.composite_score * 100.0).round() as i32,
        shared_segment_start,
        shared_segment_end,
        estimated_time_minutes: candidate.estimated_shared_minutes,
        decisions,
        chat_room_id: None,
        commute_date,
        created_at: now,
        updated_at: now,
    }
}

fn slot_budget(kind: MatchKind, commute: &Commute) -> i32 {
    match kind {
        MatchKind::Group => 1,
        MatchKind::Individual => {
            if commute.match_preference == crate::models::MatchPreference::Both {
                2
            } else {
                1
            }
        }
    }
}

fn is_open_suggested(document: &MatchDocument, pass_cooldown_days: i64) -> bool {
    let open_status = matches!(document.status, MatchStatus::Suggested | MatchStatus::Active);
    if !open_status {
        return false;
    }
    if pass_cooldown_days <= 0 && document.decisions.iter().any(|d| d.passed_at.is_some()) {
        return false;
    }
    true
}

async fn active_participant_ids(store: &dyn Store) -> anyhow::Result<HashSet<String>> {
    let active = store
        .find_matches(MatchFilter {
            status_in: Some(vec![MatchStatus::Active]),
            ..Default::default()
        })
        .await?;
    Ok(active.into_iter().flat_map(|m| m.participants).collect())
}

/// Runs the suggestions phase for one kind; returns the newly created
/// suggestion documents.
pub async fn run_suggestions_for_kind(
    store: &dyn Store,
    kind: MatchKind,
    weights: &AlgorithmWeights,
    pass_cooldown_days: i64,
) -> anyhow::Result<Vec<MatchDocument>> {
    let snapshot = snapshot::load_suggestions_snapshot(store, kind).await?;
    let blocked = active_participant_ids(store).await?;

    let users: Vec<User> = snapshot.users.into_iter().filter(|u| !blocked.contains(&u.id)).collect();
    let commutes: Vec<Commute> = snapshot.commutes.into_iter().filter(|c| !blocked.contains(&c.user_id)).collect();
    if users.len() < 2 {
        return Ok(Vec::new());
    }
    let commutes_by_user: HashMap<String, Commute> = commutes.iter().cloned().map(|c| (c.user_id.clone(), c)).collect();

    let candidates = selection::run_matching_algorithm(&users, &commutes, kind, weights);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let existing = store
        .find_matches(MatchFilter {
            source: Some(MatchSource::Suggested),
            kind: Some(kind),
            ..Default::default()
        })
        .await?;
    let open_existing: Vec<MatchDocument> = existing.into_iter().filter(|d| is_open_suggested(d, pass_cooldown_days)).collect();

    let mut existing_sets: HashSet<Vec<String>> = HashSet::new();
    let mut slot_counts: HashMap<String, i32> = HashMap::new();
    for document in &open_existing {
        let mut sorted = document.participants.clone();
        sorted.sort();
        existing_sets.insert(sorted);
        for participant in &document.participants {
            *slot_counts.entry(participant.clone()).or_insert(0) += 1;
        }
    }

    let mut created = Vec::new();
    for candidate in candidates {
        let mut sorted_participants = candidate.participants.clone();
        sorted_participants.sort();
        if existing_sets.contains(&sorted_participants) {
            continue;
        }
        let over_budget = candidate.participants.iter().any(|participant| {
            let budget = commutes_by_user
                .get(participant)
                .map(|c| slot_budget(kind, c))
                .unwrap_or(1);
            slot_counts.get(participant).copied().unwrap_or(0) >= budget
        });
        if over_budget {
            continue;
        }

        for participant in &candidate.participants {
            *slot_counts.entry(participant.clone()).or_insert(0) += 1;
        }
        let mut document = candidate_into_document(
            candidate,
            MatchSource::Suggested,
            MatchStatus::Suggested,
            &commutes_by_user,
            None,
        );
        store.insert_match(&mut document).await?;
        created.push(document);
    }

    Ok(created)
}

async fn promote_to_active(store: &dyn Store, document: &mut MatchDocument, commute_date: NaiveDate) -> anyhow::Result<()> {
    let now = Utc::now();
    for decision in document.decisions.iter_mut() {
        decision.accepted_at = Some(now);
        decision.passed_at = None;
        decision.pass_cooldown_until = None;
    }
    for participant in &document.participants {
        if document.decisions.iter().all(|d| &d.user_id != participant) {
            document.decisions.push(ParticipantDecision {
                user_id: participant.clone(),
                accepted_at: Some(now),
                passed_at: None,
                pass_cooldown_until: None,
            });
        }
    }

    if document.chat_room_id.is_none() {
        let mut room = ChatRoom::new(
            document.id.clone().unwrap_or_default(),
            document.participants.clone(),
        );
        store.insert_chat_room(&mut room).await?;
        document.chat_room_id = room.id;
    }

    document.source = MatchSource::QueueAssigned;
    document.status = MatchStatus::Active;
    document.commute_date = Some(commute_date);
    document.updated_at = now;
    store.save_match(document).await?;

    for participant in &document.participants {
        store.pause_commute(participant).await?;
    }
    Ok(())
}

/// Runs the queue-assignment phase for one kind and target `commute_date`.
/// Returns the newly created or promoted assignment documents.
pub async fn run_queue_assignments_for_kind(
    store: &dyn Store,
    kind: MatchKind,
    weights: &AlgorithmWeights,
    commute_date: NaiveDate,
) -> anyhow::Result<Vec<QueueEvent>> {
    let snapshot = snapshot::load_queue_snapshot(store, kind).await?;
    let commutes_by_user: HashMap<String, Commute> =
        snapshot.commutes.iter().cloned().map(|c| (c.user_id.clone(), c)).collect();
    let queued_users: HashSet<String> = snapshot.commutes.iter().map(|c| c.user_id.clone()).collect();

    let candidates = selection::run_matching_algorithm(&snapshot.users, &snapshot.commutes, kind, weights);

    let existing_queue = store
        .find_matches(MatchFilter {
            source: Some(MatchSource::QueueAssigned),
            commute_date: Some(commute_date),
            ..Default::default()
        })
        .await?;
    let mut existing_suggested: Vec<MatchDocument> = store
        .find_matches(MatchFilter {
            source: Some(MatchSource::Suggested),
            kind: Some(kind),
            status_in: Some(vec![MatchStatus::Suggested, MatchStatus::Active]),
            ..Default::default()
        })
        .await?;
    let existing_active_queue: Vec<MatchDocument> = existing_queue
        .iter()
        .filter(|d| d.kind == kind && d.status == MatchStatus::Active)
        .cloned()
        .collect();

    let mut consumed_users: HashSet<String> = HashSet::new();
    for document in existing_queue.iter().chain(existing_active_queue.iter()) {
        if matches!(document.status, MatchStatus::Suggested | MatchStatus::Assigned | MatchStatus::Active) {
            consumed_users.extend(document.participants.iter().cloned());
        }
    }

    let mut existing_queue_sets: HashSet<Vec<String>> = HashSet::new();
    for document in &existing_queue {
        if matches!(document.status, MatchStatus::Suggested | MatchStatus::Assigned | MatchStatus::Active) {
            let mut sorted = document.participants.clone();
            sorted.sort();
            existing_queue_sets.insert(sorted);
        }
    }

    let mut created = Vec::new();

    let mut promotable: Vec<MatchDocument> = existing_suggested
        .iter()
        .filter(|d| d.status == MatchStatus::Suggested)
        .filter(|d| d.participants.iter().all(|p| queued_users.contains(p)))
        .cloned()
        .collect();
    promotable.sort_by(|a, b| {
        b.scores
            .composite_score
            .partial_cmp(&a.scores.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for candidate in promotable {
        if candidate.participants.iter().any(|p| consumed_users.contains(p)) {
            continue;
        }
        let Some(id) = candidate.id.clone() else { continue };
        if let Some(document) = existing_suggested.iter_mut().find(|d| d.id.as_deref() == Some(id.as_str())) {
            promote_to_active(store, document, commute_date).await?;
            consumed_users.extend(document.participants.iter().cloned());
            created.push(QueueEvent { document: document.clone(), fresh: false });
        }
    }

    for candidate in candidates {
        let mut sorted_participants = candidate.participants.clone();
        sorted_participants.sort();

        if let Some(matching_suggestion) = existing_suggested.iter_mut().find(|d| {
            matches!(d.status, MatchStatus::Suggested | MatchStatus::Active) && {
                let mut sorted = d.participants.clone();
                sorted.sort();
                sorted == sorted_participants
            }
        }) {
            if matching_suggestion.status == MatchStatus::Suggested {
                promote_to_active(store, matching_suggestion, commute_date).await?;
                consumed_users.extend(matching_suggestion.participants.iter().cloned());
                created.push(QueueEvent { document: matching_suggestion.clone(), fresh: false });
            }
            continue;
        }

        if candidate.participants.iter().any(|p| consumed_users.contains(p)) {
            continue;
        }
        if existing_queue_sets.contains(&sorted_participants) {
            continue;
        }

        let mut document = candidate_into_document(
            candidate,
            MatchSource::QueueAssigned,
            MatchStatus::Assigned,
            &commutes_by_user,
            Some(commute_date),
        );
        store.insert_match(&mut document).await?;

        let mut room = ChatRoom::new(document.id.clone().unwrap_or_default(), document.participants.clone());
        store.insert_chat_room(&mut room).await?;
        document.chat_room_id = room.id;
        document.status = MatchStatus::Active;
        store.save_match(&document).await?;

        for participant in &document.participants {
            store.pause_commute(participant).await?;
            consumed_users.insert(participant.clone());
        }
        existing_queue_sets.insert(sorted_participants);
        created.push(QueueEvent { document, fresh: true });
    }

    Ok(created)
}

/// Runs a full matching cycle: suggestions for both kinds, then (if
/// `run_queue`) queue assignments for both kinds against tomorrow + the
/// configured lead time.
pub async fn run_matching_cycle(
    store: &dyn Store,
    weights: &AlgorithmWeights,
    run_queue: bool,
    pass_cooldown_days: i64,
    queue_assignment_days_ahead: i64,
) -> anyhow::Result<CycleOutcome> {
    let mut outcome = CycleOutcome::default();

    let individual_suggestions = run_suggestions_for_kind(store, MatchKind::Individual, weights, pass_cooldown_days).await?;
    let group_suggestions = run_suggestions_for_kind(store, MatchKind::Group, weights, pass_cooldown_days).await?;
    outcome.counts.suggestions_individual = individual_suggestions.len() as i32;
    outcome.counts.suggestions_group = group_suggestions.len() as i32;
    outcome.suggestions_created.extend(individual_suggestions);
    outcome.suggestions_created.extend(group_suggestions);

    if run_queue {
        let commute_date = (Utc::now() + Duration::days(queue_assignment_days_ahead)).date_naive();
        let individual_queue = run_queue_assignments_for_kind(store, MatchKind::Individual, weights, commute_date).await?;
        let group_queue = run_queue_assignments_for_kind(store, MatchKind::Group, weights, commute_date).await?;
        outcome.counts.assignments_individual = individual_queue.len() as i32;
        outcome.counts.assignments_group = group_queue.len() as i32;
        outcome.queue_events.extend(individual_queue);
        outcome.queue_events.extend(group_queue);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CommuteStatus, GenderPreference, GroupSizePreference, MatchPreference, TimeWindow, TransportMode,
    };
    use crate::store::FakeStore;

    fn weights() -> AlgorithmWeights {
        AlgorithmWeights {
            min_time_overlap_minutes: 10,
            min_overlap_distance_meters: 100.0,
            overlap_tolerance_meters: 50.0,
            overlap_weight: 0.7,
            interest_weight: 0.3,
            shared_meters_per_minute: 80.0,
        }
    }

    fn route(offset: f64) -> Vec<(f64, f64)> {
        vec![(37.0 + offset, -122.0), (37.01 + offset, -122.0), (37.02 + offset, -122.0)]
    }

    fn commute(user_id: &str, route_points: Vec<(f64, f64)>) -> Commute {
        Commute {
            id: format!("commute-{user_id}"),
            user_id: user_id.to_string(),
            start: NamedPoint { name: "Home".into(), lat: route_points[0].0, lng: route_points[0].1 },
            end: NamedPoint {
                name: "Work".into(),
                lat: route_points.last().unwrap().0,
                lng: route_points.last().unwrap().1,
            },
            time_window: TimeWindow { start_minute: 480, end_minute: 560 },
            transport_mode: TransportMode::Walk,
            match_preference: MatchPreference::Individual,
            group_size_pref: GroupSizePreference { min: 2, max: 2 },
            gender_preference: GenderPreference::Any,
            status: CommuteStatus::Queued,
            enable_queue_flow: true,
            enable_suggestions_flow: true,
            route_segments: vec![],
            route_coordinates: route_points,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn user(id: &str) -> User {
        User { id: id.to_string(), gender: "woman".into(), interests: vec!["hiking".into()] }
    }

    #[tokio::test]
    async fn suggestions_phase_creates_one_pair() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_user(user("b"));
        store.seed_commute(commute("a", route(0.0)));
        store.seed_commute(commute("b", route(0.0001)));

        let created = run_suggestions_for_kind(&store, MatchKind::Individual, &weights(), 7).await.unwrap();
        assert_eq!(created.len(), 1);
        let matches = store.all_matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].status, MatchStatus::Suggested);
        assert_eq!(matches[0].decisions.len(), 2, "one decision entry per participant, unaccepted");
        assert!(matches[0].decisions.iter().all(|d| d.accepted_at.is_none() && d.passed_at.is_none()));
    }

    #[tokio::test]
    async fn suggestions_phase_is_idempotent_on_rerun() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_user(user("b"));
        store.seed_commute(commute("a", route(0.0)));
        store.seed_commute(commute("b", route(0.0001)));

        run_suggestions_for_kind(&store, MatchKind::Individual, &weights(), 7).await.unwrap();
        let second = run_suggestions_for_kind(&store, MatchKind::Individual, &weights(), 7).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.all_matches().len(), 1);
    }

    #[tokio::test]
    async fn queue_promotion_activates_existing_suggestion() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_user(user("b"));
        let mut commute_a = commute("a", route(0.0));
        let mut commute_b = commute("b", route(0.0001));
        commute_a.enable_queue_flow = true;
        commute_b.enable_queue_flow = true;
        store.seed_commute(commute_a);
        store.seed_commute(commute_b);

        let now = Utc::now();
        let suggestion = MatchDocument {
            id: None,
            source: MatchSource::Suggested,
            kind: MatchKind::Individual,
            status: MatchStatus::Suggested,
            participants: vec!["a".into(), "b".into()],
            transport_mode: TransportMode::Walk,
            scores: MatchScores { overlap_score: 0.8, interest_score: 1.0, composite_score: 0.6 },
            compatibility_percent: 60,
            shared_segment_start: NamedPoint { name: "Shared route start".into(), lat: 0.0, lng: 0.0 },
            shared_segment_end: NamedPoint { name: "Shared route end".into(), lat: 0.0, lng: 0.0 },
            estimated_time_minutes: 5,
            decisions: vec![],
            chat_room_id: None,
            commute_date: None,
            created_at: now,
            updated_at: now,
        };
        store.seed_match(suggestion);

        let commute_date = (now + Duration::days(1)).date_naive();
        let created = run_queue_assignments_for_kind(&store, MatchKind::Individual, &weights(), commute_date)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert!(!created[0].fresh);

        let matches = store.all_matches();
        let promoted = matches.iter().find(|m| m.participants.contains(&"a".to_string())).unwrap();
        assert_eq!(promoted.status, MatchStatus::Active);
        assert_eq!(promoted.source, MatchSource::QueueAssigned);
        assert!(promoted.chat_room_id.is_some());
        assert_eq!(store.commute_for("a").unwrap().status, CommuteStatus::Paused);
        assert!(!store.commute_for("a").unwrap().enable_queue_flow);
    }

    #[test]
    fn name_point_falls_back_when_nothing_within_radius() {
        let anchors = vec![NamedPoint { name: "Home".into(), lat: 10.0, lng: 10.0 }];
        let named = name_point(&anchors, (0.0, 0.0), "Shared route start");
        assert_eq!(named.name, "Shared route start");
    }

    #[test]
    fn name_point_picks_nearest_anchor_within_radius() {
        let anchors = vec![
            NamedPoint { name: "Home".into(), lat: 37.0001, lng: -122.0 },
            NamedPoint { name: "Far".into(), lat: 40.0, lng: -122.0 },
        ];
        let named = name_point(&anchors, (37.0, -122.0), "Shared route start");
        assert_eq!(named.name, "Home");
    }
}
