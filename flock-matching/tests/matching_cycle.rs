//! Black-box run of a full matching cycle against `FakeStore`, mirroring the
//! end-to-end scenarios in the original service's test suite: a suggestions
//! phase that pairs compatible commuters, a queue phase that promotes an
//! accepted suggestion to an active assignment, and a fresh queue assignment
//! for commuters who never went through the suggestions phase.

use chrono::{Duration, Utc};

use flock_matching::decisions;
use flock_matching::lifecycle::run_matching_cycle;
use flock_matching::models::{
    Commute, CommuteStatus, GenderPreference, GroupSizePreference, MatchKind, MatchPreference, MatchSource,
    MatchStatus, NamedPoint, TimeWindow, TransportMode, User,
};
use flock_matching::scoring::AlgorithmWeights;
use flock_matching::store::FakeStore;

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

fn route(base_lat: f64, base_lng: f64, offset: f64) -> Vec<(f64, f64)> {
    vec![
        (base_lat + offset, base_lng + offset),
        (base_lat + 0.0010 + offset, base_lng + 0.0012 + offset),
        (base_lat + 0.0020 + offset, base_lng + 0.0021 + offset),
        (base_lat + 0.0030 + offset, base_lng + 0.0030 + offset),
    ]
}

fn user(id: &str, gender: &str, interests: &[&str]) -> User {
    User { id: id.to_string(), gender: gender.to_string(), interests: interests.iter().map(|s| s.to_string()).collect() }
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
        time_window: TimeWindow { start_minute: 8 * 60, end_minute: 9 * 60 },
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

#[tokio::test]
async fn suggestions_then_acceptance_flows_through_to_active_queue_assignment() {
    let store = FakeStore::new();
    store.seed_user(user("alice", "women", &["coffee", "music", "hiking"]));
    store.seed_user(user("bea", "women", &["coffee", "movies", "reading"]));
    store.seed_commute(commute("alice", route(37.7749, -122.4194, 0.0)));
    store.seed_commute(commute("bea", route(37.7749, -122.4194, 0.00003)));

    // First cycle: suggestions phase only, no queue run yet.
    let first = run_matching_cycle(&store, &weights(), false, 7, 1).await.unwrap();
    assert_eq!(first.counts.suggestions_individual, 1);
    assert_eq!(first.counts.assignments_individual, 0);
    assert_eq!(first.suggestions_created.len(), 1);

    let suggestion_id = first.suggestions_created[0].id.clone().unwrap();

    // Both parties accept the suggestion before the next cycle runs.
    let (_, outcome_a) = decisions::accept_suggestion(&store, "alice", &suggestion_id).await.unwrap().unwrap();
    assert_eq!(outcome_a, decisions::DecisionOutcome::Accepted);
    let (document, outcome_b) = decisions::accept_suggestion(&store, "bea", &suggestion_id).await.unwrap().unwrap();
    assert_eq!(outcome_b, decisions::DecisionOutcome::Activated);
    assert_eq!(document.status, MatchStatus::Active);
    assert!(document.chat_room_id.is_some());

    // Second cycle with the queue phase enabled promotes the now-active
    // suggestion into a dated queue assignment instead of minting a new pair.
    let second = run_matching_cycle(&store, &weights(), true, 7, 1).await.unwrap();
    assert_eq!(second.counts.suggestions_individual, 0, "no fresh pair once both are already matched");
    assert_eq!(second.counts.assignments_individual, 1);
    assert_eq!(second.queue_events.len(), 1);
    assert!(!second.queue_events[0].fresh, "promotion of an existing suggestion, not a brand new assignment");

    let promoted = &second.queue_events[0].document;
    assert_eq!(promoted.source, MatchSource::QueueAssigned);
    assert_eq!(promoted.status, MatchStatus::Active);
    assert_eq!(promoted.participants.len(), 2);

    assert_eq!(store.commute_for("alice").unwrap().status, CommuteStatus::Paused);
    assert_eq!(store.commute_for("bea").unwrap().status, CommuteStatus::Paused);
}

#[tokio::test]
async fn queue_phase_creates_a_fresh_assignment_when_no_suggestion_exists() {
    let store = FakeStore::new();
    store.seed_user(user("cleo", "men", &["running", "podcasts"]));
    store.seed_user(user("drew", "men", &["running", "chess"]));
    let mut cleo_commute = commute("cleo", route(37.7650, -122.4300, 0.0));
    let mut drew_commute = commute("drew", route(37.7650, -122.4300, 0.00003));
    cleo_commute.enable_suggestions_flow = false;
    drew_commute.enable_suggestions_flow = false;
    store.seed_commute(cleo_commute);
    store.seed_commute(drew_commute);

    let outcome = run_matching_cycle(&store, &weights(), true, 7, 1).await.unwrap();
    assert_eq!(outcome.counts.suggestions_individual, 0, "suggestions flow disabled for both participants");
    assert_eq!(outcome.counts.assignments_individual, 1);
    assert_eq!(outcome.queue_events.len(), 1);
    assert!(outcome.queue_events[0].fresh);

    let assigned = &outcome.queue_events[0].document;
    assert_eq!(assigned.status, MatchStatus::Active);
    assert_eq!(assigned.source, MatchSource::QueueAssigned);
    let expected_date = (Utc::now() + Duration::days(1)).date_naive();
    assert_eq!(assigned.commute_date, Some(expected_date));

    let assignments = decisions::list_assignments_for_user(&store, "cleo", Some(MatchKind::Individual), expected_date)
        .await
        .unwrap();
    assert_eq!(assignments.len(), 1);
}

#[tokio::test]
async fn incompatible_time_windows_never_match() {
    let store = FakeStore::new();
    store.seed_user(user("finn", "men", &["coffee"]));
    store.seed_user(user("gus", "men", &["coffee"]));
    let mut early = commute("finn", route(37.7749, -122.4194, 0.0));
    early.time_window = TimeWindow { start_minute: 8 * 60, end_minute: 8 * 60 + 20 };
    let mut late = commute("gus", route(37.7749, -122.4194, 0.0));
    late.time_window = TimeWindow { start_minute: 9 * 60, end_minute: 9 * 60 + 20 };
    store.seed_commute(early);
    store.seed_commute(late);

    let outcome = run_matching_cycle(&store, &weights(), false, 7, 1).await.unwrap();
    assert_eq!(outcome.counts.suggestions_individual, 0);
    assert!(outcome.suggestions_created.is_empty());
}

#[tokio::test]
async fn passed_suggestion_disappears_until_cooldown_lapses() {
    let store = FakeStore::new();
    store.seed_user(user("hana", "women", &["yoga"]));
    store.seed_user(user("ivy", "women", &["yoga"]));
    store.seed_commute(commute("hana", route(37.7600, -122.4450, 0.0)));
    store.seed_commute(commute("ivy", route(37.7600, -122.4450, 0.00003)));

    let outcome = run_matching_cycle(&store, &weights(), false, 7, 1).await.unwrap();
    let suggestion_id = outcome.suggestions_created[0].id.clone().unwrap();

    let (_, decision_outcome) = decisions::pass_suggestion(&store, "hana", &suggestion_id, 7).await.unwrap().unwrap();
    assert_eq!(decision_outcome, decisions::DecisionOutcome::Passed);

    let visible_to_hana = decisions::list_suggestions_for_user(&store, "hana", MatchKind::Individual, 7).await.unwrap();
    assert!(visible_to_hana.is_empty());

    // Re-running the suggestions phase must not mint a duplicate pair while
    // the cooldown window is still open.
    let rerun = run_matching_cycle(&store, &weights(), false, 7, 1).await.unwrap();
    assert!(rerun.suggestions_created.is_empty());
}
