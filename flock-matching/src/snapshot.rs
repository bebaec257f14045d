//! Commute/profile snapshot loading (§4.4): joins commutes to profiles by
//! owner identifier under the flow filters each phase needs, discarding any
//! commute without a matching profile.

use crate::models::{Commute, MatchKind, User};
use crate::store::{CommuteFilter, Store};

/// A joined, flow-filtered snapshot ready to feed §4.3 selection.
pub struct Snapshot {
    pub users: Vec<User>,
    pub commutes: Vec<Commute>,
}

impl Snapshot {
    fn from_pairs(pairs: Vec<(Commute, User)>) -> Self {
        let (commutes, users) = pairs.into_iter().unzip();
        Self { users, commutes }
    }
}

/// `enable_suggestions_flow = true` and `match_preference ∈ {kind, both}`.
pub async fn load_suggestions_snapshot(store: &dyn Store, kind: MatchKind) -> anyhow::Result<Snapshot> {
    let pairs = store
        .find_commutes(CommuteFilter {
            status_queued: false,
            enable_suggestions_flow: Some(true),
            enable_queue_flow: None,
            kind,
        })
        .await?;
    Ok(Snapshot::from_pairs(pairs))
}

/// `status == queued`, `enable_queue_flow = true`, `match_preference ∈ {kind, both}`.
pub async fn load_queue_snapshot(store: &dyn Store, kind: MatchKind) -> anyhow::Result<Snapshot> {
    let pairs = store
        .find_commutes(CommuteFilter {
            status_queued: true,
            enable_suggestions_flow: None,
            enable_queue_flow: Some(true),
            kind,
        })
        .await?;
    Ok(Snapshot::from_pairs(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CommuteStatus, GenderPreference, GroupSizePreference, MatchPreference, NamedPoint, TimeWindow, TransportMode,
    };
    use crate::store::FakeStore;

    fn commute(user_id: &str, preference: MatchPreference, status: CommuteStatus, suggestions: bool, queue: bool) -> Commute {
        Commute {
            id: format!("commute-{user_id}"),
            user_id: user_id.to_string(),
            start: NamedPoint { name: "Home".into(), lat: 0.0, lng: 0.0 },
            end: NamedPoint { name: "Work".into(), lat: 0.01, lng: 0.01 },
            time_window: TimeWindow { start_minute: 480, end_minute: 540 },
            transport_mode: TransportMode::Walk,
            match_preference: preference,
            group_size_pref: GroupSizePreference { min: 2, max: 2 },
            gender_preference: GenderPreference::Any,
            status,
            enable_queue_flow: queue,
            enable_suggestions_flow: suggestions,
            route_segments: vec![],
            route_coordinates: vec![(0.0, 0.0), (0.01, 0.01)],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn user(id: &str) -> User {
        User { id: id.to_string(), gender: "woman".into(), interests: vec![] }
    }

    #[tokio::test]
    async fn suggestions_snapshot_excludes_disabled_flow() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_user(user("b"));
        store.seed_commute(commute("a", MatchPreference::Individual, CommuteStatus::Queued, true, true));
        store.seed_commute(commute("b", MatchPreference::Individual, CommuteStatus::Queued, false, true));

        let snapshot = load_suggestions_snapshot(&store, MatchKind::Individual).await.unwrap();
        assert_eq!(snapshot.commutes.len(), 1);
        assert_eq!(snapshot.commutes[0].user_id, "a");
    }

    #[tokio::test]
    async fn queue_snapshot_requires_queued_status_and_flag() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_user(user("b"));
        store.seed_commute(commute("a", MatchPreference::Individual, CommuteStatus::Queued, true, true));
        store.seed_commute(commute("b", MatchPreference::Individual, CommuteStatus::Paused, true, true));

        let snapshot = load_queue_snapshot(&store, MatchKind::Individual).await.unwrap();
        assert_eq!(snapshot.commutes.len(), 1);
        assert_eq!(snapshot.commutes[0].user_id, "a");
    }

    #[tokio::test]
    async fn both_preference_included_in_either_kind_snapshot() {
        let store = FakeStore::new();
        store.seed_user(user("a"));
        store.seed_commute(commute("a", MatchPreference::Both, CommuteStatus::Queued, true, true));

        let individual = load_suggestions_snapshot(&store, MatchKind::Individual).await.unwrap();
        let group = load_suggestions_snapshot(&store, MatchKind::Group).await.unwrap();
        assert_eq!(individual.commutes.len(), 1);
        assert_eq!(group.commutes.len(), 1);
    }

    #[tokio::test]
    async fn commute_without_matching_profile_is_discarded() {
        let store = FakeStore::new();
        store.seed_commute(commute("orphan", MatchPreference::Individual, CommuteStatus::Queued, true, true));

        let snapshot = load_suggestions_snapshot(&store, MatchKind::Individual).await.unwrap();
        assert!(snapshot.commutes.is_empty());
    }
}
