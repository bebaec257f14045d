//! Accept/pass/visibility operations on suggestion documents (§4.6). Each
//! operation loads the document, mutates it, and writes it back in one
//! unit — last-writer-wins is acceptable because decisions are idempotent
//! and monotone per participant (§5).

use chrono::{Duration, Utc};

use crate::models::{ChatRoom, MatchDocument, MatchKind, MatchSource, MatchStatus, ParticipantDecision};
use crate::store::{MatchFilter, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Accepted,
    Activated,
    Passed,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("match not found")]
    NotFound,
    #[error("match is not a suggestion")]
    NotASuggestion,
    #[error("user is not a participant in this match")]
    NotAParticipant,
}

fn decision_mut<'a>(document: &'a mut MatchDocument, user_id: &str) -> &'a mut ParticipantDecision {
    if document.decision_for(user_id).is_none() {
        document.decisions.push(ParticipantDecision::new(user_id.to_string()));
    }
    document.decision_for_mut(user_id).expect("just inserted")
}

fn check_preconditions(document: &MatchDocument, user_id: &str) -> Result<(), DecisionError> {
    if document.source != MatchSource::Suggested {
        return Err(DecisionError::NotASuggestion);
    }
    if !document.participants.iter().any(|p| p == user_id) {
        return Err(DecisionError::NotAParticipant);
    }
    Ok(())
}

/// Accept(user, suggestion_id): §4.6.
pub async fn accept_suggestion(
    store: &dyn Store,
    user_id: &str,
    suggestion_id: &str,
) -> anyhow::Result<Result<(MatchDocument, DecisionOutcome), DecisionError>> {
    let Some(mut document) = store.get_match(suggestion_id).await? else {
        return Ok(Err(DecisionError::NotFound));
    };
    if let Err(e) = check_preconditions(&document, user_id) {
        return Ok(Err(e));
    }
    if document.status != MatchStatus::Suggested {
        return Ok(Ok((document, DecisionOutcome::Accepted)));
    }

    let now = Utc::now();
    {
        let decision = decision_mut(&mut document, user_id);
        decision.accepted_at = Some(now);
        decision.passed_at = None;
        decision.pass_cooldown_until = None;
    }

    let everyone_accepted = document
        .participants
        .iter()
        .all(|p| document.decision_for(p).and_then(|d| d.accepted_at).is_some());

    let outcome = if everyone_accepted {
        if document.chat_room_id.is_none() {
            let mut room = ChatRoom::new(document.id.clone().unwrap_or_default(), document.participants.clone());
            store.insert_chat_room(&mut room).await?;
            document.chat_room_id = room.id;
        }
        document.status = MatchStatus::Active;
        DecisionOutcome::Activated
    } else {
        DecisionOutcome::Accepted
    };

    document.updated_at = now;
    store.save_match(&document).await?;
    Ok(Ok((document, outcome)))
}

/// Pass(user, suggestion_id): §4.6.
pub async fn pass_suggestion(
    store: &dyn Store,
    user_id: &str,
    suggestion_id: &str,
    pass_cooldown_days: i64,
) -> anyhow::Result<Result<(MatchDocument, DecisionOutcome), DecisionError>> {
    let Some(mut document) = store.get_match(suggestion_id).await? else {
        return Ok(Err(DecisionError::NotFound));
    };
    if let Err(e) = check_preconditions(&document, user_id) {
        return Ok(Err(e));
    }
    if document.status != MatchStatus::Suggested {
        return Ok(Ok((document, DecisionOutcome::Passed)));
    }

    let now = Utc::now();
    let outcome;
    {
        let decision = decision_mut(&mut document, user_id);
        decision.passed_at = Some(now);
        decision.accepted_at = None;
        if pass_cooldown_days > 0 {
            decision.pass_cooldown_until = Some(now + Duration::days(pass_cooldown_days));
            outcome = DecisionOutcome::Passed;
        } else {
            decision.pass_cooldown_until = Some(now);
            outcome = DecisionOutcome::Completed;
        }
    }
    if outcome == DecisionOutcome::Completed {
        document.status = MatchStatus::Completed;
    }

    document.updated_at = now;
    store.save_match(&document).await?;
    Ok(Ok((document, outcome)))
}

/// Visibility rule for `list suggestions for user, kind` (§4.6): among
/// source=suggested, kind=kind, status=suggested matches where the user is
/// a participant, include iff the user hasn't accepted, their cooldown (if
/// any) has lapsed, and — when cooldown is disabled outright — they haven't
/// passed at all.
pub async fn list_suggestions_for_user(
    store: &dyn Store,
    user_id: &str,
    kind: MatchKind,
    pass_cooldown_days: i64,
) -> anyhow::Result<Vec<MatchDocument>> {
    let candidates = store
        .find_matches(MatchFilter {
            source: Some(MatchSource::Suggested),
            kind: Some(kind),
            status_in: Some(vec![MatchStatus::Suggested]),
            ..Default::default()
        })
        .await?;

    let now = Utc::now();
    Ok(candidates
        .into_iter()
        .filter(|document| document.participants.iter().any(|p| p == user_id))
        .filter(|document| {
            let Some(decision) = document.decision_for(user_id) else {
                return true;
            };
            if decision.accepted_at.is_some() {
                return false;
            }
            if let Some(until) = decision.pass_cooldown_until {
                if until > now {
                    return false;
                }
            }
            if pass_cooldown_days <= 0 && decision.passed_at.is_some() {
                return false;
            }
            true
        })
        .collect())
}

/// Matches currently active for a user, optionally narrowed by kind.
pub async fn list_active_for_user(store: &dyn Store, user_id: &str, kind: Option<MatchKind>) -> anyhow::Result<Vec<MatchDocument>> {
    let matches = store
        .find_matches(MatchFilter {
            kind,
            status_in: Some(vec![MatchStatus::Active]),
            ..Default::default()
        })
        .await?;
    Ok(matches
        .into_iter()
        .filter(|document| document.participants.iter().any(|p| p == user_id))
        .collect())
}

/// Queue assignments for a user on a given commute date, optionally
/// narrowed by kind.
pub async fn list_assignments_for_user(
    store: &dyn Store,
    user_id: &str,
    kind: Option<MatchKind>,
    commute_date: chrono::NaiveDate,
) -> anyhow::Result<Vec<MatchDocument>> {
    let matches = store
        .find_matches(MatchFilter {
            source: Some(MatchSource::QueueAssigned),
            kind,
            commute_date: Some(commute_date),
            ..Default::default()
        })
        .await?;
    Ok(matches
        .into_iter()
        .filter(|document| document.participants.iter().any(|p| p == user_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchScores, NamedPoint, TransportMode};
    use crate::store::FakeStore;

    fn suggestion(participants: Vec<&str>) -> MatchDocument {
        let now = Utc::now();
        MatchDocument {
            id: None,
            source: MatchSource::Suggested,
            kind: MatchKind::Individual,
            status: MatchStatus::Suggested,
            participants: participants.into_iter().map(String::from).collect(),
            transport_mode: TransportMode::Walk,
            scores: MatchScores { overlap_score: 0.5, interest_score: 0.5, composite_score: 0.5 },
            compatibility_percent: 50,
            shared_segment_start: NamedPoint { name: "Shared route start".into(), lat: 0.0, lng: 0.0 },
            shared_segment_end: NamedPoint { name: "Shared route end".into(), lat: 0.0, lng: 0.0 },
            estimated_time_minutes: 5,
            decisions: vec![],
            chat_room_id: None,
            commute_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn accept_by_one_party_does_not_activate() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));

        let result = accept_suggestion(&store, "a", &id).await.unwrap().unwrap();
        assert_eq!(result.1, DecisionOutcome::Accepted);
        assert_eq!(result.0.status, MatchStatus::Suggested);
    }

    #[tokio::test]
    async fn accept_by_all_parties_activates_and_creates_chat_room() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));

        accept_suggestion(&store, "a", &id).await.unwrap().unwrap();
        let (document, outcome) = accept_suggestion(&store, "b", &id).await.unwrap().unwrap();
        assert_eq!(outcome, DecisionOutcome::Activated);
        assert_eq!(document.status, MatchStatus::Active);
        assert!(document.chat_room_id.is_some());
    }

    #[tokio::test]
    async fn pass_with_cooldown_keeps_suggestion_open_but_hides_it() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));

        let (document, outcome) = pass_suggestion(&store, "a", &id, 7).await.unwrap().unwrap();
        assert_eq!(outcome, DecisionOutcome::Passed);
        assert_eq!(document.status, MatchStatus::Suggested);

        let visible = list_suggestions_for_user(&store, "a", MatchKind::Individual, 7).await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn pass_with_cooldown_disabled_completes_the_match() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));

        let (document, outcome) = pass_suggestion(&store, "a", &id, 0).await.unwrap().unwrap();
        assert_eq!(outcome, DecisionOutcome::Completed);
        assert_eq!(document.status, MatchStatus::Completed);
    }

    #[tokio::test]
    async fn reject_accept_for_non_participant() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));

        let result = accept_suggestion(&store, "c", &id).await.unwrap();
        assert!(matches!(result, Err(DecisionError::NotAParticipant)));
    }

    #[tokio::test]
    async fn list_suggestions_excludes_accepted() {
        let store = FakeStore::new();
        let id = store.seed_match(suggestion(vec!["a", "b"]));
        accept_suggestion(&store, "a", &id).await.unwrap().unwrap();

        let visible = list_suggestions_for_user(&store, "a", MatchKind::Individual, 7).await.unwrap();
        assert!(visible.is_empty());
        let still_visible_to_b = list_suggestions_for_user(&store, "b", MatchKind::Individual, 7).await.unwrap();
        assert_eq!(still_visible_to_b.len(), 1);
    }
}
