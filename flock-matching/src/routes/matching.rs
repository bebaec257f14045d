use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use flock_shared::errors::{AppError, AppResult};
use flock_shared::types::api::ApiResponse;
use flock_shared::types::auth::AuthUser;

use crate::decisions::{self, DecisionError, DecisionOutcome};
use crate::events::publisher;
use crate::lifecycle::{self, CycleCounts};
use crate::models::{MatchDocument, MatchKind, MatchStatus};
use crate::AppState;

// --- POST /matching/run ---

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub run_queue: bool,
}

pub async fn run_cycle(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
) -> AppResult<Json<ApiResponse<CycleCounts>>> {
    let outcome = lifecycle::run_matching_cycle(
        &state.store,
        &state.config.algorithm.weights(),
        query.run_queue,
        state.config.service.pass_cooldown_days,
        state.config.service.queue_assignment_days_ahead,
    )
    .await
    .map_err(AppError::Internal)?;

    for document in &outcome.suggestions_created {
        if let Some(id) = &document.id {
            publisher::publish_suggestion_created(&state.rabbitmq, id, &document.participants, document.kind.as_str()).await;
        }
    }
    for event in &outcome.queue_events {
        let (Some(id), Some(chat_room_id)) = (&event.document.id, &event.document.chat_room_id) else {
            continue;
        };
        if event.fresh {
            publisher::publish_assignment_created(&state.rabbitmq, id, &event.document.participants, chat_room_id).await;
        } else if event.document.status == MatchStatus::Active {
            publisher::publish_match_activated(&state.rabbitmq, id, &event.document.participants, chat_room_id).await;
        }
    }

    tracing::info!(
        suggestions_individual = outcome.counts.suggestions_individual,
        suggestions_group = outcome.counts.suggestions_group,
        assignments_individual = outcome.counts.assignments_individual,
        assignments_group = outcome.counts.assignments_group,
        run_queue = query.run_queue,
        "matching cycle completed"
    );

    Ok(Json(ApiResponse::ok(outcome.counts)))
}

// --- GET /matching/suggestions ---

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    pub kind: MatchKind,
}

pub async fn list_suggestions(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<KindQuery>,
) -> AppResult<Json<ApiResponse<Vec<MatchDocument>>>> {
    let suggestions = decisions::list_suggestions_for_user(
        &state.store,
        &user.id,
        query.kind,
        state.config.service.pass_cooldown_days,
    )
    .await
    .map_err(AppError::Internal)?;

    Ok(Json(ApiResponse::ok(suggestions)))
}

// --- POST /matching/suggestions/:id/accept ---

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    #[serde(rename = "match")]
    pub document: MatchDocument,
    pub outcome: &'static str,
}

fn decision_error_response(err: DecisionError) -> AppError {
    match err {
        DecisionError::NotFound | DecisionError::NotASuggestion => AppError::not_found("suggestion not found"),
        // Same 404 status as a missing suggestion, distinct error code —
        // a caller who isn't a participant must not be able to tell a
        // missing match apart from one they're barred from.
        DecisionError::NotAParticipant => AppError::permission_denied("suggestion not found"),
    }
}

fn outcome_label(outcome: DecisionOutcome) -> &'static str {
    match outcome {
        DecisionOutcome::Accepted => "accepted",
        DecisionOutcome::Activated => "activated",
        DecisionOutcome::Passed => "passed",
        DecisionOutcome::Completed => "completed",
    }
}

pub async fn accept_suggestion(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<String>,
) -> AppResult<Json<ApiResponse<DecisionResponse>>> {
    let (document, outcome) = decisions::accept_suggestion(&state.store, &user.id, &suggestion_id)
        .await
        .map_err(AppError::Internal)?
        .map_err(decision_error_response)?;

    if outcome == DecisionOutcome::Activated {
        if let Some(chat_room_id) = &document.chat_room_id {
            publisher::publish_match_activated(&state.rabbitmq, &suggestion_id, &document.participants, chat_room_id).await;
        }
    }

    Ok(Json(ApiResponse::ok(DecisionResponse { document, outcome: outcome_label(outcome) })))
}

// --- POST /matching/suggestions/:id/pass ---

pub async fn pass_suggestion(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<String>,
) -> AppResult<Json<ApiResponse<DecisionResponse>>> {
    let (document, outcome) =
        decisions::pass_suggestion(&state.store, &user.id, &suggestion_id, state.config.service.pass_cooldown_days)
            .await
            .map_err(AppError::Internal)?
            .map_err(decision_error_response)?;

    if outcome == DecisionOutcome::Completed {
        publisher::publish_match_completed(&state.rabbitmq, &suggestion_id, &document.participants, "passed").await;
    }

    Ok(Json(ApiResponse::ok(DecisionResponse { document, outcome: outcome_label(outcome) })))
}

// --- GET /matching/active ---

#[derive(Debug, Deserialize)]
pub struct OptionalKindQuery {
    pub kind: Option<MatchKind>,
}

pub async fn list_active(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OptionalKindQuery>,
) -> AppResult<Json<ApiResponse<Vec<MatchDocument>>>> {
    let matches = decisions::list_active_for_user(&state.store, &user.id, query.kind)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ApiResponse::ok(matches)))
}

// --- GET /matching/assignments ---

#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    pub kind: Option<MatchKind>,
    pub date: Option<NaiveDate>,
}

/// Defaults an omitted `date` query param to today + `days_ahead`, the same
/// lead time the queue-assignment phase itself targets.
fn default_assignment_date(requested: Option<NaiveDate>, days_ahead: i64) -> NaiveDate {
    requested.unwrap_or_else(|| (chrono::Utc::now() + chrono::Duration::days(days_ahead)).date_naive())
}

pub async fn list_assignments(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssignmentsQuery>,
) -> AppResult<Json<ApiResponse<Vec<MatchDocument>>>> {
    let date = default_assignment_date(query.date, state.config.service.queue_assignment_days_ahead);
    let matches = decisions::list_assignments_for_user(&state.store, &user.id, query.kind, date)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(ApiResponse::ok(matches)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_date_defaults_to_configured_lead_time_when_omitted() {
        let expected = (chrono::Utc::now() + chrono::Duration::days(3)).date_naive();
        assert_eq!(default_assignment_date(None, 3), expected);
    }

    #[test]
    fn assignment_date_is_taken_verbatim_when_provided() {
        let requested = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(default_assignment_date(Some(requested), 3), requested);
    }
}
