use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use flock_shared::errors::{AppError, AppResult, ErrorCode};
use flock_shared::types::api::ApiResponse;
use flock_shared::types::auth::AuthUser;

use crate::commutes::{self, CommuteCreatePayload, CommuteUpdatePayload};
use crate::models::Commute;
use crate::routing::RoutingError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ToggleFlowPayload {
    pub enabled: bool,
}

fn routing_error_into_app_error(err: RoutingError) -> AppError {
    match err {
        RoutingError::Timeout => AppError::upstream_timeout("routing planner timed out"),
        RoutingError::Unreachable(detail) => AppError::upstream_timeout(format!("routing planner unreachable: {detail}")),
        RoutingError::MalformedResponse(detail) => AppError::route_generation_failure(format!("malformed planner response: {detail}")),
        RoutingError::NoUsableGeometry => AppError::route_generation_failure("planner returned no usable route geometry"),
    }
}

pub async fn get_my_commute(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Commute>>> {
    let commute = commutes::get_my_commute(&state.commute_repo, &user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("commute not found"))?;
    Ok(Json(ApiResponse::ok(commute)))
}

pub async fn create_or_replace_commute(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommuteCreatePayload>,
) -> AppResult<Json<ApiResponse<Commute>>> {
    payload.validate().map_err(|e| AppError::new(ErrorCode::InvalidInput, e.to_string()))?;

    let commute = commutes::create_or_replace_commute(&state.commute_repo, &state.planner, &user.id, payload)
        .await
        .map_err(AppError::Internal)?
        .map_err(routing_error_into_app_error)?;

    Ok(Json(ApiResponse::ok(commute)))
}

pub async fn patch_my_commute(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommuteUpdatePayload>,
) -> AppResult<Json<ApiResponse<Commute>>> {
    payload.validate().map_err(|e| AppError::new(ErrorCode::InvalidInput, e.to_string()))?;

    let commute = commutes::patch_my_commute(&state.commute_repo, &state.planner, &user.id, payload)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("commute not found"))?
        .map_err(routing_error_into_app_error)?;

    Ok(Json(ApiResponse::ok(commute)))
}

pub async fn set_queue_flow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ToggleFlowPayload>,
) -> AppResult<Json<ApiResponse<Commute>>> {
    let commute = commutes::set_queue_enabled(&state.commute_repo, &user.id, payload.enabled)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("commute not found"))?;
    Ok(Json(ApiResponse::ok(commute)))
}

pub async fn set_suggestions_flow(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ToggleFlowPayload>,
) -> AppResult<Json<ApiResponse<Commute>>> {
    let commute = commutes::set_suggestions_enabled(&state.commute_repo, &user.id, payload.enabled)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("commute not found"))?;
    Ok(Json(ApiResponse::ok(commute)))
}

pub async fn pause_matching(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Commute>>> {
    let commute = commutes::pause_matching(&state.commute_repo, &user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("commute not found"))?;
    Ok(Json(ApiResponse::ok(commute)))
}
