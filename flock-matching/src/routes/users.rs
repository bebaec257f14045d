use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use validator::Validate;

use flock_shared::errors::{AppError, AppResult, ErrorCode};
use flock_shared::types::api::ApiResponse;
use flock_shared::types::auth::AuthUser;

use crate::models::User;
use crate::users::UserCreatePayload;
use crate::AppState;

pub async fn get_my_profile(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<User>>> {
    let profile = state
        .user_repo
        .find_by_id(&user.id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::not_found("user profile not found"))?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn create_or_replace_profile(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserCreatePayload>,
) -> AppResult<Json<ApiResponse<User>>> {
    payload.validate().map_err(|e| AppError::new(ErrorCode::InvalidInput, e.to_string()))?;
    let profile = state.user_repo.create_or_replace(&user.id, payload).await.map_err(AppError::Internal)?;
    Ok(Json(ApiResponse::ok(profile)))
}

pub async fn delete_my_profile(user: AuthUser, State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<()>>> {
    let deleted = state.user_repo.delete(&user.id).await.map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::not_found("user profile not found"));
    }
    Ok(Json(ApiResponse::ok(())))
}
