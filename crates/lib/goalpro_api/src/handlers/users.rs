//! User listing and profile handlers.

use axum::Json;
use axum::extract::{Path, State};
use goalpro_core::auth::gate::Operation;
use goalpro_core::models::auth::Role;
use goalpro_core::store::with_timeout;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{UpdateProfileRequest, UserListResponse, UserResponse};
use crate::services::users;

/// `GET /users` — every user. Admins only.
pub async fn list_users_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<UserListResponse>> {
    user.require(Operation::ListAllUsers)?;
    let profiles = with_timeout(state.config.store_timeout, state.directory.list_users()).await?;
    Ok(Json(profiles.into()))
}

/// `GET /users/players` — every player. Any signed-in user.
pub async fn list_players_handler(
    State(state): State<AppState>,
    axum::Extension(_user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<UserListResponse>> {
    let profiles = with_timeout(
        state.config.store_timeout,
        state.directory.list_by_role(Role::Player),
    )
    .await?;
    Ok(Json(profiles.into()))
}

/// `GET /users/role/{role}` — users holding `role`. Coaches and admins.
pub async fn list_by_role_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(role): Path<String>,
) -> AppResult<Json<UserListResponse>> {
    user.require(Operation::ListUsersByRole)?;
    let role: Role = role
        .parse()
        .map_err(|e: goalpro_core::models::auth::UnknownRole| AppError::Validation(e.to_string()))?;
    let profiles =
        with_timeout(state.config.store_timeout, state.directory.list_by_role(role)).await?;
    Ok(Json(profiles.into()))
}

/// `GET /users/{username}` — one profile. The owner or an admin.
pub async fn get_profile_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(username): Path<String>,
) -> AppResult<Json<UserResponse>> {
    user.require(Operation::ViewProfile(&username))?;
    let profile = with_timeout(
        state.config.store_timeout,
        state.directory.get_profile(&username),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {username}")))?;
    Ok(Json(profile.into()))
}

/// `PUT /users/{username}` — edit a profile. The owner or an admin.
pub async fn update_profile_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(username): Path<String>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    user.require(Operation::EditProfile(&username))?;
    let profile = users::update_profile(&state, &username, body).await?;
    Ok(Json(profile.into()))
}
