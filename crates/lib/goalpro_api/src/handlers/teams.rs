//! Team and roster handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use goalpro_core::auth::gate::Operation;
use goalpro_core::models::auth::Role;
use goalpro_core::models::user::{NewTeam, TeamUpdate};
use goalpro_core::store::with_timeout;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CreateTeamRequest, TeamDetailResponse, TeamListResponse, TeamResponse, UpdateTeamRequest,
    UserResponse,
};
use crate::services::users::validate_name;

/// Only existing users holding the `COACH` role may lead a team.
async fn ensure_coach(state: &AppState, username: &str) -> AppResult<()> {
    let profile = with_timeout(state.config.store_timeout, state.directory.get_profile(username))
        .await?;
    match profile {
        Some(p) if p.role == Role::Coach => Ok(()),
        Some(_) => Err(AppError::Validation(format!("'{username}' is not a coach"))),
        None => Err(AppError::Validation(format!("unknown coach '{username}'"))),
    }
}

/// `GET /teams` — every team. Any signed-in user.
pub async fn list_teams_handler(
    State(state): State<AppState>,
    axum::Extension(_user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<TeamListResponse>> {
    let teams = with_timeout(state.config.store_timeout, state.directory.list_teams()).await?;
    Ok(Json(TeamListResponse {
        teams: teams.into_iter().map(TeamResponse::from).collect(),
    }))
}

/// `POST /teams` — create a team. Admins only.
pub async fn create_team_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CreateTeamRequest>,
) -> AppResult<(StatusCode, Json<TeamResponse>)> {
    user.require(Operation::ManageTeams)?;
    validate_name("Team name", &body.name)?;

    if let Some(coach) = &body.coach_username {
        ensure_coach(&state, coach).await?;
    }

    let team = with_timeout(
        state.config.store_timeout,
        state.directory.create_team(&NewTeam {
            name: body.name.trim().to_string(),
            description: body.description,
            coach_username: body.coach_username,
        }),
    )
    .await?;
    info!(team_id = team.id, name = %team.name, by = %user.username(), "team created");
    Ok((StatusCode::CREATED, Json(team.into())))
}

/// `GET /teams/{id}` — a team with its coach and players. Any signed-in user.
pub async fn get_team_handler(
    State(state): State<AppState>,
    axum::Extension(_user): axum::Extension<AuthenticatedUser>,
    Path(team_id): Path<i64>,
) -> AppResult<Json<TeamDetailResponse>> {
    let detail = with_timeout(state.config.store_timeout, state.directory.get_team(team_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("team {team_id}")))?;
    Ok(Json(detail.into()))
}

/// `PUT /teams/{id}` — rename or re-describe a team. Admins only.
pub async fn update_team_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(team_id): Path<i64>,
    Json(body): Json<UpdateTeamRequest>,
) -> AppResult<Json<TeamResponse>> {
    user.require(Operation::ManageTeams)?;
    if let Some(name) = &body.name {
        validate_name("Team name", name)?;
    }
    let update = TeamUpdate {
        name: body.name.map(|n| n.trim().to_string()),
        description: body.description,
    };
    let team = with_timeout(
        state.config.store_timeout,
        state.directory.update_team(team_id, &update),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("team {team_id}")))?;
    info!(team_id, by = %user.username(), "team updated");
    Ok(Json(team.into()))
}

/// `PUT /teams/{id}/coach/{username}` — replace a team's coach. Admins only.
pub async fn switch_coach_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((team_id, username)): Path<(i64, String)>,
) -> AppResult<Json<TeamResponse>> {
    user.require(Operation::ManageTeams)?;
    ensure_coach(&state, &username).await?;
    let team = with_timeout(
        state.config.store_timeout,
        state.directory.switch_coach(team_id, &username),
    )
    .await?;
    info!(team_id, coach = %username, by = %user.username(), "team coach switched");
    Ok(Json(team.into()))
}

/// `PUT /teams/{id}/players/{username}` — add a player to a roster.
/// A plain user becomes a player. Coaches and admins.
pub async fn add_player_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((team_id, username)): Path<(i64, String)>,
) -> AppResult<Json<UserResponse>> {
    user.require(Operation::MutateRoster)?;
    let profile = with_timeout(
        state.config.store_timeout,
        state.directory.assign_player(team_id, &username),
    )
    .await?;
    info!(team_id, username = %username, by = %user.username(), "player added to roster");
    Ok(Json(profile.into()))
}

/// `DELETE /teams/{id}/players/{username}` — remove a player from a roster.
/// Coaches and admins.
pub async fn remove_player_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path((team_id, username)): Path<(i64, String)>,
) -> AppResult<Json<UserResponse>> {
    user.require(Operation::MutateRoster)?;
    let profile = with_timeout(
        state.config.store_timeout,
        state.directory.remove_player(team_id, &username),
    )
    .await?;
    info!(team_id, username = %username, by = %user.username(), "player removed from roster");
    Ok(Json(profile.into()))
}
