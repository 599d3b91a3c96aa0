//! Request and response bodies. All JSON field names are camelCase.

use chrono::NaiveDate;
use goalpro_core::models::auth::Role;
use goalpro_core::models::user::{Team, TeamDetail, UserProfile};
use serde::{Deserialize, Serialize};

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login result. The token itself travels only in the `token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserResponse,
    pub expires_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub description: Option<String>,
    pub role: Role,
    /// Coached team, else the team played for.
    pub team_id: Option<i64>,
}

impl From<UserProfile> for UserResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            full_name: p.full_name(),
            team_id: p.current_team_id(),
            username: p.username,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            birth_date: p.birth_date,
            description: p.description,
            role: p.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}

impl From<Vec<UserProfile>> for UserListResponse {
    fn from(profiles: Vec<UserProfile>) -> Self {
        Self {
            users: profiles.into_iter().map(UserResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub coach_username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub coach_username: Option<String>,
}

impl From<Team> for TeamResponse {
    fn from(t: Team) -> Self {
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            coach_username: t.coach_username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamListResponse {
    pub teams: Vec<TeamResponse>,
}

/// Partial team edit. Omitted fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A team with its coach and roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetailResponse {
    #[serde(flatten)]
    pub team: TeamResponse,
    pub coach: Option<UserResponse>,
    pub players: Vec<UserResponse>,
}

impl From<TeamDetail> for TeamDetailResponse {
    fn from(d: TeamDetail) -> Self {
        Self {
            team: d.team.into(),
            coach: d.coach.map(UserResponse::from),
            players: d.players.into_iter().map(UserResponse::from).collect(),
        }
    }
}
