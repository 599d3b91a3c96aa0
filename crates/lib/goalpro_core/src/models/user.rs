//! User profile and team models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::auth::Role;

/// Public profile of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub birth_date: NaiveDate,
    pub description: Option<String>,
    pub role: Role,
    /// Team the user plays for.
    pub team_id: Option<i64>,
    /// Team the user coaches. A coach has at most one.
    pub coach_team_id: Option<i64>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The coached team if any, else the team played for.
    pub fn current_team_id(&self) -> Option<i64> {
        self.coach_team_id.or(self.team_id)
    }
}

/// A user about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub description: Option<String>,
    pub role: Role,
}

/// Partial profile update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
}

/// Team record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub coach_username: Option<String>,
}

/// A team about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    pub coach_username: Option<String>,
}

/// Partial team update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A team with its coach and roster resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamDetail {
    pub team: Team,
    pub coach: Option<UserProfile>,
    /// Sorted by username.
    pub players: Vec<UserProfile>,
}
