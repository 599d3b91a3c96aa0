//! PostgreSQL-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use super::{CredentialStore, StoreError, StoreResult, UserDirectory};
use crate::models::auth::{Credential, ResetTicket, Role};
use crate::models::user::{
    NewTeam, NewUser, ProfileUpdate, Team, TeamDetail, TeamUpdate, UserProfile,
};

const CREDENTIAL_COLUMNS: &str =
    "username, email, password_hash, role, reset_token, reset_token_expires";

const PROFILE_COLUMNS: &str = "username, first_name, last_name, email, birth_date, description, \
     role, player_team_id, \
     (SELECT t.id FROM teams t WHERE t.coach_username = users.username) AS coach_team_id";

const TEAM_COLUMNS: &str = "id, name, description, coach_username";

type CredentialRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
);

type ProfileRow = (
    String,
    String,
    String,
    String,
    NaiveDate,
    Option<String>,
    String,
    Option<i64>,
    Option<i64>,
);

type TeamRow = (i64, String, String, Option<String>);

/// Store backed by a `sqlx` Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> StoreResult<Role> {
    raw.parse()
        .map_err(|e: crate::models::auth::UnknownRole| StoreError::InvalidRow(e.to_string()))
}

fn credential_from_row(row: CredentialRow) -> StoreResult<Credential> {
    let (username, email, password_hash, role, reset_token, reset_expires) = row;
    let reset = match (reset_token, reset_expires) {
        (Some(token_hash), Some(expires_at)) => Some(ResetTicket {
            token_hash,
            expires_at,
        }),
        _ => None,
    };
    Ok(Credential {
        username,
        email,
        password_hash,
        role: parse_role(&role)?,
        reset,
    })
}

fn profile_from_row(row: ProfileRow) -> StoreResult<UserProfile> {
    let (
        username,
        first_name,
        last_name,
        email,
        birth_date,
        description,
        role,
        team_id,
        coach_team_id,
    ) = row;
    Ok(UserProfile {
        username,
        first_name,
        last_name,
        email,
        birth_date,
        description,
        role: parse_role(&role)?,
        team_id,
        coach_team_id,
    })
}

fn team_from_row((id, name, description, coach_username): TeamRow) -> Team {
    Team {
        id,
        name,
        description,
        coach_username,
    }
}

/// Translate unique-constraint violations into [`StoreError::Duplicate`].
fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        let what = match db.constraint() {
            Some(c) if c.contains("email") => "email",
            Some(c) if c.contains("coach") => "coach",
            Some(c) if c.contains("username") => "username",
            Some(c) if c.contains("name") => "team name",
            _ => "record",
        };
        return StoreError::Duplicate(what.to_string());
    }
    StoreError::Db(e)
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE reset_token = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE username = $1")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_reset_token(&self, username: &str, ticket: &ResetTicket) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET reset_token = $2, reset_token_expires = $3 WHERE username = $1",
        )
        .bind(username)
        .bind(&ticket.token_hash)
        .bind(ticket.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_reset_token(&self, username: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET reset_token = NULL, reset_token_expires = NULL WHERE username = $1",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        username: &str,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users \
             SET password_hash = $3, reset_token = NULL, reset_token_expires = NULL \
             WHERE username = $1 AND reset_token = $2",
        )
        .bind(username)
        .bind(token_hash)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<UserProfile> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO users \
             (username, email, password_hash, first_name, last_name, birth_date, description, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.birth_date)
        .bind(&user.description)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;
        profile_from_row(row)
    }

    async fn get_profile(&self, username: &str) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(profile_from_row).transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(profile_from_row).collect()
    }

    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE role = $1 ORDER BY username"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(profile_from_row).collect()
    }

    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE users SET \
               first_name = COALESCE($2, first_name), \
               last_name = COALESCE($3, last_name), \
               email = COALESCE($4, email), \
               birth_date = COALESCE($5, birth_date), \
               description = COALESCE($6, description), \
               password_hash = COALESCE($7, password_hash) \
             WHERE username = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(username)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(update.birth_date)
        .bind(&update.description)
        .bind(&update.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?;
        row.map(profile_from_row).transpose()
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let rows = sqlx::query_as::<_, TeamRow>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(team_from_row).collect())
    }

    async fn create_team(&self, team: &NewTeam) -> StoreResult<Team> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "INSERT INTO teams (name, description, coach_username) VALUES ($1, $2, $3) \
             RETURNING {TEAM_COLUMNS}"
        ))
        .bind(&team.name)
        .bind(&team.description)
        .bind(&team.coach_username)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(team_from_row(row))
    }

    async fn get_team(&self, team_id: i64) -> StoreResult<Option<TeamDetail>> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"
        ))
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(team) = row.map(team_from_row) else {
            return Ok(None);
        };

        let coach = match &team.coach_username {
            Some(coach) => self.get_profile(coach).await?,
            None => None,
        };
        let players = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE player_team_id = $1 ORDER BY username"
        ))
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(profile_from_row)
        .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(TeamDetail {
            team,
            coach,
            players,
        }))
    }

    async fn update_team(&self, team_id: i64, update: &TeamUpdate) -> StoreResult<Option<Team>> {
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "UPDATE teams SET \
               name = COALESCE($2, name), \
               description = COALESCE($3, description) \
             WHERE id = $1 \
             RETURNING {TEAM_COLUMNS}"
        ))
        .bind(team_id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?;
        Ok(row.map(team_from_row))
    }

    async fn switch_coach(&self, team_id: i64, username: &str) -> StoreResult<Team> {
        if self.get_profile(username).await?.is_none() {
            return Err(StoreError::NotFound(format!("user {username}")));
        }
        let row = sqlx::query_as::<_, TeamRow>(&format!(
            "UPDATE teams SET coach_username = $2 WHERE id = $1 RETURNING {TEAM_COLUMNS}"
        ))
        .bind(team_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?;
        row.map(team_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("team {team_id}")))
    }

    async fn assign_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile> {
        let team_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1)")
                .bind(team_id)
                .fetch_one(&self.pool)
                .await?;
        if !team_exists {
            return Err(StoreError::NotFound(format!("team {team_id}")));
        }

        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE users SET \
               player_team_id = $1, \
               role = CASE WHEN role = 'USER' THEN 'PLAYER' ELSE role END \
             WHERE username = $2 AND player_team_id IS DISTINCT FROM $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(team_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => profile_from_row(row),
            None => match self.get_profile(username).await? {
                Some(_) => Err(StoreError::Duplicate("roster entry".into())),
                None => Err(StoreError::NotFound(format!("user {username}"))),
            },
        }
    }

    async fn remove_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE users SET player_team_id = NULL \
             WHERE username = $2 AND player_team_id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(team_id)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => profile_from_row(row),
            None => Err(StoreError::NotFound(format!(
                "user {username} on team {team_id}"
            ))),
        }
    }
}
