//! Persistence seams.
//!
//! [`CredentialStore`] is everything the auth core needs from storage;
//! [`UserDirectory`] covers profile and roster CRUD. Both are implemented by
//! [`postgres::PgStore`] and by the in-process [`memory::MemoryStore`].

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{Credential, ResetTicket, Role};
use crate::models::user::{
    NewTeam, NewUser, ProfileUpdate, Team, TeamDetail, TeamUpdate, UserProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Bound a store future by `limit`; elapsed time becomes [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Credential persistence. Every operation is atomic at the single-record level.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Credential>>;

    /// Look up the user holding the reset token with this digest.
    async fn find_by_reset_token(&self, token_hash: &str) -> StoreResult<Option<Credential>>;

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> StoreResult<()>;

    /// Store a reset ticket, overwriting any previous one.
    async fn set_reset_token(&self, username: &str, ticket: &ResetTicket) -> StoreResult<()>;

    async fn clear_reset_token(&self, username: &str) -> StoreResult<()>;

    /// Replace the password hash and clear the reset ticket as one unit.
    ///
    /// Returns `false` when the ticket was no longer present, i.e. another
    /// request redeemed or replaced it first. The default implementation
    /// cannot make both writes atomic, so it clears the ticket before touching
    /// the password; a concurrent redeemer can slip between the check and the
    /// clear.
    async fn complete_password_reset(
        &self,
        username: &str,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let holds_ticket = self
            .find_by_username(username)
            .await?
            .and_then(|credential| credential.reset)
            .is_some_and(|ticket| ticket.token_hash == token_hash);
        if !holds_ticket {
            return Ok(false);
        }
        self.clear_reset_token(username).await?;
        self.update_password_hash(username, password_hash).await?;
        Ok(true)
    }
}

/// User profile and team roster persistence.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a new user. Fails with [`StoreError::Duplicate`] on a taken
    /// username or email; emails compare case-insensitively.
    async fn create_user(&self, user: &NewUser) -> StoreResult<UserProfile>;

    async fn get_profile(&self, username: &str) -> StoreResult<Option<UserProfile>>;

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>>;

    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<UserProfile>>;

    /// Apply a partial update. `Ok(None)` when the user does not exist.
    async fn update_profile(
        &self,
        username: &str,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>>;

    async fn list_teams(&self) -> StoreResult<Vec<Team>>;

    /// Insert a team. A coach may lead only one team.
    async fn create_team(&self, team: &NewTeam) -> StoreResult<Team>;

    /// The team with its coach and players. `Ok(None)` when it does not exist.
    async fn get_team(&self, team_id: i64) -> StoreResult<Option<TeamDetail>>;

    /// Rename or re-describe a team. `Ok(None)` when it does not exist.
    async fn update_team(&self, team_id: i64, update: &TeamUpdate) -> StoreResult<Option<Team>>;

    /// Hand the team to `username`, replacing the previous coach.
    async fn switch_coach(&self, team_id: i64, username: &str) -> StoreResult<Team>;

    /// Put a user on a team's roster, promoting a plain `USER` to `PLAYER`.
    async fn assign_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile>;

    /// Take a user off a team's roster. Role is left unchanged.
    async fn remove_player(&self, team_id: i64, username: &str) -> StoreResult<UserProfile>;
}
