//! Authentication service: login, registration and the password-reset
//! endpoints, delegating to `goalpro_core::auth`.

use chrono::Utc;
use goalpro_core::auth::AuthError;
use goalpro_core::auth::jwt::IssuedToken;
use goalpro_core::auth::password::validate_password_strength;
use goalpro_core::models::auth::Role;
use goalpro_core::models::user::{NewUser, UserProfile};
use goalpro_core::store::{StoreError, with_timeout};
use tracing::{debug, info};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::RegisterRequest;
use crate::services::users::{
    normalize_email, validate_birth_date, validate_email, validate_name, validate_username,
};

/// A successful login: the user's profile and the session token to set.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub profile: UserProfile,
    pub issued: IssuedToken,
}

/// Authenticate with username + password and mint a session token.
///
/// Unknown users and wrong passwords fail identically.
pub async fn login(state: &AppState, username: &str, password: &str) -> AppResult<LoginOutcome> {
    let timeout = state.config.store_timeout;
    let credential = with_timeout(timeout, state.credentials.find_by_username(username)).await?;

    let Some(credential) = credential else {
        state.verifier.check(password, None)?;
        debug!("login for unknown user");
        return Err(AuthError::CredentialError.into());
    };
    if !state
        .verifier
        .check(password, Some(&credential.password_hash))?
    {
        debug!(username = %credential.username, "login with wrong password");
        return Err(AuthError::CredentialError.into());
    }

    let issued = state.codec.issue(&credential.username, credential.role)?;
    let profile = with_timeout(timeout, state.directory.get_profile(&credential.username))
        .await?
        .ok_or_else(|| AppError::Internal(format!("profile missing for {}", credential.username)))?;

    info!(username = %credential.username, role = %credential.role, "user logged in");
    Ok(LoginOutcome { profile, issued })
}

/// Register a new account with the least-privileged role.
pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<UserProfile> {
    let username = req.username.trim().to_string();
    let email = normalize_email(&req.email);
    validate_username(&username)?;
    validate_name("First name", &req.first_name)?;
    validate_name("Last name", &req.last_name)?;
    validate_email(&email)?;
    validate_birth_date(req.birth_date)?;
    validate_password_strength(&req.password)?;

    let new_user = NewUser {
        username,
        email,
        password_hash: state.hasher.hash(&req.password)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        birth_date: req.birth_date,
        description: req.description,
        role: Role::default(),
    };

    let profile = with_timeout(
        state.config.store_timeout,
        state.directory.create_user(&new_user),
    )
    .await
    .map_err(|e| match e {
        StoreError::Duplicate(_) => {
            AppError::Validation("Username or email is already in use".into())
        }
        other => AppError::from(other),
    })?;

    info!(username = %profile.username, "user registered");
    Ok(profile)
}

/// Start a password reset. Succeeds identically, and without waiting on the
/// mailer, whether or not the user exists.
pub async fn forgot_password(state: &AppState, username: &str) -> AppResult<()> {
    let initiated = state
        .reset_flow()
        .initiate_reset(username.trim(), Utc::now())
        .await?;
    if initiated.is_queued() {
        debug!("reset mail queued");
    }
    Ok(())
}

/// Redeem a reset token for a new password.
pub async fn reset_password(state: &AppState, token: &str, password: &str) -> AppResult<()> {
    state
        .reset_flow()
        .redeem_reset(token.trim(), password, Utc::now())
        .await?;
    Ok(())
}
