//! User profile service: field validation and profile edits.

use chrono::{NaiveDate, Utc};
use goalpro_core::auth::password::validate_password_strength;
use goalpro_core::models::user::{ProfileUpdate, UserProfile};
use goalpro_core::store::with_timeout;
use regex::Regex;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::UpdateProfileRequest;

fn is_valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,31}$").is_ok_and(|re| re.is_match(username))
}

fn is_valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Emails are stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if !is_valid_username(username) {
        return Err(AppError::Validation(
            "Username must be 3-32 characters: letters, digits, '.', '_' or '-'".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if !is_valid_email(email) {
        return Err(AppError::Validation("Email address is not valid".into()));
    }
    Ok(())
}

pub fn validate_name(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Birth dates must lie strictly in the past.
pub fn validate_birth_date(birth_date: NaiveDate) -> AppResult<()> {
    if birth_date >= Utc::now().date_naive() {
        return Err(AppError::Validation("Birth date must be in the past".into()));
    }
    Ok(())
}

/// Apply a partial profile edit for `username`. Only supplied fields are
/// validated and written; a new password is policy-checked and hashed.
pub async fn update_profile(
    state: &AppState,
    username: &str,
    req: UpdateProfileRequest,
) -> AppResult<UserProfile> {
    if let Some(v) = &req.first_name {
        validate_name("First name", v)?;
    }
    if let Some(v) = &req.last_name {
        validate_name("Last name", v)?;
    }
    let email = req.email.as_deref().map(normalize_email);
    if let Some(v) = &email {
        validate_email(v)?;
    }
    if let Some(v) = req.birth_date {
        validate_birth_date(v)?;
    }
    let password_hash = match &req.password {
        Some(password) => {
            validate_password_strength(password)?;
            Some(state.hasher.hash(password)?)
        }
        None => None,
    };
    let changes_password = password_hash.is_some();

    let update = ProfileUpdate {
        first_name: req.first_name,
        last_name: req.last_name,
        email,
        birth_date: req.birth_date,
        description: req.description,
        password_hash,
    };
    let profile = with_timeout(
        state.config.store_timeout,
        state.directory.update_profile(username, &update),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {username}")))?;

    info!(username, changes_password, "profile updated");
    Ok(profile)
}
