//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
    ResetPasswordRequest, UserResponse,
};
use crate::services::auth;
use crate::services::cookies::{clear_session_cookie, session_cookie};

/// Response to every forgot-password request.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that username exists, a password reset link has been sent";

/// `POST /users/register` — create a new account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let profile = auth::register(&state, body).await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

/// `POST /users/login` — authenticate and set the session cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let outcome = auth::login(&state, &body.username, &body.password).await?;
    let max_age = (outcome.issued.expires_at - outcome.issued.issued_at).num_seconds();
    let jar = jar.add(session_cookie(
        &outcome.issued.token,
        max_age,
        state.config.cookie,
    ));
    Ok((
        jar,
        Json(LoginResponse {
            user: outcome.profile.into(),
            expires_at: outcome.issued.expires_at.to_rfc3339(),
        }),
    ))
}

/// `POST /users/logout` — tell the client to drop its session cookie.
///
/// Tokens are not revoked server-side; they expire on their own.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.add(clear_session_cookie(state.config.cookie)),
        Json(MessageResponse::new("Logged out")),
    )
}

/// `POST /users/forgot-password` — always answers with the same message.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::forgot_password(&state, &body.username).await?;
    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// `POST /users/reset-password` — redeem a reset token.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::reset_password(&state, &body.token, &body.password).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}
