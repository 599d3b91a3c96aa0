//! Authentication middleware: session token extraction, verification and
//! sliding rotation.

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, SET_COOKIE},
    },
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use goalpro_core::auth::gate::{Operation, authorize};
use goalpro_core::models::auth::Session;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::services::cookies::{SESSION_COOKIE, session_cookie};

/// Verified session stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Session);

impl AuthenticatedUser {
    pub fn username(&self) -> &str {
        &self.0.subject
    }

    /// Run the authorization gate for `operation`; denials are logged.
    pub fn require(&self, operation: Operation<'_>) -> AppResult<()> {
        let decision = authorize(&self.0, &operation);
        if !decision.is_allowed() {
            info!(
                subject = %self.0.subject,
                role = %self.0.role,
                operation = %operation,
                "authorization denied"
            );
        }
        decision.into_result(&operation).map_err(AppError::from)
    }
}

/// The session token from the `token` cookie, else from `Authorization: Bearer`.
fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && !cookie.value().is_empty()
    {
        return Some(cookie.value().to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Axum middleware: verifies the session token, injects `AuthenticatedUser`
/// into request extensions and, after the handler ran, reissues the token if
/// it is close to expiry.
///
/// Requests that end in 401/403 never receive a rotated token.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&jar, request.headers()).ok_or_else(|| {
        debug!("no session token presented");
        AppError::Unauthorized("Unauthorized".into())
    })?;

    let session = state.codec.verify(&token)?;
    request
        .extensions_mut()
        .insert(AuthenticatedUser(session.clone()));

    let mut response = next.run(request).await;

    if matches!(
        response.status(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        return Ok(response);
    }

    match state.rotation.maybe_rotate(&state.codec, &session) {
        Ok(Some(issued)) => {
            let max_age = (issued.expires_at - issued.issued_at).num_seconds();
            let cookie = session_cookie(&issued.token, max_age, state.config.cookie);
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                    debug!(subject = %session.subject, "session token rotated");
                }
                Err(e) => warn!(error = %e, "rotated cookie is not a valid header value"),
            }
        }
        Ok(None) => {}
        Err(e) => warn!(subject = %session.subject, error = %e, "session rotation failed"),
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::http::header::COOKIE;

    use super::*;

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let h = headers(&[
            (COOKIE, "token=from-cookie"),
            (AUTHORIZATION, "Bearer from-header"),
        ]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(session_token(&jar, &h).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let h = headers(&[(AUTHORIZATION, "Bearer from-header")]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(session_token(&jar, &h).as_deref(), Some("from-header"));
    }

    #[test]
    fn empty_cookie_and_other_schemes_yield_nothing() {
        let h = headers(&[(COOKIE, "token="), (AUTHORIZATION, "Basic abc")]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(session_token(&jar, &h), None);
    }
}
