//! Session cookie construction.
//!
//! Login and rotation both go through [`session_cookie`], so the attributes
//! never drift apart.

use axum_extra::extract::cookie::Cookie;
use time::Duration;

use crate::config::CookiePolicy;

/// Cookie name for the session token.
pub const SESSION_COOKIE: &str = "token";

/// Build the HTTP-only session cookie carrying `token`.
pub fn session_cookie(token: &str, max_age_secs: i64, policy: CookiePolicy) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(policy.secure)
        .same_site(policy.same_site)
        .path("/".to_string())
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Build an expired session cookie instructing the client to drop its token.
pub fn clear_session_cookie(policy: CookiePolicy) -> Cookie<'static> {
    session_cookie("", 0, policy)
}
