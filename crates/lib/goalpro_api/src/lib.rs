//! # goalpro_api
//!
//! HTTP API library for GoalPro.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::header::{
    AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use chrono::Duration;
use goalpro_core::auth::AuthError;
use goalpro_core::auth::jwt::{SessionSettings, TokenCodec};
use goalpro_core::auth::password::{CredentialVerifier, PasswordHasher};
use goalpro_core::auth::reset::{PasswordResetFlow, ResetSettings};
use goalpro_core::auth::rotation::RotationPolicy;
use goalpro_core::mailer::Mailer;
use goalpro_core::store::{CredentialStore, UserDirectory};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{auth, status, teams, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Credential persistence used by the auth flows.
    pub credentials: Arc<dyn CredentialStore>,
    /// Profile and roster persistence.
    pub directory: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub codec: Arc<TokenCodec>,
    pub rotation: RotationPolicy,
    pub hasher: PasswordHasher,
    /// Login checks; spends the same bcrypt work for unknown users.
    pub verifier: Arc<CredentialVerifier>,
    pub reset: Arc<ResetSettings>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Build state around one store object serving both store traits.
    pub fn new<S>(store: Arc<S>, mailer: Arc<dyn Mailer>, config: ApiConfig) -> Result<Self, AuthError>
    where
        S: CredentialStore + UserDirectory + 'static,
    {
        let codec = TokenCodec::new(
            config.jwt_secret.as_bytes(),
            SessionSettings::with_lifetime(Duration::hours(config.token_lifetime_hours)),
        )?;
        let reset = ResetSettings::new(
            config.frontend_url.clone(),
            config.store_timeout,
            config.mail_timeout,
        );
        let hasher = PasswordHasher::new(config.bcrypt_cost);
        Ok(Self {
            credentials: store.clone(),
            directory: store,
            mailer,
            codec: Arc::new(codec),
            rotation: RotationPolicy::default(),
            hasher,
            verifier: Arc::new(CredentialVerifier::new(hasher)?),
            reset: Arc::new(reset),
            config,
        })
    }

    /// The password-reset flow wired to this state's collaborators.
    pub fn reset_flow(&self) -> PasswordResetFlow<'_> {
        PasswordResetFlow {
            store: self.credentials.as_ref(),
            mailer: Arc::clone(&self.mailer),
            hasher: self.hasher,
            settings: self.reset.as_ref(),
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `goalpro_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    goalpro_core::migrate::migrate(pool).await
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_credentials(true);
    match HeaderValue::from_str(origin) {
        Ok(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS origin; cross-origin requests disabled");
            cors
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_STATUS, get(status::status_handler))
        .route(routes::POST_USERS_REGISTER, post(auth::register_handler))
        .route(routes::POST_USERS_LOGIN, post(auth::login_handler))
        .route(routes::POST_USERS_LOGOUT, post(auth::logout_handler))
        .route(
            routes::POST_USERS_FORGOT_PASSWORD,
            post(auth::forgot_password_handler),
        )
        .route(
            routes::POST_USERS_RESET_PASSWORD,
            post(auth::reset_password_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_USERS, get(users::list_users_handler))
        .route(routes::GET_USERS_PLAYERS, get(users::list_players_handler))
        .route(routes::GET_USERS_ROLE, get(users::list_by_role_handler))
        .route(
            routes::USERS_USERNAME,
            get(users::get_profile_handler).put(users::update_profile_handler),
        )
        .route(
            routes::TEAMS,
            get(teams::list_teams_handler).post(teams::create_team_handler),
        )
        .route(
            routes::TEAMS_ID,
            get(teams::get_team_handler).put(teams::update_team_handler),
        )
        .route(
            routes::PUT_TEAMS_ID_COACH_USERNAME,
            put(teams::switch_coach_handler),
        )
        .route(
            routes::TEAMS_ID_PLAYERS_USERNAME,
            put(teams::add_player_handler).delete(teams::remove_player_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_origin))
                .layer(security_headers),
        )
        .with_state(state)
}
