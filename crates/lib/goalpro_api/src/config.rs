//! API server configuration.

use std::time::Duration;

use axum_extra::extract::cookie::SameSite;
use goalpro_core::auth::jwt::{DEFAULT_TOKEN_LIFETIME_HOURS, resolve_jwt_secret_with};
use goalpro_core::auth::password::DEFAULT_BCRYPT_COST;
use thiserror::Error;
use url::Url;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 10;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Deployment environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            other => Err(ConfigError::Invalid {
                name: "APP_ENV",
                reason: format!("unknown environment '{other}'"),
            }),
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Transport attributes applied to every session cookie, login and rotation alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Production => Self {
                secure: true,
                same_site: SameSite::Strict,
            },
            Environment::Development => Self {
                secure: false,
                same_site: SameSite::Lax,
            },
        }
    }
}

/// HTTP mail API settings. Absent in development, where mail is only logged.
#[derive(Clone)]
pub struct MailConfig {
    pub api_url: Url,
    pub api_key: String,
    pub from: String,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    /// The single origin allowed to make credentialed cross-origin requests.
    pub cors_origin: String,
    /// Front-end base URL used in password-reset links.
    pub frontend_url: Url,
    pub mail: Option<MailConfig>,
    pub store_timeout: Duration,
    pub mail_timeout: Duration,
    pub bcrypt_cost: u32,
    pub cookie: CookiePolicy,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("environment", &self.environment)
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("token_lifetime_hours", &self.token_lifetime_hours)
            .field("cors_origin", &self.cors_origin)
            .field("frontend_url", &self.frontend_url.as_str())
            .field("mail", &self.mail)
            .field("store_timeout", &self.store_timeout)
            .field("mail_timeout", &self.mail_timeout)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("cookie", &self.cookie)
            .finish()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable             | Default                                 |
    /// |----------------------|-----------------------------------------|
    /// | `APP_ENV`            | `development`                           |
    /// | `BIND_ADDR`          | `127.0.0.1:3000`                        |
    /// | `JWT_SECRET` / `AUTH_SECRET` | required in production; generated & persisted otherwise |
    /// | `JWT_EXPIRES_HOURS`  | `8`                                     |
    /// | `CORS_ORIGIN`        | `http://localhost:8080`                 |
    /// | `FRONTEND_URL`       | value of `CORS_ORIGIN`                  |
    /// | `MAIL_API_URL`, `MAIL_API_KEY`, `MAIL_FROM` | unset (log-only mail) |
    /// | `STORE_TIMEOUT_SECS` | `5`                                     |
    /// | `MAIL_TIMEOUT_SECS`  | `10`                                    |
    /// | `BCRYPT_COST`        | `12`                                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ApiConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let environment = match get("APP_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::default(),
        };

        let jwt_secret = resolve_jwt_secret_with(&get, !environment.is_production())
            .map_err(|e| ConfigError::Missing(e.to_string()))?;

        let token_lifetime_hours =
            parse_or(&get, "JWT_EXPIRES_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS)?;
        if token_lifetime_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_EXPIRES_HOURS",
                reason: "must be positive".into(),
            });
        }

        let cors_origin = get("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.into());
        let frontend_raw = get("FRONTEND_URL").unwrap_or_else(|| cors_origin.clone());
        let frontend_url = parse_url("FRONTEND_URL", &frontend_raw)?;

        let mail = match (get("MAIL_API_URL"), get("MAIL_API_KEY"), get("MAIL_FROM")) {
            (Some(url), Some(api_key), Some(from)) => Some(MailConfig {
                api_url: parse_url("MAIL_API_URL", &url)?,
                api_key,
                from,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Missing(
                    "MAIL_API_URL, MAIL_API_KEY and MAIL_FROM must be set together".into(),
                ));
            }
        };

        Ok(Self {
            environment,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            jwt_secret,
            token_lifetime_hours,
            cors_origin,
            frontend_url,
            mail,
            store_timeout: Duration::from_secs(parse_or(
                &get,
                "STORE_TIMEOUT_SECS",
                DEFAULT_STORE_TIMEOUT_SECS,
            )?),
            mail_timeout: Duration::from_secs(parse_or(
                &get,
                "MAIL_TIMEOUT_SECS",
                DEFAULT_MAIL_TIMEOUT_SECS,
            )?),
            bcrypt_cost: parse_or(&get, "BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
            cookie: CookiePolicy::for_environment(environment),
        })
    }

    /// Session cookie max-age, equal to the token lifetime.
    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_lifetime_hours)
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
