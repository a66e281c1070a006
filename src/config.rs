//! Runtime configuration, read from the environment (and `.env`) at startup.
//!
//! Nothing here is inferred from how the process was launched: the binary calls
//! [`Config::from_env`], tests build [`Config::relaxed`], and both hand the
//! result to [`crate::AppState`].

use std::{net::SocketAddr, str::FromStr, time::Duration};

use crate::auth::PasswordPolicy;

const DEV_JWT_SECRET: &str = "treasures-dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `DATABASE_URL`
    pub database_url: String,
    /// Env: `DB_MAX_CONNECTIONS`
    pub db_max_connections: u32,
    /// Env: `HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// HMAC secret for access and refresh tokens.
    /// Env: `JWT_SECRET`
    pub jwt_secret: String,
    /// Env: `ACCESS_TOKEN_TTL_SECS`
    pub access_token_ttl: Duration,
    /// Env: `REFRESH_TOKEN_TTL_SECS`
    pub refresh_token_ttl: Duration,

    /// Env: `PASSWORD_POLICY` (`strict` | `relaxed`)
    pub password_policy: PasswordPolicy,

    /// Env: `PAGE_SIZE`
    pub default_page_size: u32,
    /// Upper bound for the `page_size` query parameter.
    /// Env: `MAX_PAGE_SIZE`
    pub max_page_size: u32,

    /// Env: `SESSION_INACTIVITY_MINUTES`
    pub session_inactivity_minutes: i64,
    /// Env: `SECURE_COOKIES`
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://treasures.db?mode=rwc".to_owned(),
            db_max_connections: 16,
            http_addr: ([0, 0, 0, 0], 8080).into(),
            jwt_secret: DEV_JWT_SECRET.to_owned(),
            access_token_ttl: Duration::from_secs(5 * 60),
            refresh_token_ttl: Duration::from_secs(24 * 60 * 60),
            password_policy: PasswordPolicy::Strict,
            default_page_size: 10,
            max_page_size: 100,
            session_inactivity_minutes: 30,
            secure_cookies: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = dotenv::var("DATABASE_URL") {
            config.database_url = url;
        }
        parse_into("DB_MAX_CONNECTIONS", &mut config.db_max_connections);
        parse_into("HTTP_ADDR", &mut config.http_addr);

        match dotenv::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!("JWT_SECRET not set, using the development secret"),
        }
        let mut access_secs = config.access_token_ttl.as_secs();
        parse_into("ACCESS_TOKEN_TTL_SECS", &mut access_secs);
        config.access_token_ttl = Duration::from_secs(access_secs);
        let mut refresh_secs = config.refresh_token_ttl.as_secs();
        parse_into("REFRESH_TOKEN_TTL_SECS", &mut refresh_secs);
        config.refresh_token_ttl = Duration::from_secs(refresh_secs);

        parse_into("PASSWORD_POLICY", &mut config.password_policy);

        parse_into("PAGE_SIZE", &mut config.default_page_size);
        parse_into("MAX_PAGE_SIZE", &mut config.max_page_size);
        if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
            tracing::warn!(
                page_size = config.default_page_size,
                max_page_size = config.max_page_size,
                "PAGE_SIZE out of range, clamping"
            );
            config.default_page_size = config.default_page_size.clamp(1, config.max_page_size.max(1));
        }

        parse_into("SESSION_INACTIVITY_MINUTES", &mut config.session_inactivity_minutes);
        if let Ok(val) = dotenv::var("SECURE_COOKIES") {
            config.secure_cookies = val == "true" || val == "1";
        }

        config
    }

    /// Single-connection in-memory database, no password policy, cheap hashing.
    pub fn relaxed() -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            db_max_connections: 1,
            password_policy: PasswordPolicy::Relaxed,
            ..Self::default()
        }
    }
}

fn parse_into<T: FromStr>(key: &str, slot: &mut T) {
    let Ok(raw) = dotenv::var(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "invalid value, using default"),
    }
}
