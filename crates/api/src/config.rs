//! Process configuration, read once at startup.

use chrono::Duration;
use thiserror::Error;

use hms_auth::{
    CookiePolicy, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, SameSite, SigningDomain, TokenClass,
    TokenCodec, TokenError, parse_ttl,
};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set to a non-empty value")]
    Missing(&'static str),

    #[error("{key} must be `true` or `false`, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

/// Bootstrap top-level administrator for the in-memory store.
#[derive(Clone)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    access_secret: String,
    refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub production: bool,
    pub cookies: CookiePolicy,
    pub bind_addr: String,
    pub seed_admin: Option<SeedAdmin>,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("production", &self.production)
            .field("cookies", &self.cookies)
            .field("bind_addr", &self.bind_addr)
            .field("seed_admin", &self.seed_admin)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    ///
    /// Both signing secrets are required; everything else has a default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_secret = get("JWT_ACCESS_SECRET").ok_or(ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        let refresh_secret =
            get("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        let access_ttl = parse_ttl(&get("ACCESS_TOKEN_TTL").unwrap_or_else(|| DEFAULT_ACCESS_TTL.to_string()));
        let refresh_ttl =
            parse_ttl(&get("REFRESH_TOKEN_TTL").unwrap_or_else(|| DEFAULT_REFRESH_TTL.to_string()));

        let production = get("APP_ENV")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "production" | "prod"))
            .unwrap_or(false);

        let secure = match get("COOKIE_SECURE") {
            Some(raw) => parse_bool("COOKIE_SECURE", &raw)?,
            None => production,
        };
        let same_site = get("COOKIE_SAMESITE")
            .map(|v| SameSite::parse(&v))
            .unwrap_or_default();
        if same_site == SameSite::None && !secure {
            tracing::warn!("COOKIE_SAMESITE=none without the secure flag; browsers will drop the session cookies");
        }
        let cookies = CookiePolicy::new(secure, same_site, get("COOKIE_DOMAIN"));

        let seed_admin = match (get("SEED_ADMIN_EMAIL"), lookup("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) if !password.is_empty() => Some(SeedAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            production,
            cookies,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            seed_admin,
        })
    }

    /// Token codec for the two signing domains.
    pub fn token_codec(&self) -> Result<TokenCodec, TokenError> {
        Ok(TokenCodec::new(
            SigningDomain::new(TokenClass::Access, self.access_secret.as_bytes(), self.access_ttl)?,
            SigningDomain::new(TokenClass::Refresh, self.refresh_secret.as_bytes(), self.refresh_ttl)?,
        ))
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}
