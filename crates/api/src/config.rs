//! API server configuration.

use std::time::Duration;

use rostergate_observability::LogFormat;

/// Default session lifetime: 5 days.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 432_000;

const DEV_SECRET: &str = "dev-secret";

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener.
    pub bind_addr: String,
    /// HS256 key for id tokens and session credentials.
    pub session_secret: String,
    /// `true` when running in production; controls the cookie `Secure` flag.
    pub production: bool,
    pub session_ttl: Duration,
    pub password_hash_cost: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    /// Postgres URL when persistent stores are enabled.
    pub database_url: Option<String>,
    pub log_format: LogFormat,
    /// Take the remote origin from `X-Forwarded-For`; only set behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            session_secret: DEV_SECRET.to_string(),
            production: false,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            password_hash_cost: 12,
            bootstrap_admin: None,
            database_url: None,
            log_format: LogFormat::Json,
            trust_forwarded_for: false,
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with dev defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `BIND_ADDR` | `0.0.0.0:8080` |
    /// | `SESSION_SECRET` | insecure dev default (warned) |
    /// | `APP_ENV` | `development`; `production` enables `Secure` cookies |
    /// | `SESSION_TTL_SECS` | `432000` |
    /// | `PASSWORD_HASH_COST` | `12` |
    /// | `BOOTSTRAP_ADMIN_EMAIL` / `BOOTSTRAP_ADMIN_PASSWORD` | unset |
    /// | `USE_PERSISTENT_STORES` / `DATABASE_URL` | `false` / unset |
    /// | `LOG_FORMAT` | `json` |
    /// | `TRUST_FORWARDED_FOR` | `false` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = var("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));

        let session_secret = var("SESSION_SECRET").unwrap_or_else(|| {
            if production {
                tracing::error!("SESSION_SECRET not set in production; using insecure dev default");
            } else {
                tracing::warn!("SESSION_SECRET not set; using insecure dev default");
            }
            DEV_SECRET.to_string()
        });

        let session_ttl = var("SESSION_TTL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);

        let password_hash_cost = var("PASSWORD_HASH_COST")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.password_hash_cost);

        let bootstrap_admin = match (var("BOOTSTRAP_ADMIN_EMAIL"), var("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (Some(_), None) => {
                tracing::warn!("BOOTSTRAP_ADMIN_EMAIL set without BOOTSTRAP_ADMIN_PASSWORD; skipping");
                None
            }
            _ => None,
        };

        let flag = |key: &str| var(key).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let use_persistent = flag("USE_PERSISTENT_STORES");
        let database_url = if use_persistent { var("DATABASE_URL") } else { None };
        if use_persistent && database_url.is_none() {
            tracing::warn!("USE_PERSISTENT_STORES set but DATABASE_URL missing; using in-memory stores");
        }

        let log_format = var("LOG_FORMAT")
            .and_then(|v| v.parse::<LogFormat>().ok())
            .unwrap_or(defaults.log_format);

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            session_secret,
            production,
            session_ttl,
            password_hash_cost,
            bootstrap_admin,
            database_url,
            log_format,
            trust_forwarded_for: flag("TRUST_FORWARDED_FOR"),
        }
    }
}
