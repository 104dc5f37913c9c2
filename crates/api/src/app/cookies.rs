//! Session cookie: set on session creation, cleared on sign-out.

use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Cookie name for the session credential.
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    /// `Secure` attribute; true iff running in production.
    pub secure: bool,
    pub max_age: Duration,
}

impl CookiePolicy {
    /// httpOnly session cookie, path `/`, SameSite=Lax.
    pub fn session_cookie(&self, value: &str) -> Cookie<'static> {
        let max_age = i64::try_from(self.max_age.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((SESSION_COOKIE.to_string(), value.to_string()))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/".to_string())
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    /// Expired cookie that clears the session client-side.
    pub fn cleared_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE.to_string(), String::new()))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/".to_string())
            .max_age(time::Duration::ZERO)
            .build()
    }
}

/// Session credential presented by the client, if any.
pub fn session_credential(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}
