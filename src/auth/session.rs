use chrono::Utc;
use rocket::http::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const SESSION_COOKIE: &str = "auth_token";

/// Identity carried by the session cookie.
///
/// The cookie is a Rocket private cookie, so its contents are encrypted and
/// authenticated with the application secret key. A client cannot change the
/// user id or stretch the expiry without invalidating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: i64,
    pub expires_at: i64,
}

impl SessionClaims {
    pub fn new(user_id: i64, ttl: chrono::Duration) -> Self {
        Self {
            user_id,
            expires_at: (Utc::now() + ttl).timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at
    }
}

pub fn start_session(cookies: &CookieJar<'_>, claims: SessionClaims, ttl: chrono::Duration) {
    let value = match serde_json::to_string(&claims) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Failed to encode session claims");
            return;
        }
    };

    let cookie = Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(rocket::time::Duration::seconds(ttl.num_seconds()));

    cookies.add_private(cookie);
}

/// Returns the claims if the cookie is present, authentic and parseable.
/// Expiry is left to the caller.
pub fn read_session(cookies: &CookieJar<'_>) -> Option<SessionClaims> {
    let cookie = cookies.get_private(SESSION_COOKIE)?;

    match serde_json::from_str::<SessionClaims>(cookie.value()) {
        Ok(claims) => Some(claims),
        Err(err) => {
            warn!(error = %err, "Session cookie did not contain valid claims");
            None
        }
    }
}

pub fn end_session(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/"));
}
