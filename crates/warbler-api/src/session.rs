//! Cookie-backed session.
//!
//! The whole session lives client-side in one HS256-signed cookie: the
//! logged-in user id under `curr_user` and any pending flash messages. A
//! missing, expired or forged cookie reads as an empty session.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use warbler_types::models::Flash;

pub const SESSION_COOKIE: &str = "warbler_session";

/// Signing key and lifetime for session cookies.
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl: chrono::Duration,
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    curr_user: Option<i64>,
    #[serde(default, rename = "_flashes", skip_serializing_if = "Vec::is_empty")]
    flashes: Vec<Flash>,
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    session: Session,
    exp: usize,
}

impl Session {
    pub fn from_jar(jar: &CookieJar, config: &SessionConfig) -> Self {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Self::default();
        };

        match decode::<SessionClaims>(
            cookie.value(),
            &DecodingKey::from_secret(config.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => data.claims.session,
            Err(e) => {
                debug!("Discarding unreadable session cookie: {}", e);
                Self::default()
            }
        }
    }

    /// Sign the session into a cookie on `jar`.
    pub fn save(&self, jar: CookieJar, config: &SessionConfig) -> anyhow::Result<CookieJar> {
        let claims = SessionClaims {
            session: self.clone(),
            exp: (chrono::Utc::now() + config.ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )?;

        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);

        Ok(jar.add(cookie))
    }

    pub fn user_id(&self) -> Option<i64> {
        self.curr_user
    }

    pub fn login(&mut self, user_id: i64) {
        self.curr_user = Some(user_id);
    }

    /// Drop everything, flashes included.
    pub fn logout(&mut self) {
        *self = Self::default();
    }

    pub fn flash(&mut self, category: &str, message: impl Into<String>) {
        self.flashes.push(Flash::new(category, message));
    }

    pub fn take_flashes(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> SessionConfig {
        SessionConfig::new(secret, chrono::Duration::days(1))
    }

    fn reload(jar: &CookieJar, config: &SessionConfig) -> Session {
        Session::from_jar(jar, config)
    }

    #[test]
    fn saved_session_reads_back() {
        let cfg = config("secret");
        let mut session = Session::default();
        session.login(42);
        session.flash("success", "Hello, testuser!");

        let jar = session.save(CookieJar::new(), &cfg).unwrap();
        let mut loaded = reload(&jar, &cfg);

        assert_eq!(loaded.user_id(), Some(42));
        assert_eq!(loaded.take_flashes(), vec![Flash::new("success", "Hello, testuser!")]);
        assert!(loaded.take_flashes().is_empty());
    }

    #[test]
    fn missing_or_forged_cookie_is_anonymous() {
        let cfg = config("secret");
        assert_eq!(reload(&CookieJar::new(), &cfg), Session::default());

        let mut session = Session::default();
        session.login(7);
        let jar = session.save(CookieJar::new(), &config("other-secret")).unwrap();
        assert_eq!(reload(&jar, &cfg).user_id(), None);

        let garbage = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "not.a.token"));
        assert_eq!(reload(&garbage, &cfg).user_id(), None);
    }

    #[test]
    fn expired_cookie_is_anonymous() {
        let expired = SessionConfig::new("secret", chrono::Duration::days(-1));
        let mut session = Session::default();
        session.login(7);

        let jar = session.save(CookieJar::new(), &expired).unwrap();
        assert_eq!(reload(&jar, &expired).user_id(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let mut session = Session::default();
        session.login(1);
        session.flash("info", "pending");

        session.logout();
        assert_eq!(session, Session::default());
    }
}
