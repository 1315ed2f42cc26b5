use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderMap, Uri, header},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::auth::{AppState, run_db};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::session::Session;
use crate::views::redirect;

/// POST /users/toggle_like/{message_id}
///
/// Likes the message, or unlikes it if already liked, then returns the
/// browser to the page it came from.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let liked = run_db(&state, move |db| {
        if db.get_message(message_id, None)?.is_none() {
            return Err(ApiError::NotFound("Message"));
        }
        Ok(db.toggle_like(user_id, message_id)?)
    })
    .await?;

    debug!("User {} liked={} message {}", user_id, liked, message_id);

    redirect(&state, session, jar, &referrer_path(&headers))
}

/// Path and query of the `Referer`, or `/`. Never leaves the site.
fn referrer_path(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uri>().ok())
        .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_referer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn falls_back_to_home() {
        assert_eq!(referrer_path(&HeaderMap::new()), "/");
        assert_eq!(referrer_path(&with_referer("not a uri")), "/");
    }

    #[test]
    fn keeps_only_path_and_query() {
        assert_eq!(referrer_path(&with_referer("/users/3")), "/users/3");
        assert_eq!(
            referrer_path(&with_referer("http://localhost:5000/users/3/likes?page=2")),
            "/users/3/likes?page=2"
        );
        assert_eq!(referrer_path(&with_referer("https://elsewhere.example/phish")), "/phish");
    }
}
