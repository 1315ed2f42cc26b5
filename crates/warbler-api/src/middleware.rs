use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use warbler_db::models::UserRow;

use crate::auth::{AppState, run_db};
use crate::error::ApiError;
use crate::session::Session;
use crate::views::deny;

/// The logged-in user for this request, if any.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<UserRow>);

/// Present on routes behind `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRow);

/// Decode the session cookie and resolve its user id.
///
/// A session pointing at a user that no longer exists counts as anonymous.
pub async fn load_user(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let session = Session::from_jar(&jar, &state.session);

    let user = match session.user_id() {
        Some(id) => match run_db(&state, move |db| Ok(db.get_user_by_id(id)?)).await {
            Ok(user) => user,
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    req.extensions_mut().insert(session);
    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Reject anonymous requests with 401 and an "Access unauthorized." flash.
pub async fn require_auth(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(user) = user else {
        warn!("Anonymous request to {} {}", req.method(), req.uri().path());
        return deny(&state, session, jar, ApiError::Unauthorized);
    };

    req.extensions_mut().insert(AuthUser(user));
    next.run(req).await
}
