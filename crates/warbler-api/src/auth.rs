use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::State,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, warn};

use warbler_db::{Database, is_constraint_violation};
use warbler_types::api::{FormView, LoginForm, UserAddForm};

use crate::error::ApiError;
use crate::forms::{Validate, optional};
use crate::session::{Session, SessionConfig};
use crate::views::{redirect, render};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub session: SessionConfig,
}

/// Run blocking database work off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}

pub async fn signup_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let view = FormView {
        form: "signup",
        fields: &["username", "email", "password", "image_url"],
    };
    render(&state, session, jar, view)
}

/// Create the account and log it in.
pub async fn signup(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<UserAddForm>,
) -> Result<Response, ApiError> {
    form.validate()?;

    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    let image_url = optional(&form.image_url);

    let user = run_db(&state, move |db| {
        db.signup(&username, &email, &form.password, image_url.as_deref())
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    warn!("Signup rejected, username or email taken: {}", username);
                    ApiError::Conflict("Username or email already taken")
                } else {
                    ApiError::Internal(e)
                }
            })
    })
    .await?;

    info!("New user {} (id={})", user.username, user.id);

    session.login(user.id);
    redirect(&state, session, jar, "/")
}

pub async fn login_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let view = FormView {
        form: "login",
        fields: &["username", "password"],
    };
    render(&state, session, jar, view)
}

pub async fn login(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    form.validate()?;

    // Signup stores the trimmed name.
    let username = form.username.trim().to_string();
    let lookup = username.clone();
    let user = run_db(&state, move |db| Ok(db.authenticate(&lookup, &form.password)?))
        .await?
        .ok_or_else(|| {
            warn!("Failed login for {}", username);
            ApiError::InvalidCredentials
        })?;

    info!("User {} logged in", user.username);

    session.login(user.id);
    session.flash("success", format!("Hello, {}!", user.username));
    redirect(&state, session, jar, "/")
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    session.logout();
    session.flash("success", "You have successfully logged out. See you later!");
    redirect(&state, session, jar, "/")
}
