use axum::{
    Extension, Form,
    extract::{Path, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use warbler_types::api::{FormView, HomeView, MessageForm, MessageView};

use crate::auth::{AppState, run_db};
use crate::error::ApiError;
use crate::forms::Validate;
use crate::middleware::{AuthUser, CurrentUser};
use crate::session::Session;
use crate::views::{deny, message_model, message_models, redirect, render};

/// GET /: landing page for visitors, feed of own and followed users' messages otherwise.
pub async fn home(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let view = match user {
        Some(user) => {
            let rows = run_db(&state, move |db| Ok(db.home_feed(user.id)?)).await?;
            HomeView::Feed {
                messages: message_models(rows),
            }
        }
        None => HomeView::Anonymous,
    };

    render(&state, session, jar, view)
}

pub async fn new_message_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let view = FormView {
        form: "message",
        fields: &["text"],
    };
    render(&state, session, jar, view)
}

/// POST /messages/new
pub async fn create_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Form(form): Form<MessageForm>,
) -> Result<Response, ApiError> {
    form.validate()?;

    let user_id = user.id;
    let message_id = run_db(&state, move |db| Ok(db.create_message(user_id, &form.text)?)).await?;

    info!("User {} posted message {}", user.username, message_id);

    redirect(&state, session, jar, &format!("/users/{}", user.id))
}

/// GET /messages/{message_id}: public.
pub async fn show_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(message_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let viewer_id = viewer.map(|u| u.id);
    let row = run_db(&state, move |db| Ok(db.get_message(message_id, viewer_id)?))
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    let view = MessageView {
        message: message_model(row),
    };
    render(&state, session, jar, view)
}

/// POST /messages/{message_id}/delete: only the author may delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(message_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let message = run_db(&state, move |db| Ok(db.get_message(message_id, None)?))
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    if message.user_id != user.id {
        warn!(
            "User {} tried to delete message {} owned by {}",
            user.id, message_id, message.user_id
        );
        return Ok(deny(&state, session, jar, ApiError::Forbidden));
    }

    run_db(&state, move |db| Ok(db.delete_message(message_id)?)).await?;
    info!("User {} deleted message {}", user.username, message_id);

    redirect(&state, session, jar, &format!("/users/{}", user.id))
}
