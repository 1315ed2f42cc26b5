use axum::{
    Json,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::warn;

use warbler_db::models::{MessageRow, UserRow};
use warbler_types::api::Page;
use warbler_types::models::{Message, User, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::session::Session;

/// JSON view with the session's pending flashes drained into it.
pub(crate) fn render<T: Serialize>(
    state: &AppState,
    mut session: Session,
    jar: CookieJar,
    view: T,
) -> Result<Response, ApiError> {
    let flashes = session.take_flashes();
    let jar = if flashes.is_empty() {
        jar
    } else {
        session.save(jar, &state.session)?
    };

    Ok((jar, Json(Page { flashes, view })).into_response())
}

/// Persist the session and send the browser to `to`.
pub(crate) fn redirect(
    state: &AppState,
    session: Session,
    jar: CookieJar,
    to: &str,
) -> Result<Response, ApiError> {
    let jar = session.save(jar, &state.session)?;
    Ok((jar, Redirect::to(to)).into_response())
}

/// Refuse the request, leaving the refusal as a flash for the next page.
pub(crate) fn deny(state: &AppState, mut session: Session, jar: CookieJar, err: ApiError) -> Response {
    session.flash("danger", err.to_string());
    match session.save(jar, &state.session) {
        Ok(jar) => (jar, err).into_response(),
        Err(e) => ApiError::Internal(e).into_response(),
    }
}

pub(crate) fn user_model(row: &UserRow) -> User {
    User {
        id: row.id,
        username: row.username.clone(),
        email: row.email.clone(),
        image_url: row.image_url.clone(),
        header_image_url: row.header_image_url.clone(),
        bio: row.bio.clone(),
        location: row.location.clone(),
    }
}

pub(crate) fn user_summary(row: &UserRow) -> UserSummary {
    UserSummary {
        id: row.id,
        username: row.username.clone(),
        image_url: row.image_url.clone(),
        header_image_url: row.header_image_url.clone(),
        bio: row.bio.clone(),
        location: row.location.clone(),
    }
}

pub(crate) fn message_model(row: MessageRow) -> Message {
    let timestamp = chrono::NaiveDateTime::parse_from_str(&row.timestamp, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", row.timestamp, row.id, e);
            chrono::DateTime::default()
        });

    Message {
        id: row.id,
        text: row.text,
        timestamp,
        author_id: row.user_id,
        author_username: row.author_username,
        author_image_url: row.author_image_url,
        like_count: row.like_count.max(0) as u64,
        liked: row.liked,
    }
}

pub(crate) fn message_models(rows: Vec<MessageRow>) -> Vec<Message> {
    rows.into_iter().map(message_model).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(timestamp: &str) -> MessageRow {
        MessageRow {
            id: 1,
            text: "hi".into(),
            timestamp: timestamp.into(),
            user_id: 2,
            author_username: "testuser".into(),
            author_image_url: "/img.png".into(),
            like_count: 3,
            liked: true,
        }
    }

    #[test]
    fn parses_sqlite_timestamps() {
        let msg = message_model(row("2024-03-01 12:30:45.123"));
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-03-01T12:30:45.123+00:00");

        let msg = message_model(row("2024-03-01 12:30:45"));
        assert_eq!(msg.timestamp.to_rfc3339(), "2024-03-01T12:30:45+00:00");
        assert_eq!(msg.author_id, 2);
        assert_eq!(msg.like_count, 3);
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        let msg = message_model(row("yesterday"));
        assert_eq!(msg.timestamp.timestamp(), 0);
    }
}
