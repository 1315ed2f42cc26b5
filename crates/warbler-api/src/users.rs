use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use warbler_db::is_constraint_violation;
use warbler_db::models::{ProfileUpdate, UserRow};
use warbler_types::api::{
    FollowListView, LikesView, ProfileEditView, UserAddForm, UserCounts, UserListView,
    UserProfileView, UserSearch,
};

use crate::auth::{AppState, run_db};
use crate::error::ApiError;
use crate::forms::{Validate, optional};
use crate::middleware::AuthUser;
use crate::session::Session;
use crate::views::{message_models, redirect, render, user_model, user_summary};

/// Load a user or fail with 404.
async fn find_user(state: &AppState, user_id: i64) -> Result<UserRow, ApiError> {
    run_db(state, move |db| Ok(db.get_user_by_id(user_id)?))
        .await?
        .ok_or(ApiError::NotFound("User"))
}

/// GET /users?q=: everyone, or usernames containing `q`.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(search): Query<UserSearch>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let query = search.q.filter(|q| !q.is_empty());

    let q = query.clone();
    let rows = run_db(&state, move |db| Ok(db.list_users(q.as_deref())?)).await?;

    let view = UserListView {
        query,
        users: rows.iter().map(user_summary).collect(),
    };
    render(&state, session, jar, view)
}

/// GET /users/{user_id}: profile with counts and newest messages.
pub async fn show_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user = find_user(&state, user_id).await?;

    let viewer_id = viewer.id;
    let (stats, is_following, rows) = run_db(&state, move |db| {
        let stats = db.user_stats(user_id)?;
        let is_following = db.is_following(viewer_id, user_id)?;
        let rows = db.messages_by_user(user_id, Some(viewer_id))?;
        Ok((stats, is_following, rows))
    })
    .await?;

    let view = UserProfileView {
        user: user_summary(&user),
        counts: UserCounts {
            messages: stats.messages.max(0) as u64,
            following: stats.following.max(0) as u64,
            followers: stats.followers.max(0) as u64,
            likes: stats.likes.max(0) as u64,
        },
        is_following,
        messages: message_models(rows),
    };
    render(&state, session, jar, view)
}

/// GET /users/{user_id}/following
pub async fn show_following(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user = find_user(&state, user_id).await?;
    let rows = run_db(&state, move |db| Ok(db.following(user_id)?)).await?;

    let view = FollowListView {
        user: user_summary(&user),
        users: rows.iter().map(user_summary).collect(),
    };
    render(&state, session, jar, view)
}

/// GET /users/{user_id}/followers
pub async fn show_followers(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(user_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user = find_user(&state, user_id).await?;
    let rows = run_db(&state, move |db| Ok(db.followers(user_id)?)).await?;

    let view = FollowListView {
        user: user_summary(&user),
        users: rows.iter().map(user_summary).collect(),
    };
    render(&state, session, jar, view)
}

/// GET /users/{user_id}/likes
pub async fn show_likes(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(viewer)): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user = find_user(&state, user_id).await?;

    let viewer_id = viewer.id;
    let rows = run_db(&state, move |db| Ok(db.liked_messages(user_id, Some(viewer_id))?)).await?;

    let view = LikesView {
        user: user_summary(&user),
        messages: message_models(rows),
    };
    render(&state, session, jar, view)
}

/// POST /users/follow/{follow_id}
pub async fn add_follow(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(follow_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let followed = find_user(&state, follow_id).await?;

    let user_id = user.id;
    if run_db(&state, move |db| Ok(db.follow(user_id, follow_id)?)).await? {
        info!("User {} now follows {}", user.username, followed.username);
    }

    redirect(&state, session, jar, &format!("/users/{}/following", user.id))
}

/// POST /users/stop-following/{follow_id}: unfollowing someone not followed is a no-op.
pub async fn stop_following(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(follow_id): Path<i64>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let followed = find_user(&state, follow_id).await?;

    let user_id = user.id;
    if run_db(&state, move |db| Ok(db.stop_following(user_id, follow_id)?)).await? {
        info!("User {} stopped following {}", user.username, followed.username);
    }

    redirect(&state, session, jar, &format!("/users/{}/following", user.id))
}

/// GET /users/profile: own editable fields.
pub async fn profile_form(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let stats = run_db(&state, move |db| Ok(db.user_stats(user_id)?)).await?;

    let view = ProfileEditView {
        user: user_model(&user),
        num_liked_messages: stats.likes.max(0) as u64,
    };
    render(&state, session, jar, view)
}

/// POST /users/profile: needs the current password again.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
    Form(form): Form<UserAddForm>,
) -> Result<Response, ApiError> {
    form.validate()?;

    let update = ProfileUpdate {
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        image_url: optional(&form.image_url),
        header_image_url: optional(&form.header_image_url),
        bio: optional(&form.bio),
        location: optional(&form.location),
    };

    let user_id = user.id;
    let username = user.username.clone();
    run_db(&state, move |db| {
        if db.authenticate(&username, &form.password)?.is_none() {
            warn!("Profile edit for {} rejected: wrong password", username);
            return Err(ApiError::InvalidPassword);
        }

        db.update_profile(user_id, &update).map_err(|e| {
            if is_constraint_violation(&e) {
                ApiError::Conflict("Username or email already taken")
            } else {
                ApiError::Internal(e)
            }
        })
    })
    .await?;

    info!("User {} updated their profile", user_id);

    redirect(&state, session, jar, &format!("/users/{}", user_id))
}

/// POST /users/delete: log out and remove the account with everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    session.logout();

    let user_id = user.id;
    run_db(&state, move |db| Ok(db.delete_user(user_id)?)).await?;
    info!("User {} (id={}) deleted their account", user.username, user.id);

    redirect(&state, session, jar, "/signup")
}
