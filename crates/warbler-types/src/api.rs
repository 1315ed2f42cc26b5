use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Flash, Message, User, UserSummary};

// -- Forms --
//
// Browsers submit every field, empty or not, so forms default missing fields
// to "" and leave presence checks to validation.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageForm {
    pub text: String,
}

/// Signup and profile-edit form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserAddForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
    pub location: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

/// Field name -> messages for every failed check.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// -- Views --

/// Envelope for every JSON view: drained flashes plus the page body.
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub flashes: Vec<Flash>,
    #[serde(flatten)]
    pub view: T,
}

#[derive(Debug, Serialize)]
pub struct FormView {
    pub form: &'static str,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HomeView {
    Anonymous,
    Feed { messages: Vec<Message> },
}

#[derive(Debug, Serialize)]
pub struct UserListView {
    pub query: Option<String>,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UserCounts {
    pub messages: u64,
    pub following: u64,
    pub followers: u64,
    pub likes: u64,
}

#[derive(Debug, Serialize)]
pub struct UserProfileView {
    pub user: UserSummary,
    pub counts: UserCounts,
    /// Whether the viewing user follows this profile.
    pub is_following: bool,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct FollowListView {
    pub user: UserSummary,
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct LikesView {
    pub user: UserSummary,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ProfileEditView {
    pub user: User,
    pub num_liked_messages: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub message: Message,
}

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}
