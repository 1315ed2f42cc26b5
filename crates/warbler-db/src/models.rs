//! Row types and the account operations that sit directly on a connection.
//!
//! Row types map straight onto SQLite rows and stay independent of the HTTP
//! view models in `warbler-types`.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::password;

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.jpg";

/// Longest message text accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 140;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    /// Argon2id PHC string, never plaintext.
    pub password: String,
}

impl UserRow {
    /// Compare `plaintext` against the stored hash. A corrupt hash never matches.
    pub fn check_password(&self, plaintext: &str) -> bool {
        password::verify_password(plaintext, &self.password).unwrap_or_else(|e| {
            warn!("Unusable password hash for user {}: {}", self.id, e);
            false
        })
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    /// `YYYY-MM-DD HH:MM:SS.SSS`, UTC.
    pub timestamp: String,
    pub user_id: i64,
    pub author_username: String,
    pub author_image_url: String,
    pub like_count: i64,
    /// Whether the viewer the row was loaded for likes it.
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub likes: i64,
}

/// New values for a profile edit. `None` images keep the current ones.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub image_url: Option<String>,
    pub header_image_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, username, image_url, header_image_url, bio, location, password";

pub(crate) fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        image_url: row.get(3)?,
        header_image_url: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        password: row.get(7)?,
    })
}

pub(crate) fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], user_from_row).optional()?)
}

pub(crate) fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"))?;
    Ok(stmt.query_row([username], user_from_row).optional()?)
}

/// Hash the password and insert a new user on `conn`.
///
/// Callers run this inside a transaction and commit it. A taken username or
/// email surfaces as a constraint violation (see `is_constraint_violation`).
pub fn signup(
    conn: &Connection,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<UserRow> {
    let hashed = password::hash_password(password)?;
    let image_url = image_url.filter(|u| !u.is_empty()).unwrap_or(DEFAULT_IMAGE_URL);

    conn.execute(
        "INSERT INTO users (username, email, password, image_url) VALUES (?1, ?2, ?3, ?4)",
        (username, email, &hashed, image_url),
    )?;

    query_user_by_id(conn, conn.last_insert_rowid())?
        .ok_or_else(|| anyhow::anyhow!("User vanished right after insert"))
}

/// Find the user named `username` whose password matches.
///
/// Unknown usernames and wrong passwords both give `None`.
pub fn authenticate(conn: &Connection, username: &str, password: &str) -> Result<Option<UserRow>> {
    let user = query_user_by_username(conn, username)?;
    Ok(user.filter(|u| u.check_password(password)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, is_constraint_violation};

    fn db_with_user() -> (Database, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .transaction(|tx| signup(tx, "testuser", "test@test.com", "HASHED_PASSWORD", None))
            .unwrap();
        (db, user)
    }

    #[test]
    fn signup_hashes_password_and_applies_defaults() {
        let (_db, user) = db_with_user();

        assert_eq!(user.username, "testuser");
        assert_eq!(user.email, "test@test.com");
        assert_ne!(user.password, "HASHED_PASSWORD");
        assert!(user.password.starts_with("$argon2"));
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(user.header_image_url, DEFAULT_HEADER_IMAGE_URL);
        assert!(user.bio.is_none());
        assert!(user.check_password("HASHED_PASSWORD"));
    }

    #[test]
    fn signup_keeps_a_given_image() {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .transaction(|tx| signup(tx, "pic", "pic@test.com", "password", Some("/me.png")))
            .unwrap();
        assert_eq!(user.image_url, "/me.png");
    }

    #[test]
    fn signup_rejects_duplicate_username_and_email() {
        let (db, _user) = db_with_user();

        let dup_name = db
            .transaction(|tx| signup(tx, "testuser", "other@test.com", "password", None))
            .unwrap_err();
        assert!(is_constraint_violation(&dup_name));

        let dup_email = db
            .transaction(|tx| signup(tx, "other", "test@test.com", "password", None))
            .unwrap_err();
        assert!(is_constraint_violation(&dup_email));

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn authenticate_requires_matching_username_and_password() {
        let (db, user) = db_with_user();

        let found = db
            .with_conn(|c| authenticate(c, "testuser", "HASHED_PASSWORD"))
            .unwrap()
            .expect("valid credentials");
        assert_eq!(found.id, user.id);

        assert!(db.with_conn(|c| authenticate(c, "testuser", "wrong")).unwrap().is_none());
        assert!(db.with_conn(|c| authenticate(c, "nobody", "HASHED_PASSWORD")).unwrap().is_none());
    }

    #[test]
    fn corrupt_hash_never_matches() {
        let (_db, mut user) = db_with_user();
        user.password = "plaintext".into();
        assert!(!user.check_password("plaintext"));
    }
}
