use crate::Database;
use crate::models::{self, MessageRow, ProfileUpdate, USER_COLUMNS, UserRow, UserStats};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

/// Cap on every message listing.
pub const FEED_LIMIT: i64 = 100;

// ?1 is always the viewing user (NULL for anonymous), used for `liked`.
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url,
           (SELECT COUNT(*) FROM likes l WHERE l.message_id = m.id),
           EXISTS (SELECT 1 FROM likes l WHERE l.message_id = m.id AND l.user_id = ?1)
    FROM messages m
    JOIN users u ON u.id = m.user_id";

impl Database {
    // -- Users --

    /// Create an account in its own transaction.
    pub fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
        image_url: Option<&str>,
    ) -> Result<UserRow> {
        self.transaction(|tx| models::signup(tx, username, email, password, image_url))
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| models::authenticate(conn, username, password))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| models::query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| models::query_user_by_username(conn, username))
    }

    /// All users, or those whose username contains `search` (case-sensitive,
    /// `%` and `_` taken literally).
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE ?1 IS NULL OR instr(username, ?1) > 0
                 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([search], models::user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET username = ?2,
                     email = ?3,
                     image_url = COALESCE(?4, image_url),
                     header_image_url = COALESCE(?5, header_image_url),
                     bio = ?6,
                     location = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.username,
                    update.email,
                    update.image_url,
                    update.header_image_url,
                    update.bio,
                    update.location,
                ],
            )?;
            Ok(())
        })
    }

    /// Delete a user. Messages, likes and follow edges go with it.
    /// Returns false when there was no such user.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn user_stats(&self, id: i64) -> Result<UserStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                        (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                        (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                        (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |row| {
                    Ok(UserStats {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    // -- Follows --

    /// Make `follower_id` follow `followed_id`. Following twice is a no-op;
    /// returns whether a new edge was written.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (user_being_followed_id, user_following_id)
                 VALUES (?1, ?2)",
                [followed_id, follower_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove the edge if present; returns whether one was removed.
    pub fn stop_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE user_being_followed_id = ?1 AND user_following_id = ?2",
                [followed_id, follower_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_follow_edges(conn, "user_following_id", "user_being_followed_id", user_id)
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            query_follow_edges(conn, "user_being_followed_id", "user_following_id", user_id)
        })
    }

    /// Does `user_id` follow `other_id`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| edge_exists(conn, user_id, other_id))
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| edge_exists(conn, other_id, user_id))
    }

    // -- Messages --

    pub fn create_message(&self, user_id: i64, text: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (text, user_id) VALUES (?1, ?2)",
                rusqlite::params![text, user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: i64, viewer: Option<i64>) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?2"))?;
            Ok(stmt.query_row(rusqlite::params![viewer, id], message_from_row).optional()?)
        })
    }

    /// Returns false when there was no such message. Its likes go with it.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    /// Newest messages written by `user_id`.
    pub fn messages_by_user(&self, user_id: i64, viewer: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?2
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?3"
                ),
                rusqlite::params![viewer, user_id, FEED_LIMIT],
            )
        })
    }

    /// Newest messages by `user_id` and everyone they follow.
    pub fn home_feed(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE m.user_id = ?2
                        OR m.user_id IN (SELECT user_being_followed_id FROM follows
                                         WHERE user_following_id = ?2)
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?3"
                ),
                rusqlite::params![user_id, user_id, FEED_LIMIT],
            )
        })
    }

    // -- Likes --

    /// Like the message if `user_id` hasn't yet, unlike it otherwise.
    /// Returns true when the message is now liked.
    pub fn toggle_like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.transaction(|tx| {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM likes WHERE user_id = ?1 AND message_id = ?2",
                    [user_id, message_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(like_id) = existing {
                tx.execute("DELETE FROM likes WHERE id = ?1", [like_id])?;
                Ok(false)
            } else {
                tx.execute(
                    "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
                    [user_id, message_id],
                )?;
                Ok(true)
            }
        })
    }

    /// Messages `user_id` has liked, newest first.
    pub fn liked_messages(&self, user_id: i64, viewer: Option<i64>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT}
                     JOIN likes lk ON lk.message_id = m.id
                     WHERE lk.user_id = ?2
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?3"
                ),
                rusqlite::params![viewer, user_id, FEED_LIMIT],
            )
        })
    }
}

fn query_follow_edges(
    conn: &Connection,
    from_column: &str,
    to_column: &str,
    user_id: i64,
) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.email, u.username, u.image_url, u.header_image_url, u.bio, u.location, u.password
         FROM follows f
         JOIN users u ON u.id = f.{to_column}
         WHERE f.{from_column} = ?1
         ORDER BY u.username"
    ))?;

    let rows = stmt
        .query_map([user_id], models::user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn edge_exists(conn: &Connection, follower_id: i64, followed_id: i64) -> Result<bool> {
    let found = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM follows
                        WHERE user_following_id = ?1 AND user_being_followed_id = ?2)",
        [follower_id, followed_id],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
        like_count: row.get(6)?,
        liked: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserRow, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let u1 = db.signup("test1", "email1@email.com", "password", None).unwrap();
        let u2 = db.signup("test2", "email2@email.com", "password", None).unwrap();
        (db, u1, u2)
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|c| Ok(c.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn new_user_has_no_relationships() {
        let (db, u1, _u2) = setup();

        assert!(db.messages_by_user(u1.id, None).unwrap().is_empty());
        assert!(db.following(u1.id).unwrap().is_empty());
        assert!(db.followers(u1.id).unwrap().is_empty());
        assert_eq!(db.user_stats(u1.id).unwrap(), UserStats::default());
    }

    #[test]
    fn follow_is_directional() {
        let (db, u1, u2) = setup();

        assert!(db.follow(u1.id, u2.id).unwrap());

        assert!(db.is_following(u1.id, u2.id).unwrap());
        assert!(!db.is_following(u2.id, u1.id).unwrap());
        assert!(db.is_followed_by(u2.id, u1.id).unwrap());
        assert!(!db.is_followed_by(u1.id, u2.id).unwrap());

        let following: Vec<i64> = db.following(u1.id).unwrap().iter().map(|u| u.id).collect();
        let followers: Vec<i64> = db.followers(u2.id).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(following, vec![u2.id]);
        assert_eq!(followers, vec![u1.id]);
        assert!(db.followers(u1.id).unwrap().is_empty());
    }

    #[test]
    fn follow_twice_and_unfollow_absent_edge_are_no_ops() {
        let (db, u1, u2) = setup();

        assert!(db.follow(u1.id, u2.id).unwrap());
        assert!(!db.follow(u1.id, u2.id).unwrap());
        assert_eq!(count(&db, "follows"), 1);

        assert!(db.stop_following(u1.id, u2.id).unwrap());
        assert!(!db.stop_following(u1.id, u2.id).unwrap());
        assert!(!db.is_following(u1.id, u2.id).unwrap());
    }

    #[test]
    fn message_text_is_bounded() {
        let (db, u1, _u2) = setup();

        assert!(db.create_message(u1.id, "").is_err());
        assert!(db.create_message(u1.id, &"x".repeat(141)).is_err());
        // Length counts characters, not bytes.
        assert!(db.create_message(u1.id, &"é".repeat(140)).is_ok());
    }

    #[test]
    fn message_belongs_to_user() {
        let (db, u1, _u2) = setup();

        let id = db.create_message(u1.id, "Hello").unwrap();
        let msg = db.get_message(id, None).unwrap().unwrap();
        assert_eq!(msg.text, "Hello");
        assert_eq!(msg.user_id, u1.id);
        assert_eq!(msg.author_username, "test1");
        assert_eq!(msg.like_count, 0);
        assert!(!msg.liked);

        assert!(db.get_message(id + 100, None).unwrap().is_none());
        assert!(db.create_message(9999, "orphan").is_err());
    }

    #[test]
    fn toggle_like_flips_state() {
        let (db, u1, u2) = setup();
        let id = db.create_message(u2.id, "like me").unwrap();

        assert!(db.toggle_like(u1.id, id).unwrap());
        let msg = db.get_message(id, Some(u1.id)).unwrap().unwrap();
        assert!(msg.liked);
        assert_eq!(msg.like_count, 1);
        assert!(!db.get_message(id, Some(u2.id)).unwrap().unwrap().liked);

        assert!(!db.toggle_like(u1.id, id).unwrap());
        assert_eq!(count(&db, "likes"), 0);

        assert!(db.toggle_like(u1.id, id).unwrap());
        assert_eq!(count(&db, "likes"), 1);
    }

    #[test]
    fn double_like_is_rejected_by_storage() {
        let (db, u1, u2) = setup();
        let id = db.create_message(u2.id, "once").unwrap();
        db.toggle_like(u1.id, id).unwrap();

        let err = db
            .with_conn(|c| {
                c.execute("INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)", [u1.id, id])?;
                Ok(())
            })
            .unwrap_err();
        assert!(crate::is_constraint_violation(&err));
    }

    #[test]
    fn liked_messages_lists_only_liked() {
        let (db, u1, u2) = setup();
        let liked = db.create_message(u2.id, "liked").unwrap();
        db.create_message(u2.id, "ignored").unwrap();
        db.toggle_like(u1.id, liked).unwrap();

        let msgs = db.liked_messages(u1.id, Some(u1.id)).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, liked);
        assert!(msgs[0].liked);
        assert_eq!(db.user_stats(u1.id).unwrap().likes, 1);
    }

    #[test]
    fn home_feed_covers_self_and_followed_newest_first() {
        let (db, u1, u2) = setup();
        let u3 = db.signup("test3", "email3@email.com", "password", None).unwrap();

        let own = db.create_message(u1.id, "mine").unwrap();
        let followed = db.create_message(u2.id, "theirs").unwrap();
        db.create_message(u3.id, "stranger").unwrap();
        db.follow(u1.id, u2.id).unwrap();

        let ids: Vec<i64> = db.home_feed(u1.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![followed, own]);
    }

    #[test]
    fn feeds_are_capped() {
        let (db, u1, _u2) = setup();
        for i in 0..(FEED_LIMIT + 5) {
            db.create_message(u1.id, &format!("message {i}")).unwrap();
        }

        let msgs = db.messages_by_user(u1.id, None).unwrap();
        assert_eq!(msgs.len(), FEED_LIMIT as usize);
        assert_eq!(msgs[0].text, format!("message {}", FEED_LIMIT + 4));
        assert_eq!(db.home_feed(u1.id).unwrap().len(), FEED_LIMIT as usize);
    }

    #[test]
    fn deleting_user_cascades() {
        let (db, u1, u2) = setup();
        let own = db.create_message(u1.id, "mine").unwrap();
        let other = db.create_message(u2.id, "theirs").unwrap();
        db.toggle_like(u1.id, other).unwrap();
        db.toggle_like(u2.id, own).unwrap();
        db.follow(u1.id, u2.id).unwrap();
        db.follow(u2.id, u1.id).unwrap();

        assert!(db.delete_user(u1.id).unwrap());

        assert!(db.get_user_by_id(u1.id).unwrap().is_none());
        assert!(db.get_message(own, None).unwrap().is_none());
        assert_eq!(count(&db, "messages"), 1);
        assert_eq!(count(&db, "likes"), 0);
        assert_eq!(count(&db, "follows"), 0);
        assert!(!db.delete_user(u1.id).unwrap());
    }

    #[test]
    fn deleting_message_drops_its_likes() {
        let (db, u1, u2) = setup();
        let id = db.create_message(u2.id, "short-lived").unwrap();
        db.toggle_like(u1.id, id).unwrap();

        assert!(db.delete_message(id).unwrap());
        assert_eq!(count(&db, "likes"), 0);
        assert!(!db.delete_message(id).unwrap());
    }

    #[test]
    fn search_matches_substring_literally() {
        let (db, _u1, _u2) = setup();
        db.signup("under_score", "us@email.com", "password", None).unwrap();

        assert_eq!(db.list_users(None).unwrap().len(), 3);

        let names: Vec<String> =
            db.list_users(Some("test")).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["test1", "test2"]);

        let names: Vec<String> =
            db.list_users(Some("_")).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["under_score"]);

        assert!(db.list_users(Some("%")).unwrap().is_empty());
        assert!(db.list_users(Some("TEST")).unwrap().is_empty());
    }

    #[test]
    fn profile_update_keeps_images_when_unset() {
        let (db, u1, u2) = setup();

        db.update_profile(
            u1.id,
            &ProfileUpdate {
                username: "renamed".into(),
                email: "new@email.com".into(),
                image_url: None,
                header_image_url: Some("/header.png".into()),
                bio: Some("hi".into()),
                location: None,
            },
        )
        .unwrap();

        let user = db.get_user_by_id(u1.id).unwrap().unwrap();
        assert_eq!(user.username, "renamed");
        assert_eq!(user.email, "new@email.com");
        assert_eq!(user.image_url, models::DEFAULT_IMAGE_URL);
        assert_eq!(user.header_image_url, "/header.png");
        assert_eq!(user.bio.as_deref(), Some("hi"));

        let clash = db
            .update_profile(
                u1.id,
                &ProfileUpdate {
                    username: u2.username.clone(),
                    email: "new@email.com".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(crate::is_constraint_violation(&clash));
    }
}
