use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, SqlitePool,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;

/// Stand-in author for comments whose principal was deleted.
pub const UNKNOWN_AUTHOR_ID: Uuid = Uuid::nil();
pub const UNKNOWN_AUTHOR_NAME: &str = "Unknown Author";

const SCHEMA: &[&str] = &[
    // unique: id, email, handle (when not null)
    r#"CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY NOT NULL,
        email TEXT NOT NULL UNIQUE,
        handle TEXT UNIQUE,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        is_staff BOOLEAN NOT NULL DEFAULT 0,
        is_superuser BOOLEAN NOT NULL DEFAULT 0,
        date_joined TEXT NOT NULL,
        last_login TEXT
    )"#,
    // both directions of every friendship are stored
    r#"CREATE TABLE IF NOT EXISTS friendships (
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        friend_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, friend_id),
        CHECK (user_id <> friend_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS friendship_requests (
        id BLOB PRIMARY KEY NOT NULL,
        sender_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        receiver_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        date_sent TEXT NOT NULL,
        date_responded TEXT,
        accepted BOOLEAN NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS treasures (
        id BLOB PRIMARY KEY NOT NULL,
        creator_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        date_added TEXT NOT NULL,
        last_modified TEXT NOT NULL
    )"#,
    // author_id has no ON DELETE action: deleting a principal must redact first
    r#"CREATE TABLE IF NOT EXISTS comments (
        id BLOB PRIMARY KEY NOT NULL,
        treasure_id BLOB NOT NULL REFERENCES treasures(id) ON DELETE CASCADE,
        author_id BLOB NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        date_added TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS treasures_creator ON treasures (creator_id)",
    "CREATE INDEX IF NOT EXISTS comments_treasure ON comments (treasure_id)",
    "CREATE INDEX IF NOT EXISTS friendship_requests_receiver ON friendship_requests (receiver_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS friendship_requests_pending ON friendship_requests (sender_id, receiver_id) \
        WHERE date_responded IS NULL",
];

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // an in-memory database lives exactly as long as its one connection
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init(&db_pool).await?;
    Ok(db_pool)
}

/// Creates missing tables and the placeholder author. Safe to run on every start.
pub async fn init(db_pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }

    sqlx::query(
        "INSERT OR IGNORE INTO users (id,email,handle,password_hash,is_active,is_staff,is_superuser,date_joined) \
         VALUES (?,?,?,'!',0,0,0,?)",
    )
    .bind(UNKNOWN_AUTHOR_ID)
    .bind("unknown-author@invalid")
    .bind(UNKNOWN_AUTHOR_NAME)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await?;

    Ok(())
}

/// Handle when set, otherwise the local part of the email.
pub fn display_name(handle: Option<&str>, email: &str) -> String {
    match handle {
        Some(handle) if !handle.is_empty() => handle.to_owned(),
        _ => email.split('@').next().unwrap_or(email).to_owned(),
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub handle: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
}

impl Principal {
    pub fn display_name(&self) -> String {
        display_name(self.handle.as_deref(), &self.email)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Treasure {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub category: String,
    pub description: String,
    pub date_added: OffsetDateTime,
    pub last_modified: OffsetDateTime,

    // joined from users
    pub creator_handle: Option<String>,
    pub creator_email: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub treasure_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub date_added: OffsetDateTime,

    // joined from users
    pub author_handle: Option<String>,
    pub author_email: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FriendshipRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub date_sent: OffsetDateTime,
    pub date_responded: Option<OffsetDateTime>,
    pub accepted: bool,
}

impl FriendshipRequest {
    pub fn is_pending(&self) -> bool {
        self.date_responded.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_handle() {
        assert_eq!(display_name(Some("digger"), "dig@example.com"), "digger");
        assert_eq!(display_name(None, "dig@example.com"), "dig");
        assert_eq!(display_name(Some(""), "dig@example.com"), "dig");
    }

    #[tokio::test]
    async fn init_is_idempotent() -> anyhow::Result<()> {
        let db_pool = connect(&Config::relaxed()).await?;
        init(&db_pool).await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id=?")
            .bind(UNKNOWN_AUTHOR_ID)
            .fetch_one(&db_pool)
            .await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn one_pending_request_per_direction() -> anyhow::Result<()> {
        let db_pool = connect(&Config::relaxed()).await?;
        let insert = |responded: Option<OffsetDateTime>| {
            sqlx::query(
                "INSERT INTO friendship_requests (id,sender_id,receiver_id,date_sent,date_responded) VALUES (?,?,?,?,?)",
            )
            .bind(Uuid::now_v7())
            .bind(UNKNOWN_AUTHOR_ID)
            .bind(UNKNOWN_AUTHOR_ID)
            .bind(OffsetDateTime::now_utc())
            .bind(responded)
        };

        insert(Some(OffsetDateTime::now_utc())).execute(&db_pool).await?;
        insert(None).execute(&db_pool).await?;
        let err = insert(None).execute(&db_pool).await.unwrap_err();
        assert!(crate::appresult::unique_violation(&err).is_some());
        Ok(())
    }
}
