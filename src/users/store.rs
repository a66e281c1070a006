use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{Principal, UNKNOWN_AUTHOR_ID};

const COLUMNS: &str = "id,email,handle,password_hash,is_active,is_staff,is_superuser,date_joined,last_login";

pub async fn find(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<Option<Principal>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE id=? AND id<>?"))
        .bind(id)
        .bind(UNKNOWN_AUTHOR_ID)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_active(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<Option<Principal>> {
    Ok(find(db_pool, id).await?.filter(|principal| principal.is_active))
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> sqlx::Result<Option<Principal>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE email=? AND id<>?"))
        .bind(email)
        .bind(UNKNOWN_AUTHOR_ID)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_by_handle(db_pool: &SqlitePool, handle: &str) -> sqlx::Result<Option<Principal>> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM users WHERE handle=? AND id<>?"))
        .bind(handle)
        .bind(UNKNOWN_AUTHOR_ID)
        .fetch_optional(db_pool)
        .await
}

pub async fn email_taken(db_pool: &SqlitePool, email: &str) -> sqlx::Result<bool> {
    Ok(sqlx::query("SELECT 1 FROM users WHERE email=?")
        .bind(email)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// `except` lets a principal keep its own handle on update.
pub async fn handle_taken(db_pool: &SqlitePool, handle: &str, except: Option<Uuid>) -> sqlx::Result<bool> {
    Ok(sqlx::query("SELECT 1 FROM users WHERE handle=? AND id<>?")
        .bind(handle)
        .bind(except.unwrap_or(UNKNOWN_AUTHOR_ID))
        .fetch_optional(db_pool)
        .await?
        .is_some()
        || handle == crate::db::UNKNOWN_AUTHOR_NAME)
}

pub async fn insert(db_pool: &SqlitePool, principal: &Principal) -> sqlx::Result<()> {
    sqlx::query(&format!("INSERT INTO users ({COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?)"))
        .bind(principal.id)
        .bind(&principal.email)
        .bind(&principal.handle)
        .bind(&principal.password_hash)
        .bind(principal.is_active)
        .bind(principal.is_staff)
        .bind(principal.is_superuser)
        .bind(principal.date_joined)
        .bind(principal.last_login)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<OffsetDateTime> {
    let now = OffsetDateTime::now_utc();
    sqlx::query("UPDATE users SET last_login=? WHERE id=?")
        .bind(now)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(now)
}

pub async fn set_handle(db_pool: &SqlitePool, id: Uuid, handle: Option<&str>) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET handle=? WHERE id=?")
        .bind(handle)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn count(db_pool: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id<>?")
        .bind(UNKNOWN_AUTHOR_ID)
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

pub async fn list(db_pool: &SqlitePool, limit: i64, offset: i64) -> sqlx::Result<Vec<Principal>> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM users WHERE id<>? ORDER BY date_joined, id LIMIT ? OFFSET ?"
    ))
    .bind(UNKNOWN_AUTHOR_ID)
    .bind(limit)
    .bind(offset)
    .fetch_all(db_pool)
    .await
}

/// Hands the principal's comments to the placeholder author, then deletes the
/// principal; treasures, friendships and requests go with it.
pub async fn delete(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<bool> {
    let mut tx = db_pool.begin().await?;

    let redacted = sqlx::query("UPDATE comments SET author_id=? WHERE author_id=?")
        .bind(UNKNOWN_AUTHOR_ID)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let deleted = sqlx::query("DELETE FROM users WHERE id=? AND id<>?")
        .bind(id)
        .bind(UNKNOWN_AUTHOR_ID)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    tracing::debug!(user_id = %id, redacted, deleted, "deleted principal");
    Ok(deleted > 0)
}
