use axum::{debug_handler, extract::State, http::StatusCode, Json};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{auth::Authenticated, db::Principal, ApiPath, AppError, AppResult, AppState};

use super::UserView;

pub async fn friend_ids(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT friend_id FROM friendships WHERE user_id=?")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn are_friends(db_pool: &SqlitePool, user_id: Uuid, other_id: Uuid) -> sqlx::Result<bool> {
    Ok(sqlx::query("SELECT 1 FROM friendships WHERE user_id=? AND friend_id=?")
        .bind(user_id)
        .bind(other_id)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Writes both directions. Runs on the caller's transaction.
pub(super) async fn befriend(conn: &mut SqliteConnection, user_id: Uuid, other_id: Uuid) -> sqlx::Result<()> {
    for (from, to) in [(user_id, other_id), (other_id, user_id)] {
        sqlx::query("INSERT OR IGNORE INTO friendships (user_id,friend_id) VALUES (?,?)")
            .bind(from)
            .bind(to)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Removes both directions at once. `false` if they were not friends.
async fn unfriend(db_pool: &SqlitePool, user_id: Uuid, other_id: Uuid) -> sqlx::Result<bool> {
    let mut tx = db_pool.begin().await?;
    let removed = sqlx::query(
        "DELETE FROM friendships WHERE (user_id=? AND friend_id=?) OR (user_id=? AND friend_id=?)",
    )
    .bind(user_id)
    .bind(other_id)
    .bind(other_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(removed > 0)
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_friends(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<UserView>>> {
    let friends: Vec<Principal> = sqlx::query_as(
        "SELECT u.id,u.email,u.handle,u.password_hash,u.is_active,u.is_staff,u.is_superuser,u.date_joined,u.last_login \
         FROM friendships f JOIN users u ON u.id=f.friend_id WHERE f.user_id=? ORDER BY u.date_joined, u.id",
    )
    .bind(principal.id)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(friends.into_iter().map(UserView::from).collect()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove_friend(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(friend_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    if !unfriend(&db_pool, principal.id, friend_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id = %principal.id, %friend_id, "removed friend");
    Ok(StatusCode::NO_CONTENT)
}
