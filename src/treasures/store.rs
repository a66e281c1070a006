use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{access::OwnerScope, db::Treasure};

const SELECT: &str = "SELECT t.id,t.creator_id,t.name,t.category,t.description,t.date_added,t.last_modified,\
                      u.handle AS creator_handle,u.email AS creator_email \
                      FROM treasures t JOIN users u ON u.id=t.creator_id";

/// Validated writable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreasureFields {
    pub name: String,
    pub category: String,
    pub description: String,
}

pub async fn find(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<Option<Treasure>> {
    sqlx::query_as(&format!("{SELECT} WHERE t.id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_scoped(db_pool: &SqlitePool, scope: OwnerScope, id: Uuid) -> sqlx::Result<Option<Treasure>> {
    let mut query = QueryBuilder::<Sqlite>::new(SELECT);
    query.push(" WHERE t.id=").push_bind(id).push(" AND ");
    scope.push_filter(&mut query, "t.creator_id");
    query.build_query_as::<Treasure>().fetch_optional(db_pool).await
}

pub async fn count_scoped(db_pool: &SqlitePool, scope: OwnerScope) -> sqlx::Result<i64> {
    let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM treasures t WHERE ");
    scope.push_filter(&mut query, "t.creator_id");
    let (count,): (i64,) = query.build_query_as().fetch_one(db_pool).await?;
    Ok(count)
}

pub async fn list_scoped(db_pool: &SqlitePool, scope: OwnerScope, limit: i64, offset: i64) -> sqlx::Result<Vec<Treasure>> {
    let mut query = QueryBuilder::<Sqlite>::new(SELECT);
    query.push(" WHERE ");
    scope.push_filter(&mut query, "t.creator_id");
    query
        .push(" ORDER BY t.creator_id, t.id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    query.build_query_as::<Treasure>().fetch_all(db_pool).await
}

pub async fn count_by_creator(db_pool: &SqlitePool, creator_id: Uuid) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM treasures WHERE creator_id=?")
        .bind(creator_id)
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

pub async fn list_by_creator(db_pool: &SqlitePool, creator_id: Uuid, limit: i64, offset: i64) -> sqlx::Result<Vec<Treasure>> {
    sqlx::query_as(&format!("{SELECT} WHERE t.creator_id=? ORDER BY t.id LIMIT ? OFFSET ?"))
        .bind(creator_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db_pool)
        .await
}

pub async fn insert(db_pool: &SqlitePool, creator_id: Uuid, fields: &TreasureFields) -> sqlx::Result<Uuid> {
    let id = Uuid::now_v7();
    let now = OffsetDateTime::now_utc();
    sqlx::query(
        "INSERT INTO treasures (id,creator_id,name,category,description,date_added,last_modified) \
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(id)
    .bind(creator_id)
    .bind(&fields.name)
    .bind(&fields.category)
    .bind(&fields.description)
    .bind(now)
    .bind(now)
    .execute(db_pool)
    .await?;
    Ok(id)
}

/// Overwrites every writable field and bumps `last_modified`. The creator never changes.
pub async fn update(db_pool: &SqlitePool, id: Uuid, fields: &TreasureFields) -> sqlx::Result<bool> {
    let updated = sqlx::query("UPDATE treasures SET name=?, category=?, description=?, last_modified=? WHERE id=?")
        .bind(&fields.name)
        .bind(&fields.category)
        .bind(&fields.description)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(updated > 0)
}

/// Comments go with it.
pub async fn delete(db_pool: &SqlitePool, id: Uuid) -> sqlx::Result<bool> {
    let deleted = sqlx::query("DELETE FROM treasures WHERE id=?")
        .bind(id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}
