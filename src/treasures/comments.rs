//! Comments hang off a treasure and are visible to its creator and the creator's friends.
//! They cannot be edited.

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    access::{self, Action, Rule, Target, Visibility},
    auth::Authenticated,
    db::{display_name, Comment, Principal, Treasure},
    ellipsize,
    pagination::{Page, Pagination},
    users::friend_ids,
    ApiJson, ApiPath, AppError, AppResult, AppState, PREVIEW_CHARS,
};

use super::store;

const SELECT: &str = "SELECT c.id,c.treasure_id,c.author_id,c.content,c.date_added,\
                      u.handle AS author_handle,u.email AS author_email \
                      FROM comments c JOIN users u ON u.id=c.author_id";

impl Comment {
    pub fn author_display_name(&self) -> String {
        display_name(self.author_handle.as_deref(), &self.author_email)
    }

    pub fn abbrev(&self) -> String {
        format!("{} said: {}", self.author_display_name(), ellipsize(&self.content, PREVIEW_CHARS))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentView {
    id: Uuid,
    treasure: Uuid,
    author: String,
    author_id: Uuid,
    content: String,
    #[serde(with = "time::serde::rfc3339")]
    date_added: OffsetDateTime,
    abbrev: String,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            author: comment.author_display_name(),
            abbrev: comment.abbrev(),
            id: comment.id,
            treasure: comment.treasure_id,
            author_id: comment.author_id,
            content: comment.content,
            date_added: comment.date_added,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NewComment {
    content: Option<String>,
}

/// The treasure, if the caller may read its thread. Otherwise it does not exist.
async fn visible_treasure(db_pool: &SqlitePool, principal: &Principal, treasure_id: Uuid) -> AppResult<Treasure> {
    let treasure = store::find(db_pool, treasure_id).await?.ok_or(AppError::NotFound)?;
    let target = Target::owned_by(treasure.creator_id)
        .with_owner_friends(friend_ids(db_pool, treasure.creator_id).await?);
    access::authorize(principal, Action::ReadFriendShared, &target, Visibility::OwnerScoped)?;
    Ok(treasure)
}

async fn count(db_pool: &SqlitePool, treasure_id: Uuid) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE treasure_id=?")
        .bind(treasure_id)
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

async fn find(db_pool: &SqlitePool, treasure_id: Uuid, comment_id: Uuid) -> sqlx::Result<Option<Comment>> {
    sqlx::query_as(&format!("{SELECT} WHERE c.id=? AND c.treasure_id=?"))
        .bind(comment_id)
        .bind(treasure_id)
        .fetch_optional(db_pool)
        .await
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_comments(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(treasure_id): ApiPath<Uuid>,
    pages: Pagination,
) -> AppResult<Json<Page<CommentView>>> {
    let treasure = visible_treasure(&db_pool, &principal, treasure_id).await?;

    let count = count(&db_pool, treasure.id).await?;
    let (limit, offset) = pages.window(count)?;
    let comments: Vec<Comment> = sqlx::query_as(&format!(
        "{SELECT} WHERE c.treasure_id=? ORDER BY c.date_added, c.id LIMIT ? OFFSET ?"
    ))
    .bind(treasure.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(pages.wrap(count, comments.into_iter().map(CommentView::from).collect())))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_comment(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(treasure_id): ApiPath<Uuid>,
    ApiJson(NewComment { content }): ApiJson<NewComment>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let treasure = visible_treasure(&db_pool, &principal, treasure_id).await?;

    let content = match content {
        None => return Err(AppError::validation("content", "This field is required.")),
        Some(content) if content.trim().is_empty() => {
            return Err(AppError::validation("content", "This field may not be blank."));
        }
        Some(content) => content,
    };

    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO comments (id,treasure_id,author_id,content,date_added) VALUES (?,?,?,?,?)")
        .bind(id)
        .bind(treasure.id)
        .bind(principal.id)
        .bind(&content)
        .bind(OffsetDateTime::now_utc())
        .execute(&db_pool)
        .await?;
    tracing::info!(comment_id = %id, treasure_id = %treasure.id, user_id = %principal.id, "created comment");

    let comment = find(&db_pool, treasure.id, id).await?.ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// Author or staff. Staff may remove comments from threads they cannot otherwise read.
#[debug_handler(state = AppState)]
pub(crate) async fn delete_comment(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath((treasure_id, comment_id)): ApiPath<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    if Rule::IsStaffOrSuperuser.holds(&principal, &Target::default()) {
        store::find(&db_pool, treasure_id).await?.ok_or(AppError::NotFound)?;
    } else {
        visible_treasure(&db_pool, &principal, treasure_id).await?;
    }

    let comment = find(&db_pool, treasure_id, comment_id).await?.ok_or(AppError::NotFound)?;
    access::authorize(&principal, Action::Mutate, &Target::owned_by(comment.author_id), Visibility::Public)?;

    sqlx::query("DELETE FROM comments WHERE id=?")
        .bind(comment.id)
        .execute(&db_pool)
        .await?;
    tracing::info!(%comment_id, %treasure_id, user_id = %principal.id, "deleted comment");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbrev_truncates_content() {
        let comment = Comment {
            id: Uuid::now_v7(),
            treasure_id: Uuid::now_v7(),
            author_id: Uuid::nil(),
            content: "z".repeat(51),
            date_added: OffsetDateTime::now_utc(),
            author_handle: Some("Unknown Author".to_owned()),
            author_email: "unknown-author@invalid".to_owned(),
        };
        assert_eq!(comment.abbrev(), format!("Unknown Author said: {}...", "z".repeat(50)));
    }
}
