//! Treasures: named, categorized notes owned by the principal who created them.

mod comments;
pub mod store;

use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    access::{self, Action, OwnerScope, Target, Visibility},
    auth::Authenticated,
    db::{display_name, Principal, Treasure},
    ellipsize,
    pagination::{Page, Pagination},
    ApiJson, ApiPath, AppError, AppResult, AppState, FieldErrors, PREVIEW_CHARS,
};

pub use store::TreasureFields;

pub const NAME_MAX_CHARS: usize = 100;
pub const CATEGORY_MAX_CHARS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/treasures", get(list_treasures).post(create_treasure))
        .route(
            "/treasures/{id}",
            get(get_treasure).put(update_treasure).patch(patch_treasure).delete(delete_treasure),
        )
        .route("/treasures/{id}/comments", get(comments::list_comments).post(comments::create_comment))
        .route("/treasures/{id}/comments/{comment_id}", delete(comments::delete_comment))
}

impl Treasure {
    pub fn creator_display_name(&self) -> String {
        display_name(self.creator_handle.as_deref(), &self.creator_email)
    }

    pub fn short_details(&self) -> String {
        format!("{} - {} by {}", self.name, self.category, self.creator_display_name())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} for {}",
            self.name,
            self.creator_display_name(),
            ellipsize(&self.description, PREVIEW_CHARS)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct TreasureView {
    pub id: Uuid,
    pub name: String,
    pub creator: String,
    pub creator_id: Uuid,
    pub category: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_added: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    pub short_details: String,
    pub summary: String,
}

impl From<Treasure> for TreasureView {
    fn from(treasure: Treasure) -> Self {
        Self {
            creator: treasure.creator_display_name(),
            short_details: treasure.short_details(),
            summary: treasure.summary(),
            id: treasure.id,
            name: treasure.name,
            creator_id: treasure.creator_id,
            category: treasure.category,
            description: treasure.description,
            date_added: treasure.date_added,
            last_modified: treasure.last_modified,
        }
    }
}

/// The only fields a client may write. Anything else in the body, `creator`
/// included, is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct TreasurePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl TreasurePatch {
    /// Full write: `name` is required, the rest default to empty.
    pub fn into_fields(self) -> AppResult<TreasureFields> {
        let mut errors = FieldErrors::new();
        let name = match self.name {
            Some(name) => check_name(&mut errors, name),
            None => {
                errors.add("name", "This field is required.");
                String::new()
            }
        };
        let category = check_category(&mut errors, self.category.unwrap_or_default());
        errors.check()?;

        Ok(TreasureFields { name, category, description: self.description.unwrap_or_default() })
    }

    /// Partial write on top of what is stored.
    pub fn merge_into(self, current: &Treasure) -> AppResult<TreasureFields> {
        let mut errors = FieldErrors::new();
        let name = match self.name {
            Some(name) => check_name(&mut errors, name),
            None => current.name.clone(),
        };
        let category = match self.category {
            Some(category) => check_category(&mut errors, category),
            None => current.category.clone(),
        };
        errors.check()?;

        Ok(TreasureFields {
            name,
            category,
            description: self.description.unwrap_or_else(|| current.description.clone()),
        })
    }
}

fn check_name(errors: &mut FieldErrors, name: String) -> String {
    let name = name.trim().to_owned();
    if name.is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > NAME_MAX_CHARS {
        errors.add("name", format!("Ensure this field has no more than {NAME_MAX_CHARS} characters."));
    }
    name
}

fn check_category(errors: &mut FieldErrors, category: String) -> String {
    let category = category.trim().to_owned();
    if category.chars().count() > CATEGORY_MAX_CHARS {
        errors.add("category", format!("Ensure this field has no more than {CATEGORY_MAX_CHARS} characters."));
    }
    category
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_treasures(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    pages: Pagination,
) -> AppResult<Json<Page<TreasureView>>> {
    let scope = OwnerScope::of(&principal);
    let count = store::count_scoped(&db_pool, scope).await?;
    let (limit, offset) = pages.window(count)?;
    let rows = store::list_scoped(&db_pool, scope, limit, offset).await?;

    Ok(Json(pages.wrap(count, rows.into_iter().map(TreasureView::from).collect())))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_treasure(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiJson(patch): ApiJson<TreasurePatch>,
) -> AppResult<(StatusCode, Json<TreasureView>)> {
    let fields = patch.into_fields()?;
    let id = store::insert(&db_pool, principal.id, &fields).await?;
    tracing::info!(treasure_id = %id, user_id = %principal.id, "created treasure");

    let treasure = store::find(&db_pool, id).await?.ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(treasure.into())))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_treasure(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<TreasureView>> {
    let treasure = store::find_scoped(&db_pool, OwnerScope::of(&principal), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(treasure.into()))
}

/// Loads a treasure the caller may change. Anyone else sees `NotFound`.
async fn load_for_mutation(db_pool: &SqlitePool, principal: &Principal, id: Uuid) -> AppResult<Treasure> {
    let treasure = store::find(db_pool, id).await?.ok_or(AppError::NotFound)?;
    access::authorize(principal, Action::Mutate, &Target::owned_by(treasure.creator_id), Visibility::OwnerScoped)?;
    Ok(treasure)
}

async fn write(db_pool: &SqlitePool, id: Uuid, fields: TreasureFields, by: Uuid) -> AppResult<Json<TreasureView>> {
    if !store::update(db_pool, id, &fields).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(treasure_id = %id, user_id = %by, "updated treasure");

    let treasure = store::find(db_pool, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(treasure.into()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_treasure(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<TreasurePatch>,
) -> AppResult<Json<TreasureView>> {
    let treasure = load_for_mutation(&db_pool, &principal, id).await?;
    let fields = patch.into_fields()?;
    write(&db_pool, treasure.id, fields, principal.id).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn patch_treasure(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<TreasurePatch>,
) -> AppResult<Json<TreasureView>> {
    let treasure = load_for_mutation(&db_pool, &principal, id).await?;
    let fields = patch.merge_into(&treasure)?;
    write(&db_pool, treasure.id, fields, principal.id).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_treasure(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let treasure = load_for_mutation(&db_pool, &principal, id).await?;
    if !store::delete(&db_pool, treasure.id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(treasure_id = %treasure.id, user_id = %principal.id, "deleted treasure");
    Ok(StatusCode::NO_CONTENT)
}
