//! Principals as a public resource, plus friendships built on top of them.

mod friends;
mod requests;
pub mod store;

use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    access::{self, Action, Target, Visibility},
    appresult::unique_violation,
    auth::{normalize_handle, Authenticated, HANDLE_MAX_CHARS},
    db::Principal,
    pagination::{Page, Pagination},
    treasures::{self, TreasureView},
    ApiJson, ApiPath, AppError, AppResult, AppState,
};

pub use friends::{are_friends, friend_ids};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(me))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).patch(patch_user).delete(delete_user),
        )
        .route("/users/{id}/treasures", get(user_treasures))
        .route("/friends", get(friends::list_friends))
        .route("/friends/{id}", delete(friends::remove_friend))
        .route("/friend-requests", get(requests::list_requests).post(requests::send_request))
        .route("/friend-requests/{id}/accept", post(requests::accept_request))
        .route("/friend-requests/{id}/reject", post(requests::reject_request))
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub handle: Option<String>,
    pub email: String,
    pub display_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<Principal> for UserView {
    fn from(principal: Principal) -> Self {
        Self {
            display_name: principal.display_name(),
            id: principal.id,
            handle: principal.handle,
            email: principal.email,
            date_joined: principal.date_joined,
            last_login: principal.last_login,
        }
    }
}

/// Mutable profile fields. `handle` distinguishes absent from `null`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserPatch {
    #[serde(default, deserialize_with = "present")]
    pub(crate) handle: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_users(
    Authenticated(_): Authenticated,
    State(db_pool): State<SqlitePool>,
    pages: Pagination,
) -> AppResult<Json<Page<UserView>>> {
    let count = store::count(&db_pool).await?;
    let (limit, offset) = pages.window(count)?;
    let users = store::list(&db_pool, limit, offset).await?;

    Ok(Json(pages.wrap(count, users.into_iter().map(UserView::from).collect())))
}

#[debug_handler]
pub(crate) async fn create_user() -> AppError {
    AppError::MethodNotAllowed("Use the signup endpoint instead.")
}

#[debug_handler(state = AppState)]
pub(crate) async fn me(Authenticated(principal): Authenticated) -> Json<UserView> {
    Json(principal.into())
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_user(
    Authenticated(_): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<UserView>> {
    let user = store::find(&db_pool, user_id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

/// PUT replaces the profile: a missing handle clears it.
#[debug_handler(state = AppState)]
pub(crate) async fn update_user(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> AppResult<Json<UserView>> {
    let handle = patch.handle.unwrap_or(None);
    apply_patch(&db_pool, &principal, user_id, UserPatch { handle: Some(handle) }).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn patch_user(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> AppResult<Json<UserView>> {
    apply_patch(&db_pool, &principal, user_id, patch).await
}

async fn apply_patch(
    db_pool: &SqlitePool,
    principal: &Principal,
    user_id: Uuid,
    patch: UserPatch,
) -> AppResult<Json<UserView>> {
    let user = store::find(db_pool, user_id).await?.ok_or(AppError::NotFound)?;
    access::authorize(principal, Action::Mutate, &Target::owned_by(user.id), Visibility::Public)?;

    let Some(handle) = patch.handle else {
        return Ok(Json(user.into()));
    };
    let handle = normalize_handle(handle.as_deref());
    if let Some(handle) = &handle {
        if handle.chars().count() > HANDLE_MAX_CHARS {
            return Err(AppError::validation(
                "handle",
                format!("Ensure this field has no more than {HANDLE_MAX_CHARS} characters."),
            ));
        }
        if store::handle_taken(db_pool, handle, Some(user.id)).await? {
            return Err(AppError::validation("handle", "user with this handle already exists."));
        }
    }

    if let Err(err) = store::set_handle(db_pool, user.id, handle.as_deref()).await {
        return Err(match unique_violation(&err).as_deref() {
            Some("handle") => AppError::Conflict { field: "handle", reason: "user with this handle already exists.".to_owned() },
            _ => err.into(),
        });
    }
    tracing::info!(user_id = %user.id, by = %principal.id, "updated handle");

    let user = store::find(db_pool, user.id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_user(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let user = store::find(&db_pool, user_id).await?.ok_or(AppError::NotFound)?;
    access::authorize(&principal, Action::AdminOverride, &Target::owned_by(user.id), Visibility::Public)?;

    if !store::delete(&db_pool, user.id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id = %user.id, by = %principal.id, "deleted user");
    Ok(StatusCode::NO_CONTENT)
}

/// Someone's treasures, visible to them and their friends.
#[debug_handler(state = AppState)]
pub(crate) async fn user_treasures(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(user_id): ApiPath<Uuid>,
    pages: Pagination,
) -> AppResult<Json<Page<TreasureView>>> {
    let user = store::find(&db_pool, user_id).await?.ok_or(AppError::NotFound)?;
    let target = Target::owned_by(user.id).with_owner_friends(friend_ids(&db_pool, user.id).await?);
    access::authorize(&principal, Action::ReadFriendShared, &target, Visibility::Public)?;

    let count = treasures::store::count_by_creator(&db_pool, user.id).await?;
    let (limit, offset) = pages.window(count)?;
    let rows = treasures::store::list_by_creator(&db_pool, user.id, limit, offset).await?;

    Ok(Json(pages.wrap(count, rows.into_iter().map(TreasureView::from).collect())))
}
