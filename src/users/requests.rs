//! Friend requests: pending until the receiver accepts or rejects, then frozen.

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    access::OwnerScope,
    appresult::unique_violation,
    auth::{normalize_email, normalize_handle, Authenticated},
    db::FriendshipRequest,
    ApiJson, ApiPath, AppError, AppResult, AppState,
};

use super::{are_friends, friends, store};

const COLUMNS: &str = "id,sender_id,receiver_id,date_sent,date_responded,accepted";

#[derive(Debug, Serialize)]
pub(crate) struct RequestView {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    date_sent: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    date_responded: Option<OffsetDateTime>,
    accepted: bool,
    status: &'static str,
}

impl From<FriendshipRequest> for RequestView {
    fn from(request: FriendshipRequest) -> Self {
        let status = match (request.is_pending(), request.accepted) {
            (true, _) => "pending",
            (false, true) => "accepted",
            (false, false) => "rejected",
        };
        Self {
            id: request.id,
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            date_sent: request.date_sent,
            date_responded: request.date_responded,
            accepted: request.accepted,
            status,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingRequests {
    received: Vec<RequestView>,
    sent: Vec<RequestView>,
}

/// Names the receiver by handle or by email.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct NewRequest {
    handle: Option<String>,
    email: Option<String>,
}

async fn pending_where(db_pool: &SqlitePool, column: &str, user_id: Uuid) -> sqlx::Result<Vec<RequestView>> {
    let rows: Vec<FriendshipRequest> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM friendship_requests WHERE {column}=? AND date_responded IS NULL ORDER BY date_sent, id"
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;
    Ok(rows.into_iter().map(RequestView::from).collect())
}

async fn pending_between(db_pool: &SqlitePool, user_id: Uuid, other_id: Uuid) -> sqlx::Result<bool> {
    Ok(sqlx::query(
        "SELECT 1 FROM friendship_requests WHERE date_responded IS NULL \
         AND ((sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?))",
    )
    .bind(user_id)
    .bind(other_id)
    .bind(other_id)
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?
    .is_some())
}

/// Only requests addressed to the caller are visible here.
async fn find_received(db_pool: &SqlitePool, scope: OwnerScope, request_id: Uuid) -> sqlx::Result<Option<FriendshipRequest>> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM friendship_requests WHERE id="));
    query.push_bind(request_id).push(" AND ");
    scope.push_filter(&mut query, "receiver_id");
    query.build_query_as::<FriendshipRequest>().fetch_optional(db_pool).await
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_requests(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<PendingRequests>> {
    Ok(Json(PendingRequests {
        received: pending_where(&db_pool, "receiver_id", principal.id).await?,
        sent: pending_where(&db_pool, "sender_id", principal.id).await?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_request(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiJson(NewRequest { handle, email }): ApiJson<NewRequest>,
) -> AppResult<(StatusCode, Json<RequestView>)> {
    let receiver = match (normalize_handle(handle.as_deref()), email.as_deref().map(str::trim)) {
        (Some(handle), _) => store::find_by_handle(&db_pool, &handle).await?,
        (None, Some(email)) if !email.is_empty() => match normalize_email(email) {
            Some(email) => store::find_by_email(&db_pool, &email).await?,
            None => return Err(AppError::validation("email", "Enter a valid email address.")),
        },
        _ => return Err(AppError::validation("non_field_errors", "Provide the receiver's handle or email.")),
    };
    let receiver = receiver.filter(|receiver| receiver.is_active).ok_or(AppError::NotFound)?;

    if receiver.id == principal.id {
        return Err(AppError::validation("non_field_errors", "You cannot send a friend request to yourself."));
    }
    if are_friends(&db_pool, principal.id, receiver.id).await? {
        return Err(AppError::Conflict { field: "non_field_errors", reason: "You are already friends.".to_owned() });
    }
    if pending_between(&db_pool, principal.id, receiver.id).await? {
        return Err(already_pending());
    }

    let request = FriendshipRequest {
        id: Uuid::now_v7(),
        sender_id: principal.id,
        receiver_id: receiver.id,
        date_sent: OffsetDateTime::now_utc(),
        date_responded: None,
        accepted: false,
    };
    sqlx::query(&format!("INSERT INTO friendship_requests ({COLUMNS}) VALUES (?,?,?,?,?,?)"))
        .bind(request.id)
        .bind(request.sender_id)
        .bind(request.receiver_id)
        .bind(request.date_sent)
        .bind(request.date_responded)
        .bind(request.accepted)
        .execute(&db_pool)
        .await
        .map_err(|err| match unique_violation(&err) {
            Some(_) => already_pending(),
            None => err.into(),
        })?;
    tracing::info!(request_id = %request.id, sender_id = %request.sender_id, receiver_id = %request.receiver_id, "friend request sent");

    Ok((StatusCode::CREATED, Json(request.into())))
}

fn already_pending() -> AppError {
    AppError::Conflict { field: "non_field_errors", reason: "A pending friend request already exists.".to_owned() }
}

#[debug_handler(state = AppState)]
pub(crate) async fn accept_request(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(request_id): ApiPath<Uuid>,
) -> AppResult<Json<RequestView>> {
    respond(&db_pool, OwnerScope::of(&principal), request_id, true).await.map(Json)
}

#[debug_handler(state = AppState)]
pub(crate) async fn reject_request(
    Authenticated(principal): Authenticated,
    State(db_pool): State<SqlitePool>,
    ApiPath(request_id): ApiPath<Uuid>,
) -> AppResult<Json<RequestView>> {
    respond(&db_pool, OwnerScope::of(&principal), request_id, false).await.map(Json)
}

/// Marks the request and, on accept, writes the friendship in the same transaction.
async fn respond(db_pool: &SqlitePool, scope: OwnerScope, request_id: Uuid, accept: bool) -> AppResult<RequestView> {
    let mut request = find_received(db_pool, scope, request_id).await?.ok_or(AppError::NotFound)?;
    if !request.is_pending() {
        return Err(already_responded());
    }

    let now = OffsetDateTime::now_utc();
    let mut tx = db_pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE friendship_requests SET accepted=?, date_responded=? WHERE id=? AND date_responded IS NULL",
    )
    .bind(accept)
    .bind(now)
    .bind(request.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if updated == 0 {
        // lost a race with another response
        return Err(already_responded());
    }
    if accept {
        friends::befriend(&mut *tx, request.sender_id, request.receiver_id).await?;
    }
    tx.commit().await?;

    request.accepted = accept;
    request.date_responded = Some(now);
    tracing::info!(%request_id, accepted = accept, receiver_id = %request.receiver_id, "friend request answered");
    Ok(request.into())
}

fn already_responded() -> AppError {
    AppError::Conflict {
        field: "non_field_errors",
        reason: "This friend request has already been responded to.".to_owned(),
    }
}
