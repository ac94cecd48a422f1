//! Todo item handlers.

use super::{ApiError, AppState};
use crate::models::{NewTodoItem, RecordId, TodoItem};
use crate::storage::consume_cursor;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

type HandlerResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> HandlerResult<RecordId> {
    RecordId::parse(raw).map_err(|_| ApiError::bad_request("failed to decode id"))
}

fn not_found(id: &RecordId) -> ApiError {
    ApiError::not_found(format!("todo item {id} not found"))
}

/// `GET /todo`
pub async fn find_all(State(state): State<AppState>) -> HandlerResult<Json<Vec<TodoItem>>> {
    let todos = Arc::clone(&state.todos);
    let max = state.max_return_array_size;
    let items = state
        .run_blocking(move |ctx| consume_cursor(todos.find_all(ctx)?, max))
        .await?;
    Ok(Json(items))
}

/// `GET /todo/label/{label}`
pub async fn find_by_label(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> HandlerResult<Json<Vec<TodoItem>>> {
    let todos = Arc::clone(&state.todos);
    let max = state.max_return_array_size;
    let items = state
        .run_blocking(move |ctx| consume_cursor(todos.find_by_label(ctx, &label)?, max))
        .await?;
    Ok(Json(items))
}

/// `GET /todo/{id}`
pub async fn find_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult<Json<TodoItem>> {
    let id = parse_id(&id)?;
    let todos = Arc::clone(&state.todos);
    state
        .run_blocking(move |ctx| todos.find_one_by_id(ctx, &id))
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// `POST /todo`
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewTodoItem>, JsonRejection>,
) -> HandlerResult<impl IntoResponse> {
    let Json(item) = body?;
    let todos = Arc::clone(&state.todos);
    let id = state
        .run_blocking(move |ctx| todos.insert_one(ctx, &item))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id })),
    ))
}

/// `PUT /todo/{id}`
///
/// Replaces every mutable field and responds with the stored record.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewTodoItem>, JsonRejection>,
) -> HandlerResult<Json<TodoItem>> {
    let id = parse_id(&id)?;
    let Json(item) = body?;
    let todos = Arc::clone(&state.todos);
    let refreshed = state
        .run_blocking(move |ctx| {
            let outcome = todos.update_one_by_id(ctx, &id, &item)?;
            if !outcome.matched() {
                return Ok(None);
            }
            todos.find_one_by_id(ctx, &id)
        })
        .await?;
    refreshed.map(Json).ok_or_else(|| not_found(&id))
}

/// `DELETE /todo/{id}`
///
/// Succeeds whether or not the record existed.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult<StatusCode> {
    let id = parse_id(&id)?;
    let todos = Arc::clone(&state.todos);
    let outcome = state
        .run_blocking(move |ctx| todos.delete_one_by_id(ctx, &id))
        .await?;
    tracing::debug!(record.id = %id, deleted = outcome.deleted_count, "Deleted todo item");
    Ok(StatusCode::OK)
}

/// `POST /todo/{id}/labels/{label}`
pub async fn add_label(
    State(state): State<AppState>,
    Path((id, label)): Path<(String, String)>,
) -> HandlerResult<Json<TodoItem>> {
    let id = parse_id(&id)?;
    let todos = Arc::clone(&state.todos);
    let refreshed = state
        .run_blocking(move |ctx| {
            if !todos.add_label(ctx, &id, &label)?.matched() {
                return Ok(None);
            }
            todos.find_one_by_id(ctx, &id)
        })
        .await?;
    refreshed.map(Json).ok_or_else(|| not_found(&id))
}

/// `DELETE /todo/{id}/labels/{label}`
pub async fn remove_label(
    State(state): State<AppState>,
    Path((id, label)): Path<(String, String)>,
) -> HandlerResult<Json<TodoItem>> {
    let id = parse_id(&id)?;
    let todos = Arc::clone(&state.todos);
    let refreshed = state
        .run_blocking(move |ctx| {
            if !todos.remove_label(ctx, &id, &label)?.matched() {
                return Ok(None);
            }
            todos.find_one_by_id(ctx, &id)
        })
        .await?;
    refreshed.map(Json).ok_or_else(|| not_found(&id))
}
