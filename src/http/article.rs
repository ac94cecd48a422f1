//! Article handlers.

use super::{ApiError, AppState};
use crate::models::{NewArticle, RecordId};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Most images an article may carry.
pub const MAX_IMAGE_AMOUNT: usize = 3;

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Multipart field holding the uploaded image.
const FILE_FIELD: &str = "file";

type HandlerResult<T> = Result<T, ApiError>;

/// Query string of `GET /articles`.
#[derive(Debug, Default, Deserialize)]
pub struct TitleQuery {
    /// Image filter; anything that is not a boolean means "no filter".
    #[serde(rename = "withImages")]
    pub with_images: Option<String>,
}

/// Parses the boolean spellings accepted in query strings.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// `GET /articles?withImages=`
pub async fn find_titles(
    State(state): State<AppState>,
    Query(query): Query<TitleQuery>,
) -> HandlerResult<Json<Vec<String>>> {
    let filter = query.with_images.as_deref().and_then(parse_flag);
    let articles = Arc::clone(&state.articles);
    let titles = state
        .run_blocking(move |ctx| match filter {
            Some(with_image) => articles.find_titles_by_has_image(ctx, with_image),
            None => articles.find_all_titles(ctx),
        })
        .await?;
    Ok(Json(titles))
}

/// `POST /articles`
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewArticle>, JsonRejection>,
) -> HandlerResult<impl IntoResponse> {
    let Json(article) = body?;
    let articles = Arc::clone(&state.articles);
    let id = state
        .run_blocking(move |ctx| articles.insert_one(ctx, &article))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id })),
    ))
}

/// `POST /articles/{articleId}/images`
///
/// Stores the multipart `file` field under the image directory with a
/// generated name and appends that path to the article. Uploads to the same
/// article run one at a time, so no article passes [`MAX_IMAGE_AMOUNT`].
pub async fn attach_image(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
    mut multipart: Multipart,
) -> HandlerResult<StatusCode> {
    let id = RecordId::parse(&article_id)
        .map_err(|_| ApiError::bad_request("failed to decode article id"))?;

    // Held through the append so the image count cannot change underneath.
    let lock = state.upload_locks.lock_for(id);
    let _upload = lock.lock().await;

    let articles = Arc::clone(&state.articles);
    let article = state
        .run_blocking(move |ctx| articles.find_one_by_id(ctx, &id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("article {id} not found")))?;
    if article.image_file_paths.len() >= MAX_IMAGE_AMOUNT {
        return Err(ApiError::forbidden(format!(
            "article {id} already has {MAX_IMAGE_AMOUNT} images"
        )));
    }

    let mut data = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            data = Some(field.bytes().await?);
            break;
        }
    }
    let data =
        data.ok_or_else(|| ApiError::bad_request(format!("missing form field '{FILE_FIELD}'")))?;
    if data.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::bad_request(format!(
            "image exceeds {MAX_IMAGE_SIZE} bytes"
        )));
    }

    tokio::fs::create_dir_all(&state.image_directory)
        .await
        .map_err(|e| ApiError::internal(format!("failed to create image directory: {e}")))?;
    let path = state.image_directory.join(Uuid::new_v4().to_string());
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| ApiError::internal(format!("failed to write image: {e}")))?;

    let stored = path.to_string_lossy().into_owned();
    let articles = Arc::clone(&state.articles);
    let outcome = state
        .run_blocking(move |ctx| articles.append_image(ctx, &id, &stored))
        .await;
    match outcome {
        Ok(outcome) if outcome.matched() => {
            tracing::info!(record.id = %id, path = %path.display(), bytes = data.len(), "Attached image");
            Ok(StatusCode::OK)
        },
        other => {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned image");
            }
            match other {
                Err(e) => Err(e),
                Ok(_) => Err(ApiError::not_found(format!("article {id} not found"))),
            }
        },
    }
}
