use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::repo::{self, NewProgress, Progress};
use crate::{
    auth::AuthUser,
    db::{Page, Pagination},
    error::{AppError, AppResult, FieldError},
    state::AppState,
    storage::StorageClient,
    uploads::{remove_files_best_effort, store_files, MediaKind, MultipartForm},
    users::access::load_visible_user,
    validate::Validator,
};

pub fn routes(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/users/:id/progress",
            get(list_progress)
                .post(create_progress)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/progress/:id", delete(delete_progress))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub entry: Progress,
    pub images: Vec<String>,
}

impl ProgressResponse {
    fn new(entry: Progress, storage: &dyn StorageClient) -> Self {
        let images = entry.image_keys.iter().map(|k| storage.public_url(k)).collect();
        Self { entry, images }
    }
}

#[instrument(skip(state))]
pub async fn list_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<ProgressResponse>>> {
    let user = load_visible_user(&state.db, &auth, user_id).await?;
    let (rows, total) = repo::list_by_user(&state.db, user.id, p).await?;
    let storage = state.storage.as_ref();
    Ok(Json(
        Page::new(rows, total, p).map(|e| ProgressResponse::new(e, storage)),
    ))
}

/// Multipart fields: `weight`, `bodyFat`, `recordedAt` (RFC 3339), `notes`, `images`.
#[instrument(skip(state, mp))]
pub async fn create_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<ProgressResponse>)> {
    if auth.id != user_id {
        return Err(AppError::forbidden());
    }

    let mut form = MultipartForm::read(mp).await?;
    let mut errors = Vec::new();
    let weight = form.parse::<f64>("weight", &mut errors);
    let body_fat = form.parse::<f64>("bodyFat", &mut errors);
    let recorded_at = match form.text("recordedAt") {
        Some(raw) => match OffsetDateTime::parse(&raw, &Rfc3339) {
            Ok(t) => Some(t),
            Err(_) => {
                errors.push(FieldError::new("recordedAt", "must be an RFC 3339 timestamp"));
                None
            }
        },
        None => None,
    };
    let notes = form.text("notes");
    let images = form.take_files("images");

    Validator::new()
        .extend(errors)
        .positive(weight, "weight")
        .check(
            body_fat.map(|b| (0.0..=100.0).contains(&b)).unwrap_or(true),
            "bodyFat",
            "must be between 0 and 100",
        )
        .check(
            weight.is_some() || body_fat.is_some() || !images.is_empty(),
            "weight",
            "provide a weight, body fat or at least one image",
        )
        .finish()?;

    let image_keys = store_files(
        state.storage.as_ref(),
        "progress",
        user_id,
        images,
        MediaKind::Image,
    )
    .await?;

    let new = NewProgress {
        user_id,
        weight,
        body_fat,
        notes,
        image_keys,
        recorded_at,
    };
    let entry = match repo::insert(&state.db, &new).await {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, %user_id, "insert progress failed");
            remove_files_best_effort(state.storage.as_ref(), &new.image_keys).await;
            return Err(e.into());
        }
    };

    info!(%user_id, progress_id = %entry.id, images = entry.image_keys.len(), "progress recorded");
    Ok((
        StatusCode::CREATED,
        Json(ProgressResponse::new(entry, state.storage.as_ref())),
    ))
}

/// Removes the entry, then its stored images; image removal never fails the request.
#[instrument(skip(state))]
pub async fn delete_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let entry = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("progress entry"))?;
    auth.require_owner_or_admin(Some(entry.user_id))?;

    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("progress entry"));
    }
    remove_files_best_effort(state.storage.as_ref(), &entry.image_keys).await;

    info!(progress_id = %id, user_id = %entry.user_id, "progress deleted");
    Ok(StatusCode::NO_CONTENT)
}
