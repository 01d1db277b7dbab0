use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::repo::{self, Exercise, ExerciseFilter, NewExercise};
use crate::{
    auth::AuthUser,
    db::{Page, Pagination},
    error::{AppError, AppResult},
    state::AppState,
    storage::StorageClient,
    uploads::{remove_files_best_effort, store_files, MediaKind, MultipartForm},
    validate::{clean_text, nullable, Validator},
};

pub fn routes(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/exercises",
            get(list_exercises)
                .post(create_exercise)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route(
            "/exercises/:id",
            get(get_exercise).put(update_exercise).delete(delete_exercise),
        )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResponse {
    #[serde(flatten)]
    pub exercise: Exercise,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

impl ExerciseResponse {
    pub fn new(exercise: Exercise, storage: &dyn StorageClient) -> Self {
        Self {
            image_url: exercise.image_key.as_deref().map(|k| storage.public_url(k)),
            video_url: exercise.video_key.as_deref().map(|k| storage.public_url(k)),
            exercise,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExerciseRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub muscle_group: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub equipment: Option<Option<String>>,
}

#[instrument(skip(state))]
pub async fn list_exercises(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(filter): Query<ExerciseFilter>,
) -> AppResult<Json<Page<ExerciseResponse>>> {
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    let storage = state.storage.as_ref();
    Ok(Json(
        Page::new(rows, total, p).map(|e| ExerciseResponse::new(e, storage)),
    ))
}

#[instrument(skip(state))]
pub async fn get_exercise(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ExerciseResponse>> {
    let exercise = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("exercise"))?;
    Ok(Json(ExerciseResponse::new(exercise, state.storage.as_ref())))
}

/// Multipart fields: `name`, `description`, `muscleGroup`, `equipment`, `image`, `video`.
#[instrument(skip(state, mp))]
pub async fn create_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<ExerciseResponse>)> {
    auth.require_staff()?;

    let mut form = MultipartForm::read(mp).await?;
    let name = form.text("name");
    let images = form.take_files("image");
    let videos = form.take_files("video");
    Validator::new()
        .required(name.as_deref(), "name")
        .check(images.len() <= 1, "image", "only one image allowed")
        .check(videos.len() <= 1, "video", "only one video allowed")
        .finish()?;

    let storage = state.storage.as_ref();
    let image_key = store_files(storage, "exercises", auth.id, images, MediaKind::Image)
        .await?
        .pop();
    let video_key = match store_files(storage, "exercises", auth.id, videos, MediaKind::Video).await {
        Ok(mut keys) => keys.pop(),
        Err(e) => {
            remove_files_best_effort(storage, image_key.as_slice()).await;
            return Err(e);
        }
    };

    let new = NewExercise {
        name: name.unwrap_or_default(),
        description: form.text("description"),
        muscle_group: form.text("muscleGroup"),
        equipment: form.text("equipment"),
        image_key,
        video_key,
        created_by: auth.id,
    };
    let exercise = match repo::insert(&state.db, &new).await {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "insert exercise failed");
            let keys: Vec<String> = new
                .image_key
                .iter()
                .chain(new.video_key.iter())
                .cloned()
                .collect();
            remove_files_best_effort(storage, &keys).await;
            return Err(e.into());
        }
    };

    info!(exercise_id = %exercise.id, by = %auth.id, "exercise created");
    Ok((StatusCode::CREATED, Json(ExerciseResponse::new(exercise, storage))))
}

#[instrument(skip(state, payload))]
pub async fn update_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateExerciseRequest>,
) -> AppResult<Json<ExerciseResponse>> {
    auth.require_staff()?;
    let mut exercise = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("exercise"))?;
    auth.require_owner_or_admin(exercise.created_by)?;

    if let Some(name) = payload.name {
        exercise.name = name.trim().to_string();
    }
    if let Some(v) = payload.description {
        exercise.description = clean_text(v);
    }
    if let Some(v) = payload.muscle_group {
        exercise.muscle_group = clean_text(v);
    }
    if let Some(v) = payload.equipment {
        exercise.equipment = clean_text(v);
    }
    Validator::new()
        .required(Some(exercise.name.as_str()), "name")
        .finish()?;

    let exercise = repo::update(&state.db, &exercise)
        .await?
        .ok_or(AppError::NotFound("exercise"))?;
    info!(exercise_id = %id, by = %auth.id, "exercise updated");
    Ok(Json(ExerciseResponse::new(exercise, state.storage.as_ref())))
}

#[instrument(skip(state))]
pub async fn delete_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    auth.require_staff()?;
    let exercise = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("exercise"))?;
    auth.require_owner_or_admin(exercise.created_by)?;

    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("exercise"));
    }
    let keys: Vec<String> = exercise
        .image_key
        .into_iter()
        .chain(exercise.video_key)
        .collect();
    remove_files_best_effort(state.storage.as_ref(), &keys).await;

    info!(exercise_id = %id, by = %auth.id, "exercise deleted");
    Ok(StatusCode::NO_CONTENT)
}
