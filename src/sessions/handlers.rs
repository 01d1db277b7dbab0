use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::{self, Session, SessionExercise, SessionExerciseFields};
use crate::{
    auth::AuthUser,
    db::{CatalogFilter, Page, Pagination},
    error::{AppError, AppResult},
    state::AppState,
    validate::{clean_text, nullable, Validator},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route(
            "/sessions/:id",
            get(get_session).patch(update_session).delete(delete_session),
        )
        .route("/sessions/:id/exercises", post(attach_exercise))
        .route(
            "/sessions/:id/exercises/:session_exercise_id",
            patch(update_session_exercise).delete(detach_exercise),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub duration_minutes: Option<Option<i32>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachExerciseRequest {
    pub exercise_id: Uuid,
    pub sets: Option<i32>,
    pub reps: Option<i32>,
    pub rest_seconds: Option<i32>,
    pub notes: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionExerciseRequest {
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub sets: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub reps: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rest_seconds: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub exercises: Vec<SessionExercise>,
}

fn check_counts(v: &mut Validator, f: &SessionExerciseFields) {
    v.non_negative(f.sets.map(f64::from), "sets")
        .non_negative(f.reps.map(f64::from), "reps")
        .non_negative(f.rest_seconds.map(f64::from), "restSeconds");
}

async fn load_session(state: &AppState, id: Uuid) -> AppResult<Session> {
    repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("session"))
}

/// Staff gate plus creator-or-admin check for mutations of an existing session.
async fn load_owned_session(state: &AppState, auth: &AuthUser, id: Uuid) -> AppResult<Session> {
    auth.require_staff()?;
    let session = load_session(state, id).await?;
    auth.require_owner_or_admin(session.created_by)?;
    Ok(session)
}

#[instrument(skip(state))]
pub async fn list_sessions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<Json<Page<Session>>> {
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionDetail>> {
    let session = load_session(&state, id).await?;
    let exercises = repo::list_exercises(&state.db, id).await?;
    Ok(Json(SessionDetail { session, exercises }))
}

#[instrument(skip(state, payload))]
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateSessionRequest>,
) -> AppResult<(StatusCode, Json<Session>)> {
    auth.require_staff()?;
    Validator::new()
        .required(Some(payload.name.as_str()), "name")
        .positive(payload.duration_minutes.map(f64::from), "durationMinutes")
        .finish()?;

    let description = clean_text(payload.description);
    let session = repo::insert(
        &state.db,
        payload.name.trim(),
        description.as_deref(),
        payload.duration_minutes,
        auth.id,
    )
    .await?;
    info!(session_id = %session.id, by = %auth.id, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state, payload))]
pub async fn update_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSessionRequest>,
) -> AppResult<Json<Session>> {
    let mut session = load_owned_session(&state, &auth, id).await?;
    if let Some(name) = payload.name {
        session.name = name.trim().to_string();
    }
    if let Some(v) = payload.description {
        session.description = clean_text(v);
    }
    if let Some(v) = payload.duration_minutes {
        session.duration_minutes = v;
    }
    Validator::new()
        .required(Some(session.name.as_str()), "name")
        .positive(session.duration_minutes.map(f64::from), "durationMinutes")
        .finish()?;

    let session = repo::update(&state.db, &session)
        .await?
        .ok_or(AppError::NotFound("session"))?;
    info!(session_id = %id, by = %auth.id, "session updated");
    Ok(Json(session))
}

#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    load_owned_session(&state, &auth, id).await?;
    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("session"));
    }
    info!(session_id = %id, by = %auth.id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn attach_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachExerciseRequest>,
) -> AppResult<(StatusCode, Json<SessionExercise>)> {
    load_owned_session(&state, &auth, id).await?;

    let fields = SessionExerciseFields {
        sets: payload.sets,
        reps: payload.reps,
        rest_seconds: payload.rest_seconds,
        notes: clean_text(payload.notes),
    };
    let mut v = Validator::new();
    check_counts(&mut v, &fields);
    v.non_negative(payload.position.map(f64::from), "position")
        .finish()?;

    let mut tx = state.db.begin().await?;
    let pivot_id = repo::attach_exercise(&mut tx, id, payload.exercise_id, payload.position, &fields).await?;
    tx.commit().await?;

    let attached = repo::find_exercise(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("session exercise"))?;
    info!(
        session_id = %id,
        exercise_id = %payload.exercise_id,
        occurrence = attached.occurrence,
        "exercise attached to session"
    );
    Ok((StatusCode::CREATED, Json(attached)))
}

#[instrument(skip(state, payload))]
pub async fn update_session_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateSessionExerciseRequest>,
) -> AppResult<Json<SessionExercise>> {
    load_owned_session(&state, &auth, id).await?;
    let current = repo::find_exercise(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("session exercise"))?;

    let fields = SessionExerciseFields {
        sets: payload.sets.unwrap_or(current.sets),
        reps: payload.reps.unwrap_or(current.reps),
        rest_seconds: payload.rest_seconds.unwrap_or(current.rest_seconds),
        notes: match payload.notes {
            Some(v) => clean_text(v),
            None => current.notes,
        },
    };
    let position = payload.position.unwrap_or(current.position);
    let mut v = Validator::new();
    check_counts(&mut v, &fields);
    v.non_negative(Some(f64::from(position)), "position")
        .finish()?;

    if !repo::update_exercise(&state.db, pivot_id, position, &fields).await? {
        return Err(AppError::NotFound("session exercise"));
    }
    let updated = repo::find_exercise(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("session exercise"))?;
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn detach_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    load_owned_session(&state, &auth, id).await?;
    if !repo::detach_exercise(&state.db, id, pivot_id).await? {
        return Err(AppError::NotFound("session exercise"));
    }
    info!(session_id = %id, session_exercise_id = %pivot_id, "exercise detached from session");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_distinguishes_cleared_fields() {
        let req: UpdateSessionExerciseRequest =
            serde_json::from_str(r#"{"sets":null,"reps":12}"#).unwrap();
        assert_eq!(req.sets, Some(None));
        assert_eq!(req.reps, Some(Some(12)));
        assert_eq!(req.rest_seconds, None);
        assert_eq!(req.position, None);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut v = Validator::new();
        check_counts(
            &mut v,
            &SessionExerciseFields {
                sets: Some(-1),
                reps: Some(10),
                rest_seconds: Some(-30),
                notes: None,
            },
        );
        match v.finish().unwrap_err() {
            AppError::Validation(details) => {
                let fields: Vec<_> = details.iter().map(|d| d.field.as_str()).collect();
                assert_eq!(fields, vec!["sets", "restSeconds"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn attach_request_uses_camel_case() {
        let id = Uuid::new_v4();
        let req: AttachExerciseRequest = serde_json::from_str(&format!(
            r#"{{"exerciseId":"{id}","restSeconds":90,"position":2}}"#
        ))
        .unwrap();
        assert_eq!(req.exercise_id, id);
        assert_eq!(req.rest_seconds, Some(90));
        assert_eq!(req.position, Some(2));
        assert_eq!(req.sets, None);
    }
}
