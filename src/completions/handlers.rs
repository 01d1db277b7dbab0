use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    checklist::{build_checklist, Checklist},
    dto::{
        parse_day, today, ChecklistQuery, CompleteExerciseRequest, CompleteSessionRequest,
        CompletionAck, DateQuery, RangeQuery,
    },
    repo::{self, CompletionEntry},
};
use crate::{
    auth::AuthUser,
    db::{Page, Pagination},
    error::{AppError, AppResult},
    sessions::repo as sessions_repo,
    state::AppState,
    users::access::load_visible_user,
    validate::Validator,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/completions/sessions", post(complete_session))
        .route("/completions/exercises", post(complete_exercise))
        .route(
            "/completions/exercises/:session_exercise_id",
            delete(uncheck_exercise),
        )
        .route("/sessions/:id/checklist", get(session_checklist))
        .route("/users/:id/completions", get(list_completions))
}

fn ack_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

#[instrument(skip(state, payload))]
pub async fn complete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CompleteSessionRequest>,
) -> AppResult<(StatusCode, Json<CompletionAck>)> {
    sessions_repo::find(&state.db, payload.session_id)
        .await?
        .ok_or(AppError::NotFound("session"))?;

    let date = payload.date.unwrap_or_else(today);
    let created = repo::insert(&state.db, auth.id, payload.session_id, None, date).await?;
    info!(user_id = %auth.id, session_id = %payload.session_id, %date, created, "session completed");
    Ok((
        ack_status(created),
        Json(CompletionAck {
            session_id: payload.session_id,
            session_exercise_id: None,
            date,
            created,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn complete_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CompleteExerciseRequest>,
) -> AppResult<(StatusCode, Json<CompletionAck>)> {
    let session_id = repo::session_of_exercise(&state.db, payload.session_exercise_id)
        .await?
        .ok_or(AppError::NotFound("session exercise"))?;

    let date = payload.date.unwrap_or_else(today);
    let created = repo::insert(
        &state.db,
        auth.id,
        session_id,
        Some(payload.session_exercise_id),
        date,
    )
    .await?;
    info!(
        user_id = %auth.id,
        session_exercise_id = %payload.session_exercise_id,
        %date,
        created,
        "exercise checked"
    );
    Ok((
        ack_status(created),
        Json(CompletionAck {
            session_id,
            session_exercise_id: Some(payload.session_exercise_id),
            date,
            created,
        }),
    ))
}

/// Removing a mark that does not exist is not an error.
#[instrument(skip(state))]
pub async fn uncheck_exercise(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_exercise_id): Path<Uuid>,
    Query(q): Query<DateQuery>,
) -> AppResult<StatusCode> {
    let date = parse_day("date", q.date.as_deref())
        .map_err(|e| AppError::Validation(vec![e]))?
        .unwrap_or_else(today);
    let removed = repo::delete_exercise(&state.db, auth.id, session_exercise_id, date).await?;
    info!(user_id = %auth.id, %session_exercise_id, %date, removed, "exercise unchecked");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn session_checklist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    Query(q): Query<ChecklistQuery>,
) -> AppResult<Json<Checklist>> {
    let date = parse_day("date", q.date.as_deref())
        .map_err(|e| AppError::Validation(vec![e]))?
        .unwrap_or_else(today);
    let user = load_visible_user(&state.db, &auth, q.user_id.unwrap_or(auth.id)).await?;
    sessions_repo::find(&state.db, session_id)
        .await?
        .ok_or(AppError::NotFound("session"))?;

    let prescribed = sessions_repo::list_exercises(&state.db, session_id).await?;
    let completions = repo::for_session_day(&state.db, user.id, session_id, date).await?;
    Ok(Json(build_checklist(session_id, date, prescribed, &completions)))
}

#[instrument(skip(state))]
pub async fn list_completions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(p): Query<Pagination>,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<Page<CompletionEntry>>> {
    let mut v = Validator::new();
    let from = parse_day("from", range.from.as_deref()).unwrap_or_else(|e| {
        v.push(e);
        None
    });
    let to = parse_day("to", range.to.as_deref()).unwrap_or_else(|e| {
        v.push(e);
        None
    });
    if let (Some(f), Some(t)) = (from, to) {
        v.check(f <= t, "from", "must not be after to");
    }
    v.finish()?;

    let user = load_visible_user(&state.db, &auth, user_id).await?;
    let (rows, total) = repo::list_by_user(&state.db, user.id, from, to, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_marks_answer_ok_instead_of_created() {
        assert_eq!(ack_status(true), StatusCode::CREATED);
        assert_eq!(ack_status(false), StatusCode::OK);
    }
}
