use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::{self, PlanSession, WorkoutPlan};
use crate::{
    auth::AuthUser,
    db::{CatalogFilter, Page, Pagination},
    error::{AppError, AppResult},
    schedule::{normalize_schedule, ScheduleEntry},
    state::AppState,
    validate::{clean_text, nullable, Validator},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/workout-plans", get(list_plans).post(create_plan))
        .route(
            "/workout-plans/:id",
            get(get_plan).patch(update_plan).delete(delete_plan),
        )
        .route("/workout-plans/:id/sessions", post(attach_session))
        .route(
            "/workout-plans/:id/sessions/:pivot_id",
            patch(update_plan_session).delete(detach_session),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    pub duration_weeks: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub duration_weeks: Option<Option<i32>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachSessionRequest {
    pub session_id: Uuid,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    pub position: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanSessionRequest {
    pub schedule: Option<Vec<ScheduleEntry>>,
    pub position: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct WorkoutPlanDetail {
    #[serde(flatten)]
    pub plan: WorkoutPlan,
    pub sessions: Vec<PlanSession>,
}

async fn load_plan(state: &AppState, id: Uuid) -> AppResult<WorkoutPlan> {
    repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("workout plan"))
}

async fn load_owned_plan(state: &AppState, auth: &AuthUser, id: Uuid) -> AppResult<WorkoutPlan> {
    auth.require_staff()?;
    let plan = load_plan(state, id).await?;
    auth.require_owner_or_admin(plan.created_by)?;
    Ok(plan)
}

#[instrument(skip(state))]
pub async fn list_plans(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<Json<Page<WorkoutPlan>>> {
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[instrument(skip(state))]
pub async fn get_plan(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<WorkoutPlanDetail>> {
    let plan = load_plan(&state, id).await?;
    let sessions = repo::list_sessions(&state.db, id).await?;
    Ok(Json(WorkoutPlanDetail { plan, sessions }))
}

#[instrument(skip(state, payload))]
pub async fn create_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreatePlanRequest>,
) -> AppResult<(StatusCode, Json<WorkoutPlan>)> {
    auth.require_staff()?;
    Validator::new()
        .required(Some(payload.name.as_str()), "name")
        .positive(payload.duration_weeks.map(f64::from), "durationWeeks")
        .finish()?;

    let description = clean_text(payload.description);
    let plan = repo::insert(
        &state.db,
        payload.name.trim(),
        description.as_deref(),
        payload.duration_weeks,
        auth.id,
    )
    .await?;
    info!(workout_plan_id = %plan.id, by = %auth.id, "workout plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

#[instrument(skip(state, payload))]
pub async fn update_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanRequest>,
) -> AppResult<Json<WorkoutPlan>> {
    let mut plan = load_owned_plan(&state, &auth, id).await?;
    if let Some(name) = payload.name {
        plan.name = name.trim().to_string();
    }
    if let Some(v) = payload.description {
        plan.description = clean_text(v);
    }
    if let Some(v) = payload.duration_weeks {
        plan.duration_weeks = v;
    }
    Validator::new()
        .required(Some(plan.name.as_str()), "name")
        .positive(plan.duration_weeks.map(f64::from), "durationWeeks")
        .finish()?;

    let plan = repo::update(&state.db, &plan)
        .await?
        .ok_or(AppError::NotFound("workout plan"))?;
    info!(workout_plan_id = %id, by = %auth.id, "workout plan updated");
    Ok(Json(plan))
}

#[instrument(skip(state))]
pub async fn delete_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    load_owned_plan(&state, &auth, id).await?;
    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("workout plan"));
    }
    info!(workout_plan_id = %id, by = %auth.id, "workout plan deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn attach_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachSessionRequest>,
) -> AppResult<(StatusCode, Json<PlanSession>)> {
    load_owned_plan(&state, &auth, id).await?;

    let mut v = Validator::new();
    v.non_negative(payload.position.map(f64::from), "position");
    let schedule = match normalize_schedule("schedule", &payload.schedule) {
        Ok(s) => s,
        Err(errs) => {
            v.extend(errs);
            Vec::new()
        }
    };
    v.finish()?;

    let pivot_id =
        repo::attach_session(&state.db, id, payload.session_id, &schedule, payload.position).await?;
    let pivot = repo::find_session(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan session"))?;
    info!(workout_plan_id = %id, session_id = %payload.session_id, "session attached to plan");
    Ok((StatusCode::CREATED, Json(pivot)))
}

#[instrument(skip(state, payload))]
pub async fn update_plan_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePlanSessionRequest>,
) -> AppResult<Json<PlanSession>> {
    load_owned_plan(&state, &auth, id).await?;
    let current = repo::find_session(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan session"))?;

    let position = payload.position.unwrap_or(current.position);
    let mut v = Validator::new();
    v.non_negative(Some(f64::from(position)), "position");
    let schedule = match payload.schedule {
        Some(entries) => match normalize_schedule("schedule", &entries) {
            Ok(s) => s,
            Err(errs) => {
                v.extend(errs);
                Vec::new()
            }
        },
        None => current.schedule.0,
    };
    v.finish()?;

    if !repo::update_session(&state.db, pivot_id, &schedule, position).await? {
        return Err(AppError::NotFound("plan session"));
    }
    let updated = repo::find_session(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan session"))?;
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn detach_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    load_owned_plan(&state, &auth, id).await?;
    if !repo::detach_session(&state.db, id, pivot_id).await? {
        return Err(AppError::NotFound("plan session"));
    }
    info!(workout_plan_id = %id, pivot_id = %pivot_id, "session detached from plan");
    Ok(StatusCode::NO_CONTENT)
}
