use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::access::{can_coach, load_visible_user};
use super::dto::{
    BlockRequest, ClientsQuery, SearchQuery, SetTrainerRequest, TrainerSummary,
    UpdatePersonalRequest, UpdateUserRequest, UserFilter, UserPersonal,
};
use super::repo;
use crate::{
    auth::{repo as auth_repo, AuthUser, Role, User},
    db::{Page, Pagination},
    error::{AppError, AppResult, FieldError},
    state::AppState,
    validate::Validator,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).patch(update_user).delete(delete_user))
        .route("/users/:id/trainer", put(set_trainer))
        .route("/users/:id/block", post(block_user))
        .route("/users/:id/unblock", post(unblock_user))
        .route("/users/:id/personal", get(get_personal).put(update_personal))
        .route("/trainers", get(list_trainers))
        .route("/clients", get(list_clients))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Page<User>>> {
    auth.require_admin()?;
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[instrument(skip(state))]
pub async fn list_trainers(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Page<TrainerSummary>>> {
    let (rows, total) = repo::list_trainers(&state.db, q.search.as_deref(), p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

/// A trainer's own clients; admins may pass `trainerId`.
#[instrument(skip(state))]
pub async fn list_clients(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(q): Query<ClientsQuery>,
) -> AppResult<Json<Page<User>>> {
    let trainer_id = match auth.role {
        Role::Trainer => auth.id,
        Role::Admin => q.trainer_id.ok_or_else(|| {
            AppError::Validation(vec![FieldError::new("trainerId", "is required")])
        })?,
        Role::User => return Err(AppError::forbidden()),
    };
    let filter = UserFilter {
        trainer_id: Some(trainer_id),
        ..Default::default()
    };
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    Ok(Json(load_visible_user(&state.db, &auth, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    if auth.id != id && !auth.is_admin() {
        return Err(AppError::forbidden());
    }
    if !auth.is_admin() && (payload.role.is_some() || payload.trainer_id.is_some()) {
        warn!(user_id = %auth.id, "non-admin tried to change role or trainer");
        return Err(AppError::forbidden());
    }

    let name = payload.name.as_deref().map(str::trim);
    let mut v = Validator::new();
    if let Some(name) = name {
        v.check(!name.is_empty(), "name", "must not be empty");
    }
    v.finish()?;

    if let Some(Some(trainer_id)) = payload.trainer_id {
        ensure_trainer(&state, trainer_id).await?;
    }

    let user = repo::update(&state.db, id, name, payload.role, payload.trainer_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    info!(user_id = %id, by = %auth.id, "user updated");
    Ok(Json(user))
}

async fn ensure_trainer(state: &AppState, trainer_id: Uuid) -> AppResult<()> {
    match User::find_by_id(&state.db, trainer_id).await? {
        Some(t) if t.role == Role::Trainer => Ok(()),
        _ => Err(AppError::Validation(vec![FieldError::new(
            "trainerId",
            "must reference a trainer",
        )])),
    }
}

/// Admins assign any trainer; a user may pick (or drop) their own trainer.
#[instrument(skip(state, payload))]
pub async fn set_trainer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetTrainerRequest>,
) -> AppResult<Json<User>> {
    let self_service = auth.id == id && auth.role == Role::User;
    if !auth.is_admin() && !self_service {
        return Err(AppError::forbidden());
    }
    if let Some(trainer_id) = payload.trainer_id {
        ensure_trainer(&state, trainer_id).await?;
    }
    let user = repo::update(&state.db, id, None, None, Some(payload.trainer_id))
        .await?
        .ok_or(AppError::NotFound("user"))?;
    info!(user_id = %id, trainer_id = ?payload.trainer_id, "trainer assigned");
    Ok(Json(user))
}

/// An empty body is a permanent block. Anything else must parse.
fn parse_block_request(body: &[u8]) -> AppResult<BlockRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BlockRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        AppError::Validation(vec![FieldError::new(
            "until",
            format!("must be an RFC 3339 timestamp ({e})"),
        )])
    })
}

#[instrument(skip(state, body))]
pub async fn block_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<User>> {
    auth.require_admin()?;
    if auth.id == id {
        return Err(AppError::BadRequest("admins cannot block themselves".into()));
    }
    let until = parse_block_request(&body)?.until;
    if let Some(until) = until {
        Validator::new()
            .check(until > OffsetDateTime::now_utc(), "until", "must be in the future")
            .finish()?;
    }

    let user = repo::set_block(&state.db, id, until.is_none(), until)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let revoked = auth_repo::revoke_all_refresh_tokens(&state.db, id).await?;
    info!(user_id = %id, until = ?until, revoked, "user blocked");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn unblock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    auth.require_admin()?;
    let user = repo::set_block(&state.db, id, false, None)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    info!(user_id = %id, "user unblocked");
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    if auth.id == id {
        return Err(AppError::BadRequest("admins cannot delete themselves".into()));
    }
    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_personal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserPersonal>> {
    let user = load_visible_user(&state.db, &auth, id).await?;
    let personal = repo::get_personal(&state.db, user.id)
        .await?
        .unwrap_or_else(|| UserPersonal::empty(user.id));
    Ok(Json(personal))
}

#[instrument(skip(state, payload))]
pub async fn update_personal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePersonalRequest>,
) -> AppResult<Json<UserPersonal>> {
    let user = load_visible_user(&state.db, &auth, id).await?;
    if payload.touches_plans() && !can_coach(&auth, &user) {
        warn!(user_id = %id, by = %auth.id, "plan assignment not permitted");
        return Err(AppError::forbidden());
    }

    let current = repo::get_personal(&state.db, user.id)
        .await?
        .unwrap_or_else(|| UserPersonal::empty(user.id));
    let next = payload.apply(current);

    Validator::new()
        .positive(next.height, "height")
        .finish()?;

    let saved = repo::upsert_personal(&state.db, &next).await?;
    info!(user_id = %id, by = %auth.id, "personal data updated");
    Ok(Json(saved))
}
