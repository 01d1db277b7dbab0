use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{MealResponse, UpdateMealRequest},
    repo::{self, NewMeal},
    repo_types::Macros,
    services::create_meal_with_image,
};
use crate::{
    auth::AuthUser,
    db::{CatalogFilter, Page, Pagination},
    error::{AppError, AppResult},
    state::AppState,
    uploads::{remove_files_best_effort, MultipartForm},
    validate::{clean_text, Validator},
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal))
}

pub fn write_routes(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/meals",
            post(create_meal).layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/meals/:id", put(update_meal).delete(delete_meal))
}

fn validate_macros(v: &mut Validator, m: &Macros) {
    v.non_negative(Some(m.calories), "calories")
        .non_negative(Some(m.protein), "protein")
        .non_negative(Some(m.carbs), "carbs")
        .non_negative(Some(m.fat), "fat");
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(p): Query<Pagination>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<Json<Page<MealResponse>>> {
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    let storage = state.storage.as_ref();
    Ok(Json(
        Page::new(rows, total, p).map(|m| MealResponse::new(m, storage)),
    ))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MealResponse>> {
    let meal = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("meal"))?;
    Ok(Json(MealResponse::new(meal, state.storage.as_ref())))
}

/// Multipart fields: `name`, `description`, `calories`, `protein`, `carbs`, `fat`, `image`.
#[instrument(skip(state, mp))]
pub async fn create_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<MealResponse>)> {
    auth.require_staff()?;

    let mut form = MultipartForm::read(mp).await?;
    let mut errors = Vec::new();
    let name = form.text("name");
    let macros = Macros {
        calories: form.parse::<f64>("calories", &mut errors).unwrap_or(0.0),
        protein: form.parse::<f64>("protein", &mut errors).unwrap_or(0.0),
        carbs: form.parse::<f64>("carbs", &mut errors).unwrap_or(0.0),
        fat: form.parse::<f64>("fat", &mut errors).unwrap_or(0.0),
    };
    let mut images = form.take_files("image");

    let mut v = Validator::new();
    v.extend(errors)
        .required(name.as_deref(), "name")
        .check(images.len() <= 1, "image", "only one image allowed");
    validate_macros(&mut v, &macros);
    v.finish()?;

    let new = NewMeal {
        name: name.unwrap_or_default(),
        description: form.text("description"),
        macros,
        image_key: None,
        created_by: auth.id,
    };
    let meal = create_meal_with_image(&state, new, images.pop()).await?;

    info!(meal_id = %meal.id, by = %auth.id, "meal created");
    Ok((
        StatusCode::CREATED,
        Json(MealResponse::new(meal, state.storage.as_ref())),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMealRequest>,
) -> AppResult<Json<MealResponse>> {
    auth.require_staff()?;
    let mut meal = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("meal"))?;
    auth.require_owner_or_admin(meal.created_by)?;

    if let Some(name) = payload.name {
        meal.name = name.trim().to_string();
    }
    if let Some(v) = payload.description {
        meal.description = clean_text(v);
    }
    let m = &mut meal.macros;
    m.calories = payload.calories.unwrap_or(m.calories);
    m.protein = payload.protein.unwrap_or(m.protein);
    m.carbs = payload.carbs.unwrap_or(m.carbs);
    m.fat = payload.fat.unwrap_or(m.fat);

    let mut v = Validator::new();
    v.required(Some(meal.name.as_str()), "name");
    validate_macros(&mut v, &meal.macros);
    v.finish()?;

    let meal = repo::update(&state.db, &meal)
        .await?
        .ok_or(AppError::NotFound("meal"))?;
    info!(meal_id = %id, by = %auth.id, "meal updated");
    Ok(Json(MealResponse::new(meal, state.storage.as_ref())))
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    auth.require_staff()?;
    let meal = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("meal"))?;
    auth.require_owner_or_admin(meal.created_by)?;

    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("meal"));
    }
    remove_files_best_effort(state.storage.as_ref(), meal.image_key.as_slice()).await;
    info!(meal_id = %id, by = %auth.id, "meal deleted");
    Ok(StatusCode::NO_CONTENT)
}
