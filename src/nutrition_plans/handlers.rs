use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    repo::{self, NutritionPlan, PivotFields, PlanAuthor, PlanMeal},
    weekly::{aggregate, PivotWithCalc, ScheduleTotals},
};
use crate::{
    auth::AuthUser,
    db::{CatalogFilter, Page, Pagination},
    error::{AppError, AppResult},
    schedule::{normalize_schedule, ScheduleEntry, Weekday},
    state::AppState,
    validate::{clean_text, nullable, Validator},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/nutrition-plans", get(list_plans).post(create_plan))
        .route(
            "/nutrition-plans/:id",
            get(get_plan).patch(update_plan).delete(delete_plan),
        )
        .route("/nutrition-plans/:id/schedule", get(get_schedule))
        .route("/nutrition-plans/:id/meals", post(attach_meal))
        .route(
            "/nutrition-plans/:id/meals/:pivot_id",
            patch(update_plan_meal).delete(detach_meal),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachMealRequest {
    pub meal_id: Uuid,
    pub quantity: Option<f64>,
    pub quantity_kg: Option<f64>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanMealRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub quantity: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub quantity_kg: Option<Option<f64>>,
    pub schedule: Option<Vec<ScheduleEntry>>,
    pub position: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct NutritionPlanDetail {
    #[serde(flatten)]
    pub plan: NutritionPlan,
    pub meals: Vec<PlanMeal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWithAuthor {
    #[serde(flatten)]
    pub plan: NutritionPlan,
    pub author: Option<PlanAuthor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub nutrition_plan: PlanWithAuthor,
    pub schedule: BTreeMap<Weekday, Vec<PivotWithCalc>>,
    pub totals: ScheduleTotals,
}

/// Validates quantities and schedule, collecting every problem.
fn check_pivot(v: &mut Validator, fields: &mut PivotFields, schedule: Option<&[ScheduleEntry]>) {
    v.positive(fields.quantity, "quantity")
        .positive(fields.quantity_kg, "quantityKg");
    if let Some(entries) = schedule {
        match normalize_schedule("schedule", entries) {
            Ok(s) => fields.schedule = s,
            Err(errs) => {
                v.extend(errs);
            }
        }
    }
}

async fn load_plan(state: &AppState, id: Uuid) -> AppResult<NutritionPlan> {
    repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("nutrition plan"))
}

async fn load_owned_plan(state: &AppState, auth: &AuthUser, id: Uuid) -> AppResult<NutritionPlan> {
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
) -> AppResult<Json<Page<NutritionPlan>>> {
    let (rows, total) = repo::list(&state.db, &filter, p).await?;
    Ok(Json(Page::new(rows, total, p)))
}

#[instrument(skip(state))]
pub async fn get_plan(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<NutritionPlanDetail>> {
    let plan = load_plan(&state, id).await?;
    let meals = repo::list_meals(&state.db, id).await?;
    Ok(Json(NutritionPlanDetail { plan, meals }))
}

#[instrument(skip(state))]
pub async fn get_schedule(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ScheduleResponse>> {
    let plan = load_plan(&state, id).await?;
    let author = match plan.created_by {
        Some(uid) => repo::find_author(&state.db, uid).await?,
        None => None,
    };
    let pivots = repo::list_meals(&state.db, id).await?;
    debug!(nutrition_plan_id = %id, pivots = pivots.len(), "aggregating weekly schedule");

    let weekly = aggregate(pivots);
    Ok(Json(ScheduleResponse {
        nutrition_plan: PlanWithAuthor { plan, author },
        schedule: weekly.schedule,
        totals: weekly.totals,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreatePlanRequest>,
) -> AppResult<(StatusCode, Json<NutritionPlan>)> {
    auth.require_staff()?;
    Validator::new()
        .required(Some(payload.name.as_str()), "name")
        .finish()?;

    let description = clean_text(payload.description);
    let plan = repo::insert(&state.db, payload.name.trim(), description.as_deref(), auth.id).await?;
    info!(nutrition_plan_id = %plan.id, by = %auth.id, "nutrition plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

#[instrument(skip(state, payload))]
pub async fn update_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanRequest>,
) -> AppResult<Json<NutritionPlan>> {
    let mut plan = load_owned_plan(&state, &auth, id).await?;
    if let Some(name) = payload.name {
        plan.name = name.trim().to_string();
    }
    if let Some(v) = payload.description {
        plan.description = clean_text(v);
    }
    Validator::new()
        .required(Some(plan.name.as_str()), "name")
        .finish()?;

    let plan = repo::update(&state.db, &plan)
        .await?
        .ok_or(AppError::NotFound("nutrition plan"))?;
    info!(nutrition_plan_id = %id, by = %auth.id, "nutrition plan updated");
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
        return Err(AppError::NotFound("nutrition plan"));
    }
    info!(nutrition_plan_id = %id, by = %auth.id, "nutrition plan deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn attach_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachMealRequest>,
) -> AppResult<(StatusCode, Json<PlanMeal>)> {
    load_owned_plan(&state, &auth, id).await?;

    let mut fields = PivotFields {
        quantity: payload.quantity,
        quantity_kg: payload.quantity_kg,
        schedule: Vec::new(),
    };
    let mut v = Validator::new();
    check_pivot(&mut v, &mut fields, Some(&payload.schedule));
    v.finish()?;

    let mut tx = state.db.begin().await?;
    let pivot_id = repo::attach_meal(&mut tx, id, payload.meal_id, &fields).await?;
    tx.commit().await?;

    let pivot = repo::find_meal(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan meal"))?;
    info!(
        nutrition_plan_id = %id,
        meal_id = %payload.meal_id,
        position = pivot.position,
        "meal attached to plan"
    );
    Ok((StatusCode::CREATED, Json(pivot)))
}

#[instrument(skip(state, payload))]
pub async fn update_plan_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePlanMealRequest>,
) -> AppResult<Json<PlanMeal>> {
    load_owned_plan(&state, &auth, id).await?;
    let current = repo::find_meal(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan meal"))?;

    let mut fields = PivotFields {
        quantity: payload.quantity.unwrap_or(current.quantity),
        quantity_kg: payload.quantity_kg.unwrap_or(current.quantity_kg),
        schedule: current.schedule.0,
    };
    let position = payload.position.unwrap_or(current.position);
    let mut v = Validator::new();
    v.non_negative(Some(f64::from(position)), "position");
    check_pivot(&mut v, &mut fields, payload.schedule.as_deref());
    v.finish()?;

    if !repo::update_meal(&state.db, pivot_id, &fields, position).await? {
        return Err(AppError::NotFound("plan meal"));
    }
    let updated = repo::find_meal(&state.db, id, pivot_id)
        .await?
        .ok_or(AppError::NotFound("plan meal"))?;
    Ok(Json(updated))
}

#[instrument(skip(state))]
pub async fn detach_meal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, pivot_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    load_owned_plan(&state, &auth, id).await?;
    if !repo::detach_meal(&state.db, id, pivot_id).await? {
        return Err(AppError::NotFound("plan meal"));
    }
    info!(nutrition_plan_id = %id, pivot_id = %pivot_id, "meal detached from plan");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> PivotFields {
        PivotFields {
            quantity: None,
            quantity_kg: None,
            schedule: Vec::new(),
        }
    }

    #[test]
    fn check_pivot_normalizes_schedule() {
        let mut f = fields();
        let input = vec![ScheduleEntry {
            day: "saturday".into(),
            time: Some("7:05".into()),
        }];
        let mut v = Validator::new();
        check_pivot(&mut v, &mut f, Some(&input));
        assert!(v.finish().is_ok());
        assert_eq!(f.schedule, vec![ScheduleEntry::new(Weekday::Sat, Some("07:05"))]);
    }

    #[test]
    fn check_pivot_rejects_bad_day_and_zero_quantity() {
        let mut f = fields();
        f.quantity = Some(0.0);
        let input = vec![ScheduleEntry {
            day: "Moonday".into(),
            time: None,
        }];
        let mut v = Validator::new();
        check_pivot(&mut v, &mut f, Some(&input));
        match v.finish().unwrap_err() {
            AppError::Validation(details) => {
                let names: Vec<_> = details.iter().map(|d| d.field.as_str()).collect();
                assert_eq!(names, vec!["quantity", "schedule[0].day"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_request_can_clear_quantity() {
        let req: UpdatePlanMealRequest =
            serde_json::from_str(r#"{"quantity":null,"quantityKg":0.25}"#).unwrap();
        assert_eq!(req.quantity, Some(None));
        assert_eq!(req.quantity_kg, Some(Some(0.25)));
        assert!(req.schedule.is_none());
    }
}
