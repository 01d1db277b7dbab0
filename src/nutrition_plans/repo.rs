use serde::Serialize;
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{CatalogFilter, Pagination},
    meals::repo_types::Macros,
    schedule::ScheduleEntry,
};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NutritionPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlanAuthor {
    pub id: Uuid,
    pub name: String,
}

/// A plan/meal pivot joined with the meal's per-serving values.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlanMeal {
    pub id: Uuid,
    pub nutrition_plan_id: Uuid,
    pub meal_id: Uuid,
    pub meal_name: String,
    pub quantity: Option<f64>,
    pub quantity_kg: Option<f64>,
    pub schedule: Json<Vec<ScheduleEntry>>,
    pub position: i32,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub macros: Macros,
}

#[derive(Debug, Clone)]
pub struct PivotFields {
    pub quantity: Option<f64>,
    pub quantity_kg: Option<f64>,
    pub schedule: Vec<ScheduleEntry>,
}

const COLUMNS: &str = "id, name, description, created_by, created_at, updated_at";

const PIVOT_SELECT: &str = r#"
    SELECT p.id, p.nutrition_plan_id, p.meal_id, m.name AS meal_name,
           p.quantity, p.quantity_kg, p.schedule, p.position,
           m.calories, m.protein, m.carbs, m.fat
      FROM nutrition_plan_meal_pivot p
      JOIN meals m ON m.id = p.meal_id
"#;

pub async fn list(
    db: &PgPool,
    filter: &CatalogFilter,
    p: Pagination,
) -> Result<(Vec<NutritionPlan>, i64), sqlx::Error> {
    let mut qb =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM nutrition_plans WHERE TRUE"));
    filter.push_filters(&mut qb);
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<NutritionPlan>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM nutrition_plans WHERE TRUE");
    filter.push_filters(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<NutritionPlan>, sqlx::Error> {
    sqlx::query_as::<_, NutritionPlan>(&format!(
        "SELECT {COLUMNS} FROM nutrition_plans WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn find_author(db: &PgPool, user_id: Uuid) -> Result<Option<PlanAuthor>, sqlx::Error> {
    sqlx::query_as::<_, PlanAuthor>("SELECT id, name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn insert(
    db: &PgPool,
    name: &str,
    description: Option<&str>,
    created_by: Uuid,
) -> Result<NutritionPlan, sqlx::Error> {
    sqlx::query_as::<_, NutritionPlan>(&format!(
        r#"
        INSERT INTO nutrition_plans (name, description, created_by)
        VALUES ($1, $2, $3)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(name)
    .bind(description)
    .bind(created_by)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, plan: &NutritionPlan) -> Result<Option<NutritionPlan>, sqlx::Error> {
    sqlx::query_as::<_, NutritionPlan>(&format!(
        r#"
        UPDATE nutrition_plans
           SET name = $2, description = $3, updated_at = now()
         WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(plan.id)
    .bind(&plan.name)
    .bind(plan.description.as_deref())
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM nutrition_plans WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn list_meals(db: &PgPool, plan_id: Uuid) -> Result<Vec<PlanMeal>, sqlx::Error> {
    sqlx::query_as::<_, PlanMeal>(&format!(
        "{PIVOT_SELECT} WHERE p.nutrition_plan_id = $1 ORDER BY p.position, p.id"
    ))
    .bind(plan_id)
    .fetch_all(db)
    .await
}

pub async fn find_meal(
    db: &PgPool,
    plan_id: Uuid,
    pivot_id: Uuid,
) -> Result<Option<PlanMeal>, sqlx::Error> {
    sqlx::query_as::<_, PlanMeal>(&format!(
        "{PIVOT_SELECT} WHERE p.nutrition_plan_id = $1 AND p.id = $2"
    ))
    .bind(plan_id)
    .bind(pivot_id)
    .fetch_optional(db)
    .await
}

/// Locks the plan row, then appends the pivot after the current last position.
pub async fn attach_meal(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: Uuid,
    meal_id: Uuid,
    fields: &PivotFields,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query("SELECT id FROM nutrition_plans WHERE id = $1 FOR UPDATE")
        .bind(plan_id)
        .fetch_one(&mut **tx)
        .await?;

    let next_position: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM nutrition_plan_meal_pivot WHERE nutrition_plan_id = $1",
    )
    .bind(plan_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO nutrition_plan_meal_pivot
            (nutrition_plan_id, meal_id, quantity, quantity_kg, schedule, position)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(plan_id)
    .bind(meal_id)
    .bind(fields.quantity)
    .bind(fields.quantity_kg)
    .bind(Json(&fields.schedule))
    .bind(next_position)
    .fetch_one(&mut **tx)
    .await
}

pub async fn update_meal(
    db: &PgPool,
    pivot_id: Uuid,
    fields: &PivotFields,
    position: i32,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        UPDATE nutrition_plan_meal_pivot
           SET quantity = $2, quantity_kg = $3, schedule = $4, position = $5
         WHERE id = $1
        "#,
    )
    .bind(pivot_id)
    .bind(fields.quantity)
    .bind(fields.quantity_kg)
    .bind(Json(&fields.schedule))
    .bind(position)
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn detach_meal(db: &PgPool, plan_id: Uuid, pivot_id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        "DELETE FROM nutrition_plan_meal_pivot WHERE nutrition_plan_id = $1 AND id = $2",
    )
    .bind(plan_id)
    .bind(pivot_id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}
