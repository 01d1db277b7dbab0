use serde::Serialize;
use sqlx::{types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::{CatalogFilter, Pagination},
    schedule::ScheduleEntry,
};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_weeks: Option<i32>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlanSession {
    pub id: Uuid,
    pub workout_plan_id: Uuid,
    pub session_id: Uuid,
    pub session_name: String,
    pub duration_minutes: Option<i32>,
    pub schedule: Json<Vec<ScheduleEntry>>,
    pub position: i32,
}

const COLUMNS: &str = "id, name, description, duration_weeks, created_by, created_at, updated_at";

const PIVOT_SELECT: &str = r#"
    SELECT wps.id, wps.workout_plan_id, wps.session_id, s.name AS session_name,
           s.duration_minutes, wps.schedule, wps.position
      FROM workout_plan_sessions wps
      JOIN sessions s ON s.id = wps.session_id
"#;

pub async fn list(
    db: &PgPool,
    filter: &CatalogFilter,
    p: Pagination,
) -> Result<(Vec<WorkoutPlan>, i64), sqlx::Error> {
    let mut qb =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM workout_plans WHERE TRUE"));
    filter.push_filters(&mut qb);
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<WorkoutPlan>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM workout_plans WHERE TRUE");
    filter.push_filters(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<WorkoutPlan>, sqlx::Error> {
    sqlx::query_as::<_, WorkoutPlan>(&format!("SELECT {COLUMNS} FROM workout_plans WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert(
    db: &PgPool,
    name: &str,
    description: Option<&str>,
    duration_weeks: Option<i32>,
    created_by: Uuid,
) -> Result<WorkoutPlan, sqlx::Error> {
    sqlx::query_as::<_, WorkoutPlan>(&format!(
        r#"
        INSERT INTO workout_plans (name, description, duration_weeks, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(name)
    .bind(description)
    .bind(duration_weeks)
    .bind(created_by)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, plan: &WorkoutPlan) -> Result<Option<WorkoutPlan>, sqlx::Error> {
    sqlx::query_as::<_, WorkoutPlan>(&format!(
        r#"
        UPDATE workout_plans
           SET name = $2, description = $3, duration_weeks = $4, updated_at = now()
         WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(plan.id)
    .bind(&plan.name)
    .bind(plan.description.as_deref())
    .bind(plan.duration_weeks)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM workout_plans WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn list_sessions(db: &PgPool, plan_id: Uuid) -> Result<Vec<PlanSession>, sqlx::Error> {
    sqlx::query_as::<_, PlanSession>(&format!(
        "{PIVOT_SELECT} WHERE wps.workout_plan_id = $1 ORDER BY wps.position, s.name"
    ))
    .bind(plan_id)
    .fetch_all(db)
    .await
}

pub async fn find_session(
    db: &PgPool,
    plan_id: Uuid,
    pivot_id: Uuid,
) -> Result<Option<PlanSession>, sqlx::Error> {
    sqlx::query_as::<_, PlanSession>(&format!(
        "{PIVOT_SELECT} WHERE wps.workout_plan_id = $1 AND wps.id = $2"
    ))
    .bind(plan_id)
    .bind(pivot_id)
    .fetch_optional(db)
    .await
}

/// Attaches a session; a missing `position` appends after the last pivot.
pub async fn attach_session(
    db: &PgPool,
    plan_id: Uuid,
    session_id: Uuid,
    schedule: &[ScheduleEntry],
    position: Option<i32>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO workout_plan_sessions (workout_plan_id, session_id, schedule, position)
        VALUES (
            $1, $2, $3,
            COALESCE($4, (SELECT COALESCE(MAX(position), -1) + 1
                            FROM workout_plan_sessions WHERE workout_plan_id = $1))
        )
        RETURNING id
        "#,
    )
    .bind(plan_id)
    .bind(session_id)
    .bind(Json(schedule))
    .bind(position)
    .fetch_one(db)
    .await
}

pub async fn update_session(
    db: &PgPool,
    pivot_id: Uuid,
    schedule: &[ScheduleEntry],
    position: i32,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("UPDATE workout_plan_sessions SET schedule = $2, position = $3 WHERE id = $1")
        .bind(pivot_id)
        .bind(Json(schedule))
        .bind(position)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn detach_session(db: &PgPool, plan_id: Uuid, pivot_id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM workout_plan_sessions WHERE workout_plan_id = $1 AND id = $2")
        .bind(plan_id)
        .bind(pivot_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
