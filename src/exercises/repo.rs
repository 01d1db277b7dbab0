use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{like_pattern, Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub muscle_group: Option<String>,
    pub equipment: Option<String>,
    #[serde(skip_serializing)]
    pub image_key: Option<String>,
    #[serde(skip_serializing)]
    pub video_key: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseFilter {
    pub search: Option<String>,
    pub muscle_group: Option<String>,
    pub created_by: Option<Uuid>,
}

pub struct NewExercise {
    pub name: String,
    pub description: Option<String>,
    pub muscle_group: Option<String>,
    pub equipment: Option<String>,
    pub image_key: Option<String>,
    pub video_key: Option<String>,
    pub created_by: Uuid,
}

const COLUMNS: &str = "id, name, description, muscle_group, equipment, image_key, video_key, created_by, created_at, updated_at";

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, f: &'a ExerciseFilter) {
    if let Some(search) = f.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND name ILIKE ").push_bind(like_pattern(search));
    }
    if let Some(group) = f.muscle_group.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND lower(muscle_group) = lower(")
            .push_bind(group.trim())
            .push(")");
    }
    if let Some(created_by) = f.created_by {
        qb.push(" AND created_by = ").push_bind(created_by);
    }
}

pub async fn list(
    db: &PgPool,
    filter: &ExerciseFilter,
    p: Pagination,
) -> Result<(Vec<Exercise>, i64), sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exercises WHERE TRUE"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<Exercise>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exercises WHERE TRUE");
    push_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!("SELECT {COLUMNS} FROM exercises WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert(db: &PgPool, e: &NewExercise) -> Result<Exercise, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        r#"
        INSERT INTO exercises (name, description, muscle_group, equipment, image_key, video_key, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&e.name)
    .bind(e.description.as_deref())
    .bind(e.muscle_group.as_deref())
    .bind(e.equipment.as_deref())
    .bind(e.image_key.as_deref())
    .bind(e.video_key.as_deref())
    .bind(e.created_by)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, e: &Exercise) -> Result<Option<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        r#"
        UPDATE exercises
           SET name = $2, description = $3, muscle_group = $4, equipment = $5, updated_at = now()
         WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(e.id)
    .bind(&e.name)
    .bind(e.description.as_deref())
    .bind(e.muscle_group.as_deref())
    .bind(e.equipment.as_deref())
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM exercises WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
