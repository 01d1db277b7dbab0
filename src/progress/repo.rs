use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Pagination;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weight: Option<f64>,
    pub body_fat: Option<f64>,
    pub notes: Option<String>,
    pub image_keys: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub struct NewProgress {
    pub user_id: Uuid,
    pub weight: Option<f64>,
    pub body_fat: Option<f64>,
    pub notes: Option<String>,
    pub image_keys: Vec<String>,
    pub recorded_at: Option<OffsetDateTime>,
}

const COLUMNS: &str = "id, user_id, weight, body_fat, notes, image_keys, recorded_at, created_at";

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    p: Pagination,
) -> Result<(Vec<Progress>, i64), sqlx::Error> {
    let rows = sqlx::query_as::<_, Progress>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM progress
         WHERE user_id = $1
         ORDER BY recorded_at DESC
         LIMIT $2 OFFSET $3
        "#
    ))
    .bind(user_id)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM progress WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok((rows, total))
}

pub async fn insert(db: &PgPool, p: &NewProgress) -> Result<Progress, sqlx::Error> {
    sqlx::query_as::<_, Progress>(&format!(
        r#"
        INSERT INTO progress (user_id, weight, body_fat, notes, image_keys, recorded_at)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, now()))
        RETURNING {COLUMNS}
        "#
    ))
    .bind(p.user_id)
    .bind(p.weight)
    .bind(p.body_fat)
    .bind(p.notes.as_deref())
    .bind(p.image_keys.as_slice())
    .bind(p.recorded_at)
    .fetch_one(db)
    .await
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Progress>, sqlx::Error> {
    sqlx::query_as::<_, Progress>(&format!("SELECT {COLUMNS} FROM progress WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM progress WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
