use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Pagination;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trainer_id: Uuid,
    pub rating: i16,
    pub text: Option<String>,
    #[serde(skip_serializing)]
    pub image_keys: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub review: Review,
    pub author_name: String,
}

pub struct NewReview {
    pub user_id: Uuid,
    pub trainer_id: Uuid,
    pub rating: i16,
    pub text: Option<String>,
    pub image_keys: Vec<String>,
}

const COLUMNS: &str = "id, user_id, trainer_id, rating, text, image_keys, created_at, updated_at";

pub async fn insert(db: &PgPool, r: &NewReview) -> Result<Review, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!(
        r#"
        INSERT INTO reviews (user_id, trainer_id, rating, text, image_keys)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(r.user_id)
    .bind(r.trainer_id)
    .bind(r.rating)
    .bind(r.text.as_deref())
    .bind(r.image_keys.as_slice())
    .fetch_one(db)
    .await
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!("SELECT {COLUMNS} FROM reviews WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list_for_trainer(
    db: &PgPool,
    trainer_id: Uuid,
    p: Pagination,
) -> Result<(Vec<ReviewWithAuthor>, i64), sqlx::Error> {
    let rows = sqlx::query_as::<_, ReviewWithAuthor>(
        r#"
        SELECT r.id, r.user_id, r.trainer_id, r.rating, r.text, r.image_keys,
               r.created_at, r.updated_at, u.name AS author_name
          FROM reviews r
          JOIN users u ON u.id = r.user_id
         WHERE r.trainer_id = $1
         ORDER BY r.created_at DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(trainer_id)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE trainer_id = $1")
        .bind(trainer_id)
        .fetch_one(db)
        .await?;
    Ok((rows, total))
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    rating: i16,
    text: Option<&str>,
) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!(
        r#"
        UPDATE reviews SET rating = $2, text = $3, updated_at = now()
         WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(rating)
    .bind(text)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
