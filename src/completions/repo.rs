use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::dto::iso_day;
use crate::db::Pagination;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub session_name: String,
    pub session_exercise_id: Option<Uuid>,
    pub exercise_name: Option<String>,
    #[serde(with = "iso_day")]
    pub completed_on: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Returns `true` when a new row was written.
pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    session_exercise_id: Option<Uuid>,
    day: Date,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO completed_user_workout_pivot (user_id, session_id, session_exercise_id, completed_on)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(session_exercise_id)
    .bind(day)
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn session_of_exercise(db: &PgPool, session_exercise_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT session_id FROM session_exercises WHERE id = $1")
        .bind(session_exercise_id)
        .fetch_optional(db)
        .await
}

pub async fn delete_exercise(
    db: &PgPool,
    user_id: Uuid,
    session_exercise_id: Uuid,
    day: Date,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        DELETE FROM completed_user_workout_pivot
         WHERE user_id = $1 AND session_exercise_id = $2 AND completed_on = $3
        "#,
    )
    .bind(user_id)
    .bind(session_exercise_id)
    .bind(day)
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

/// Completion rows of one session on one day; `None` marks the whole session.
pub async fn for_session_day(
    db: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    day: Date,
) -> Result<Vec<Option<Uuid>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<Uuid>>(
        r#"
        SELECT session_exercise_id
          FROM completed_user_workout_pivot
         WHERE user_id = $1 AND session_id = $2 AND completed_on = $3
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(day)
    .fetch_all(db)
    .await
}

pub async fn list_by_user(
    db: &PgPool,
    user_id: Uuid,
    from: Option<Date>,
    to: Option<Date>,
    p: Pagination,
) -> Result<(Vec<CompletionEntry>, i64), sqlx::Error> {
    let rows = sqlx::query_as::<_, CompletionEntry>(
        r#"
        SELECT c.id, c.session_id, s.name AS session_name, c.session_exercise_id,
               e.name AS exercise_name, c.completed_on, c.created_at
          FROM completed_user_workout_pivot c
          JOIN sessions s ON s.id = c.session_id
          LEFT JOIN session_exercises se ON se.id = c.session_exercise_id
          LEFT JOIN exercises e ON e.id = se.exercise_id
         WHERE c.user_id = $1
           AND ($2::date IS NULL OR c.completed_on >= $2)
           AND ($3::date IS NULL OR c.completed_on <= $3)
         ORDER BY c.completed_on DESC, c.created_at DESC
         LIMIT $4 OFFSET $5
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
          FROM completed_user_workout_pivot
         WHERE user_id = $1
           AND ($2::date IS NULL OR completed_on >= $2)
           AND ($3::date IS NULL OR completed_on <= $3)
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(db)
    .await?;
    Ok((rows, total))
}
