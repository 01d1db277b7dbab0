use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{CatalogFilter, Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A `session_exercises` pivot joined with its exercise.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionExercise {
    pub id: Uuid,
    pub session_id: Uuid,
    pub exercise_id: Uuid,
    pub exercise_name: String,
    pub occurrence: i32,
    pub position: i32,
    pub sets: Option<i32>,
    pub reps: Option<i32>,
    pub rest_seconds: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionExerciseFields {
    pub sets: Option<i32>,
    pub reps: Option<i32>,
    pub rest_seconds: Option<i32>,
    pub notes: Option<String>,
}

const COLUMNS: &str = "id, name, description, duration_minutes, created_by, created_at, updated_at";

const PIVOT_SELECT: &str = r#"
    SELECT se.id, se.session_id, se.exercise_id, e.name AS exercise_name,
           se.occurrence, se.position, se.sets, se.reps, se.rest_seconds, se.notes
      FROM session_exercises se
      JOIN exercises e ON e.id = se.exercise_id
"#;

pub async fn list(
    db: &PgPool,
    filter: &CatalogFilter,
    p: Pagination,
) -> Result<(Vec<Session>, i64), sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM sessions WHERE TRUE"));
    filter.push_filters(&mut qb);
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<Session>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sessions WHERE TRUE");
    filter.push_filters(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!("SELECT {COLUMNS} FROM sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert(
    db: &PgPool,
    name: &str,
    description: Option<&str>,
    duration_minutes: Option<i32>,
    created_by: Uuid,
) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        r#"
        INSERT INTO sessions (name, description, duration_minutes, created_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(name)
    .bind(description)
    .bind(duration_minutes)
    .bind(created_by)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, s: &Session) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        r#"
        UPDATE sessions
           SET name = $2, description = $3, duration_minutes = $4, updated_at = now()
         WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(s.id)
    .bind(&s.name)
    .bind(s.description.as_deref())
    .bind(s.duration_minutes)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn list_exercises(db: &PgPool, session_id: Uuid) -> Result<Vec<SessionExercise>, sqlx::Error> {
    sqlx::query_as::<_, SessionExercise>(&format!(
        "{PIVOT_SELECT} WHERE se.session_id = $1 ORDER BY se.position, se.occurrence"
    ))
    .bind(session_id)
    .fetch_all(db)
    .await
}

pub async fn find_exercise(
    db: &PgPool,
    session_id: Uuid,
    pivot_id: Uuid,
) -> Result<Option<SessionExercise>, sqlx::Error> {
    sqlx::query_as::<_, SessionExercise>(&format!(
        "{PIVOT_SELECT} WHERE se.session_id = $1 AND se.id = $2"
    ))
    .bind(session_id)
    .bind(pivot_id)
    .fetch_optional(db)
    .await
}

/// Appends an exercise to a session. The session row is locked so concurrent
/// attaches agree on `occurrence` and `position`.
pub async fn attach_exercise(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    exercise_id: Uuid,
    position: Option<i32>,
    fields: &SessionExerciseFields,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
        .bind(session_id)
        .fetch_one(&mut **tx)
        .await?;

    let (next_occurrence, next_position): (i32, i32) = sqlx::query_as(
        r#"
        SELECT COALESCE(MAX(occurrence) FILTER (WHERE exercise_id = $2), 0) + 1,
               COALESCE(MAX(position), -1) + 1
          FROM session_exercises
         WHERE session_id = $1
        "#,
    )
    .bind(session_id)
    .bind(exercise_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO session_exercises
            (session_id, exercise_id, occurrence, position, sets, reps, rest_seconds, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(session_id)
    .bind(exercise_id)
    .bind(next_occurrence)
    .bind(position.unwrap_or(next_position))
    .bind(fields.sets)
    .bind(fields.reps)
    .bind(fields.rest_seconds)
    .bind(fields.notes.as_deref())
    .fetch_one(&mut **tx)
    .await
}

pub async fn update_exercise(
    db: &PgPool,
    pivot_id: Uuid,
    position: i32,
    fields: &SessionExerciseFields,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        UPDATE session_exercises
           SET position = $2, sets = $3, reps = $4, rest_seconds = $5, notes = $6
         WHERE id = $1
        "#,
    )
    .bind(pivot_id)
    .bind(position)
    .bind(fields.sets)
    .bind(fields.reps)
    .bind(fields.rest_seconds)
    .bind(fields.notes.as_deref())
    .execute(db)
    .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn detach_exercise(db: &PgPool, session_id: Uuid, pivot_id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM session_exercises WHERE session_id = $1 AND id = $2")
        .bind(session_id)
        .bind(pivot_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
