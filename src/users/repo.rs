use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{TrainerSummary, UserFilter, UserPersonal};
use crate::auth::repo_types::{User, USER_COLUMNS};
use crate::auth::Role;
use crate::db::{like_pattern, Pagination};

fn push_user_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, f: &'a UserFilter) {
    if let Some(role) = f.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(status) = f.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(trainer_id) = f.trainer_id {
        qb.push(" AND trainer_id = ").push_bind(trainer_id);
    }
    if let Some(search) = f.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

pub async fn list(
    db: &PgPool,
    filter: &UserFilter,
    p: Pagination,
) -> Result<(Vec<User>, i64), sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
    push_user_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<User>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
    push_user_filters(&mut count, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;

    Ok((rows, total))
}

pub async fn list_trainers(
    db: &PgPool,
    search: Option<&str>,
    p: Pagination,
) -> Result<(Vec<TrainerSummary>, i64), sqlx::Error> {
    let pattern = search
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);

    let rows = sqlx::query_as::<_, TrainerSummary>(
        r#"
        SELECT u.id, u.name, u.email,
               AVG(r.rating)::float8 AS average_rating,
               COUNT(r.id) AS review_count
          FROM users u
          LEFT JOIN reviews r ON r.trainer_id = u.id
         WHERE u.role = 'trainer'
           AND u.status = 'active'
           AND ($1::text IS NULL OR u.name ILIKE $1)
         GROUP BY u.id
         ORDER BY u.name
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(pattern.as_deref())
    .bind(p.limit())
    .bind(p.offset())
    .fetch_all(db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users
         WHERE role = 'trainer' AND status = 'active'
           AND ($1::text IS NULL OR name ILIKE $1)
        "#,
    )
    .bind(pattern.as_deref())
    .fetch_one(db)
    .await?;

    Ok((rows, total))
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    name: Option<&str>,
    role: Option<Role>,
    trainer_id: Option<Option<Uuid>>,
) -> Result<Option<User>, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = now()");
    if let Some(name) = name {
        qb.push(", name = ").push_bind(name);
    }
    if let Some(role) = role {
        qb.push(", role = ").push_bind(role);
    }
    if let Some(trainer_id) = trainer_id {
        qb.push(", trainer_id = ").push_bind(trainer_id);
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(format!(" RETURNING {USER_COLUMNS}"));
    qb.build_query_as::<User>().fetch_optional(db).await
}

pub async fn set_block(
    db: &PgPool,
    id: Uuid,
    permanent: bool,
    until: Option<OffsetDateTime>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
           SET status = CASE WHEN $2 THEN 'blocked'::user_status ELSE 'active'::user_status END,
               blocked_until = $3,
               updated_at = now()
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(permanent)
    .bind(until)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn get_personal(db: &PgPool, user_id: Uuid) -> Result<Option<UserPersonal>, sqlx::Error> {
    sqlx::query_as::<_, UserPersonal>(
        r#"
        SELECT user_id, sex, height, goal, nutrition_plan_id, workout_plan_id, updated_at
          FROM user_personal
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn upsert_personal(db: &PgPool, p: &UserPersonal) -> Result<UserPersonal, sqlx::Error> {
    sqlx::query_as::<_, UserPersonal>(
        r#"
        INSERT INTO user_personal (user_id, sex, height, goal, nutrition_plan_id, workout_plan_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE
           SET sex = EXCLUDED.sex,
               height = EXCLUDED.height,
               goal = EXCLUDED.goal,
               nutrition_plan_id = EXCLUDED.nutrition_plan_id,
               workout_plan_id = EXCLUDED.workout_plan_id,
               updated_at = now()
        RETURNING user_id, sex, height, goal, nutrition_plan_id, workout_plan_id, updated_at
        "#,
    )
    .bind(p.user_id)
    .bind(p.sex)
    .bind(p.height)
    .bind(p.goal.as_deref())
    .bind(p.nutrition_plan_id)
    .bind(p.workout_plan_id)
    .fetch_one(db)
    .await
}
