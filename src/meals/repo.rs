use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{Macros, Meal, MEAL_COLUMNS};
use crate::db::{CatalogFilter, Pagination};

pub struct NewMeal {
    pub name: String,
    pub description: Option<String>,
    pub macros: Macros,
    pub image_key: Option<String>,
    pub created_by: Uuid,
}

pub async fn list(
    db: &PgPool,
    filter: &CatalogFilter,
    p: Pagination,
) -> Result<(Vec<Meal>, i64), sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {MEAL_COLUMNS} FROM meals WHERE TRUE"));
    filter.push_filters(&mut qb);
    qb.push(" ORDER BY name LIMIT ")
        .push_bind(p.limit())
        .push(" OFFSET ")
        .push_bind(p.offset());
    let rows = qb.build_query_as::<Meal>().fetch_all(db).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM meals WHERE TRUE");
    filter.push_filters(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Meal>, sqlx::Error> {
    sqlx::query_as::<_, Meal>(&format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert(db: &PgPool, m: &NewMeal) -> Result<Meal, sqlx::Error> {
    sqlx::query_as::<_, Meal>(&format!(
        r#"
        INSERT INTO meals (name, description, calories, protein, carbs, fat, image_key, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(&m.name)
    .bind(m.description.as_deref())
    .bind(m.macros.calories)
    .bind(m.macros.protein)
    .bind(m.macros.carbs)
    .bind(m.macros.fat)
    .bind(m.image_key.as_deref())
    .bind(m.created_by)
    .fetch_one(db)
    .await
}

pub async fn update(db: &PgPool, m: &Meal) -> Result<Option<Meal>, sqlx::Error> {
    sqlx::query_as::<_, Meal>(&format!(
        r#"
        UPDATE meals
           SET name = $2, description = $3, calories = $4, protein = $5, carbs = $6, fat = $7,
               updated_at = now()
         WHERE id = $1
        RETURNING {MEAL_COLUMNS}
        "#
    ))
    .bind(m.id)
    .bind(&m.name)
    .bind(m.description.as_deref())
    .bind(m.macros.calories)
    .bind(m.macros.protein)
    .bind(m.macros.carbs)
    .bind(m.macros.fat)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM meals WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() == 1)
}
