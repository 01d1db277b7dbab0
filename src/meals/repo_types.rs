use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-serving macro values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, FromRow)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Macros {
    pub fn scaled(self, factor: f64) -> Macros {
        Macros {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
        }
    }

    pub fn add(&mut self, other: Macros) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub macros: Macros,
    #[serde(skip_serializing)]
    pub image_key: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub(crate) const MEAL_COLUMNS: &str =
    "id, name, description, calories, protein, carbs, fat, image_key, created_by, created_at, updated_at";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_and_add() {
        let m = Macros {
            calories: 200.0,
            protein: 10.0,
            carbs: 30.0,
            fat: 5.0,
        };
        let mut total = Macros::default();
        total.add(m.scaled(2.0));
        total.add(m.scaled(0.5));
        assert_eq!(
            total,
            Macros {
                calories: 500.0,
                protein: 25.0,
                carbs: 75.0,
                fat: 12.5,
            }
        );
    }
}
