use serde::{Deserialize, Serialize};

use super::repo_types::Meal;
use crate::storage::StorageClient;
use crate::validate::nullable;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealResponse {
    #[serde(flatten)]
    pub meal: Meal,
    pub image_url: Option<String>,
}

impl MealResponse {
    pub fn new(meal: Meal, storage: &dyn StorageClient) -> Self {
        Self {
            image_url: meal.image_key.as_deref().map(|k| storage.public_url(k)),
            meal,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMealRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}
