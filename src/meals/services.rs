use tracing::error;

use super::repo::{self, NewMeal};
use super::repo_types::Meal;
use crate::{
    error::AppResult,
    state::AppState,
    uploads::{remove_files_best_effort, store_files, MediaKind, UploadItem},
};

/// Stores the optional image first, then inserts the row. A failed insert
/// removes the stored object again.
pub async fn create_meal_with_image(
    st: &AppState,
    mut new: NewMeal,
    image: Option<UploadItem>,
) -> AppResult<Meal> {
    let storage = st.storage.as_ref();
    new.image_key = store_files(
        storage,
        "meals",
        new.created_by,
        image.into_iter().collect(),
        MediaKind::Image,
    )
    .await?
    .pop();

    match repo::insert(&st.db, &new).await {
        Ok(meal) => Ok(meal),
        Err(e) => {
            error!(error = %e, by = %new.created_by, "insert meal failed");
            remove_files_best_effort(storage, new.image_key.as_slice()).await;
            Err(e.into())
        }
    }
}
