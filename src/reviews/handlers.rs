use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::repo::{self, NewReview, Review, ReviewWithAuthor};
use crate::{
    auth::{AuthUser, Role, User},
    db::{Page, Pagination},
    error::{AppError, AppResult},
    state::AppState,
    storage::StorageClient,
    uploads::{remove_files_best_effort, store_files, MediaKind, MultipartForm},
    validate::{clean_text, nullable, Validator},
};

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

pub fn routes(max_upload: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/trainers/:id/reviews",
            get(list_reviews)
                .post(create_review)
                .layer(DefaultBodyLimit::max(max_upload)),
        )
        .route("/reviews/:id", put(update_review).delete(delete_review))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse<R: Serialize> {
    #[serde(flatten)]
    pub review: R,
    pub images: Vec<String>,
}

fn with_images<R: Serialize>(review: R, keys: &[String], storage: &dyn StorageClient) -> ReviewResponse<R> {
    ReviewResponse {
        images: keys.iter().map(|k| storage.public_url(k)).collect(),
        review,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    #[serde(default, deserialize_with = "nullable")]
    pub text: Option<Option<String>>,
}

fn check_rating(v: &mut Validator, rating: Option<i16>) {
    v.check(
        rating.map(|r| (MIN_RATING..=MAX_RATING).contains(&r)).unwrap_or(false),
        "rating",
        "must be an integer between 1 and 5",
    );
}

async fn load_trainer(state: &AppState, id: Uuid) -> AppResult<User> {
    match User::find_by_id(&state.db, id).await? {
        Some(u) if u.role == Role::Trainer => Ok(u),
        _ => Err(AppError::NotFound("trainer")),
    }
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(trainer_id): Path<Uuid>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<ReviewResponse<ReviewWithAuthor>>>> {
    let trainer = load_trainer(&state, trainer_id).await?;
    let (rows, total) = repo::list_for_trainer(&state.db, trainer.id, p).await?;
    let storage = state.storage.as_ref();
    Ok(Json(Page::new(rows, total, p).map(|r| {
        let keys = r.review.image_keys.clone();
        with_images(r, &keys, storage)
    })))
}

/// Multipart fields: `rating`, `text`, `images`.
#[instrument(skip(state, mp))]
pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(trainer_id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<ReviewResponse<Review>>)> {
    if auth.role == Role::Trainer {
        return Err(AppError::Forbidden("trainers cannot write reviews".into()));
    }
    let trainer = load_trainer(&state, trainer_id).await?;

    let mut form = MultipartForm::read(mp).await?;
    let mut errors = Vec::new();
    let rating = form.parse::<i16>("rating", &mut errors);
    let text = form.text("text");
    let images = form.take_files("images");
    let mut v = Validator::new();
    v.extend(errors);
    check_rating(&mut v, rating);
    v.finish()?;

    let storage = state.storage.as_ref();
    let image_keys = store_files(storage, "reviews", auth.id, images, MediaKind::Image).await?;
    let new = NewReview {
        user_id: auth.id,
        trainer_id: trainer.id,
        rating: rating.unwrap_or(MIN_RATING),
        text,
        image_keys,
    };
    let review = match repo::insert(&state.db, &new).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, user_id = %auth.id, %trainer_id, "insert review failed");
            remove_files_best_effort(storage, &new.image_keys).await;
            return Err(match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict("you have already reviewed this trainer".into())
                }
                other => other,
            });
        }
    };

    info!(review_id = %review.id, user_id = %auth.id, %trainer_id, rating = review.rating, "review created");
    let keys = review.image_keys.clone();
    Ok((StatusCode::CREATED, Json(with_images(review, &keys, storage))))
}

#[instrument(skip(state, payload))]
pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> AppResult<Json<ReviewResponse<Review>>> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("review"))?;
    if review.user_id != auth.id {
        return Err(AppError::forbidden());
    }

    let rating = payload.rating.unwrap_or(review.rating);
    let text = match payload.text {
        Some(t) => clean_text(t),
        None => review.text,
    };
    let mut v = Validator::new();
    check_rating(&mut v, Some(rating));
    v.finish()?;

    let review = repo::update(&state.db, id, rating, text.as_deref())
        .await?
        .ok_or(AppError::NotFound("review"))?;
    info!(review_id = %id, rating, "review updated");
    let keys = review.image_keys.clone();
    Ok(Json(with_images(review, &keys, state.storage.as_ref())))
}

#[instrument(skip(state))]
pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("review"))?;
    auth.require_owner_or_admin(Some(review.user_id))?;

    if !repo::delete(&state.db, id).await? {
        return Err(AppError::NotFound("review"));
    }
    remove_files_best_effort(state.storage.as_ref(), &review.image_keys).await;
    info!(review_id = %id, by = %auth.id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating_errors(rating: Option<i16>) -> usize {
        let mut v = Validator::new();
        check_rating(&mut v, rating);
        match v.finish() {
            Ok(()) => 0,
            Err(AppError::Validation(d)) => d.len(),
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert_eq!(rating_errors(Some(1)), 0);
        assert_eq!(rating_errors(Some(5)), 0);
        assert_eq!(rating_errors(Some(0)), 1);
        assert_eq!(rating_errors(Some(6)), 1);
        assert_eq!(rating_errors(None), 1);
    }

    #[test]
    fn update_request_can_clear_text() {
        let req: UpdateReviewRequest = serde_json::from_str(r#"{"text":null}"#).unwrap();
        assert_eq!(req.text, Some(None));
        assert_eq!(req.rating, None);
    }
}
