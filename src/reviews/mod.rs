pub mod handlers;
mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router(max_upload: usize) -> Router<AppState> {
    handlers::routes(max_upload)
}
