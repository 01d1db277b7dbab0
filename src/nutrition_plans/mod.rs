pub mod handlers;
pub(crate) mod repo;
pub mod weekly;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
