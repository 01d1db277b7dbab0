use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::StorageBackend;
use crate::state::AppState;
use crate::{
    auth, completions, exercises, meals, nutrition_plans, progress, reviews, sessions, users,
    workout_plans,
};

pub fn build_app(state: AppState) -> Router {
    let max_upload = state.config.uploads.max_bytes;
    let api = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(progress::router(max_upload))
        .merge(exercises::router(max_upload))
        .merge(sessions::router())
        .merge(workout_plans::router())
        .merge(meals::router(max_upload))
        .merge(nutrition_plans::router())
        .merge(completions::router())
        .merge(reviews::router(max_upload))
        .route("/health", get(|| async { "ok" }));

    let mut app = Router::new().nest("/api/v1", api);
    if state.config.storage == StorageBackend::Local {
        let uploads = &state.config.uploads;
        app = app.nest_service(&uploads.public_prefix, ServeDir::new(&uploads.dir));
    }

    app.with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn token(state: &AppState, role: Role) -> String {
        state
            .jwt
            .sign_access(Uuid::new_v4(), role)
            .unwrap()
    }

    fn json_post(uri: &str, bearer: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let state = AppState::fake();
        for uri in ["/api/v1/exercises", "/api/v1/me", "/api/v1/nutrition-plans"] {
            let res = build_app(state.clone())
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let res = build_app(AppState::fake())
            .oneshot(
                Request::get("/api/v1/sessions")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn plain_users_cannot_create_catalog_items() {
        let state = AppState::fake();
        let user = token(&state, Role::User);
        let cases = [
            ("/api/v1/sessions", r#"{"name":"Leg day"}"#),
            ("/api/v1/workout-plans", r#"{"name":"Base block"}"#),
            ("/api/v1/nutrition-plans", r#"{"name":"Cut"}"#),
        ];
        for (uri, body) in cases {
            let res = build_app(state.clone())
                .oneshot(json_post(uri, &user, body))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn plain_users_cannot_upload_exercises_or_meals() {
        let state = AppState::fake();
        let user = token(&state, Role::User);
        for uri in ["/api/v1/exercises", "/api/v1/meals"] {
            let req = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {user}"))
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
                .body(Body::from("--XBOUNDARY--\r\n"))
                .unwrap();
            let res = build_app(state.clone()).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn trainers_cannot_review_trainers() {
        let state = AppState::fake();
        let trainer = token(&state, Role::Trainer);
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/trainers/{}/reviews", Uuid::new_v4()))
            .header(header::AUTHORIZATION, format!("Bearer {trainer}"))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from("--XBOUNDARY--\r\n"))
            .unwrap();
        let res = build_app(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn non_admins_cannot_list_users() {
        let state = AppState::fake();
        let trainer = token(&state, Role::Trainer);
        let res = build_app(state)
            .oneshot(
                Request::get("/api/v1/users")
                    .header(header::AUTHORIZATION, format!("Bearer {trainer}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_block_until_is_a_validation_error() {
        let state = AppState::fake();
        let admin = token(&state, Role::Admin);
        let uri = format!("/api/v1/users/{}/block", Uuid::new_v4());
        for body in [r#"{"until":"next tuesday"}"#, r#"{"until":"2000-01-01T00:00:00Z"}"#] {
            let res = build_app(state.clone())
                .oneshot(json_post(&uri, &admin, body))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }
}
