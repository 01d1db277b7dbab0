//! End-to-end flows against a real database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;

use fitcoach::{
    app::build_app,
    config::{AppConfig, JwtConfig, MailConfig, StorageBackend, UploadConfig},
    mail::LogMailer,
    state::AppState,
    storage::LocalStorage,
};

const BOUNDARY: &str = "fitcoach-test-boundary";

fn test_app(db: PgPool, uploads: &TempDir) -> Router {
    let dir = uploads.path().to_string_lossy().to_string();
    let config = Arc::new(AppConfig {
        database_url: String::new(),
        max_connections: 5,
        app_env: "development".into(),
        app_base_url: "http://localhost:3000".into(),
        jwt: JwtConfig {
            secret: "it-secret".into(),
            refresh_secret: "it-refresh-secret".into(),
            issuer: "fitcoach".into(),
            audience: "fitcoach-users".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60,
        },
        uploads: UploadConfig {
            dir: dir.clone(),
            public_prefix: "/uploads".into(),
            max_bytes: 1024 * 1024,
        },
        storage: StorageBackend::Local,
        s3: None,
        mail: MailConfig {
            sendgrid_api_key: None,
            from: "no-reply@fitcoach.local".into(),
            reset_ttl_minutes: 60,
        },
    });
    let storage = Arc::new(LocalStorage::new(dir, "/uploads"));
    build_app(AppState::from_parts(db, config, storage, Arc::new(LogMailer)))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut b = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn multipart_req(uri: &str, token: &str, fields: &[(&str, &str)]) -> Request<Body> {
    multipart_with_file(uri, token, fields, None)
}

/// `file` is `(field, file name, content type, bytes)`.
fn multipart_with_file(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        json_req(
            Method::POST,
            "/api/v1/auth/register",
            None,
            json!({"email": email, "password": "correct-horse", "name": email}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn login(app: &Router, email: &str) -> (StatusCode, Value) {
    send(
        app,
        json_req(
            Method::POST,
            "/api/v1/auth/login",
            None,
            json!({"email": email, "password": "correct-horse"}),
        ),
    )
    .await
}

/// Registers a user, promotes them to trainer and returns a fresh access token.
async fn trainer_token(app: &Router, db: &PgPool, email: &str) -> (String, String) {
    let user = register(app, email).await;
    let id = user["user"]["id"].as_str().unwrap().to_string();
    sqlx::query("UPDATE users SET role = 'trainer' WHERE email = $1")
        .bind(email)
        .execute(db)
        .await
        .unwrap();
    let (status, body) = login(app, email).await;
    assert_eq!(status, StatusCode::OK);
    (body["accessToken"].as_str().unwrap().to_string(), id)
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn weekly_schedule_totals(db: PgPool) {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db.clone(), &uploads);
    let (coach, _) = trainer_token(&app, &db, "coach@example.com").await;

    let (status, meal) = send(
        &app,
        multipart_req(
            "/api/v1/meals",
            &coach,
            &[
                ("name", "Rice bowl"),
                ("calories", "200"),
                ("protein", "12.5"),
                ("carbs", "30"),
                ("fat", "4.25"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{meal}");
    let meal_id = meal["id"].as_str().unwrap();

    let (status, fetched) = send(&app, get_req(&format!("/api/v1/meals/{meal_id}"), &coach)).await;
    assert_eq!(status, StatusCode::OK);
    for field in ["calories", "protein", "carbs", "fat"] {
        assert_eq!(fetched[field], meal[field], "{field}");
    }
    assert_eq!(fetched["protein"], 12.5);

    let (status, plan) = send(
        &app,
        json_req(Method::POST, "/api/v1/nutrition-plans", Some(&coach), json!({"name": "Bulk"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan_id = plan["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        json_req(
            Method::POST,
            &format!("/api/v1/nutrition-plans/{plan_id}/meals"),
            Some(&coach),
            json!({"mealId": meal_id, "quantity": 2, "schedule": [{"day": "Someday"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, pivot) = send(
        &app,
        json_req(
            Method::POST,
            &format!("/api/v1/nutrition-plans/{plan_id}/meals"),
            Some(&coach),
            json!({
                "mealId": meal_id,
                "quantity": 2,
                "schedule": [{"day": "Mon", "time": "08:00"}, {"day": "wednesday"}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{pivot}");
    assert_eq!(pivot["position"], 0);

    let (status, week) = send(
        &app,
        get_req(&format!("/api/v1/nutrition-plans/{plan_id}/schedule"), &coach),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(week["totals"]["byDay"]["Mon"]["calories"], 400.0);
    assert_eq!(week["totals"]["byDay"]["Wed"]["calories"], 400.0);
    assert_eq!(week["totals"]["byDay"]["Tue"]["calories"], 0.0);
    assert_eq!(week["totals"]["week"]["calories"], 800.0);
    assert_eq!(week["schedule"]["Mon"].as_array().unwrap().len(), 1);
    assert_eq!(week["schedule"]["Sun"].as_array().unwrap().len(), 0);
    assert_eq!(week["nutritionPlan"]["author"]["name"], "coach@example.com");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn second_review_conflicts(db: PgPool) {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db.clone(), &uploads);
    let (_, trainer_id) = trainer_token(&app, &db, "trainer@example.com").await;
    let client = register(&app, "client@example.com").await;
    let client_token = client["accessToken"].as_str().unwrap();

    let uri = format!("/api/v1/trainers/{trainer_id}/reviews");
    let (status, first) = send(
        &app,
        multipart_req(&uri, client_token, &[("rating", "5"), ("text", "Great coach")]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["rating"], 5);

    let (status, _) = send(&app, multipart_req(&uri, client_token, &[("rating", "4")])).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, multipart_req(&uri, client_token, &[("rating", "9")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = send(&app, get_req(&uri, client_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["authorName"], "client@example.com");
}

async fn refresh_token_count(db: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(db)
        .await
        .unwrap()
}

/// Applies `block_sql` to the account and returns the rejected login body.
async fn login_while_blocked(db: PgPool, email: &str, block_sql: &str) -> Value {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db.clone(), &uploads);
    register(&app, email).await;

    sqlx::query(block_sql).bind(email).execute(&db).await.unwrap();
    let before = refresh_token_count(&db).await;

    let (status, body) = login(&app, email).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(refresh_token_count(&db).await, before);
    body
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn blocked_user_cannot_log_in(db: PgPool) {
    let body = login_while_blocked(
        db,
        "blocked@example.com",
        "UPDATE users SET blocked_until = now() + interval '1 day' WHERE email = $1",
    )
    .await;
    assert!(body["blockedUntil"].is_string(), "{body}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn permanently_blocked_user_cannot_log_in(db: PgPool) {
    let body = login_while_blocked(
        db,
        "banned@example.com",
        "UPDATE users SET status = 'blocked', blocked_until = NULL WHERE email = $1",
    )
    .await;
    assert!(body["blockedUntil"].is_null(), "{body}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn refresh_token_is_single_use(db: PgPool) {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db.clone(), &uploads);
    let auth = register(&app, "rotate@example.com").await;
    let refresh = auth["refreshToken"].as_str().unwrap();

    let (status, rotated) = send(
        &app,
        json_req(Method::POST, "/api/v1/auth/refresh", None, json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refreshToken"], auth["refreshToken"]);

    let (status, _) = send(
        &app,
        json_req(Method::POST, "/api/v1/auth/refresh", None, json!({"refreshToken": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn checklist_tracks_exercise_marks(db: PgPool) {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db.clone(), &uploads);
    let (coach, _) = trainer_token(&app, &db, "pt@example.com").await;

    let (status, exercise) = send(
        &app,
        multipart_req("/api/v1/exercises", &coach, &[("name", "Squat"), ("muscleGroup", "legs")]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{exercise}");
    let exercise_id = exercise["id"].as_str().unwrap();

    let (_, session) = send(
        &app,
        json_req(Method::POST, "/api/v1/sessions", Some(&coach), json!({"name": "Legs"})),
    )
    .await;
    let session_id = session["id"].as_str().unwrap();

    let attach_uri = format!("/api/v1/sessions/{session_id}/exercises");
    let (_, first) = send(
        &app,
        json_req(Method::POST, &attach_uri, Some(&coach), json!({"exerciseId": exercise_id, "sets": 5})),
    )
    .await;
    let (_, second) = send(
        &app,
        json_req(Method::POST, &attach_uri, Some(&coach), json!({"exerciseId": exercise_id})),
    )
    .await;
    assert_eq!(first["occurrence"], 1);
    assert_eq!(second["occurrence"], 2);
    assert_eq!(second["position"], 1);

    let mark = json!({"sessionExerciseId": first["id"], "date": "2024-06-03"});
    let (status, _) = send(
        &app,
        json_req(Method::POST, "/api/v1/completions/exercises", Some(&coach), mark.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(
        &app,
        json_req(Method::POST, "/api/v1/completions/exercises", Some(&coach), mark),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send(
        &app,
        get_req(&format!("/api/v1/sessions/{session_id}/checklist?date=2024-06-03"), &coach),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 2);
    assert_eq!(list["completedCount"], 1);
    assert_eq!(list["sessionCompleted"], false);
    assert_eq!(list["items"][0]["completed"], true);
}

/// Posts a progress entry with one image and returns `(entry id, file path on disk)`.
async fn progress_with_image(
    app: &Router,
    uploads: &TempDir,
    user_id: &str,
    token: &str,
) -> (String, std::path::PathBuf) {
    let (status, entry) = send(
        app,
        multipart_with_file(
            &format!("/api/v1/users/{user_id}/progress"),
            token,
            &[("weight", "81.5")],
            Some(("images", "front.png", "image/png", b"\x89PNG\r\n\x1a\nfake")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    let url = entry["images"][0].as_str().unwrap();
    let key = url.strip_prefix("/uploads/").unwrap();
    let path = uploads.path().join(key);
    assert!(path.exists(), "{}", path.display());
    (entry["id"].as_str().unwrap().to_string(), path)
}

fn delete_req(uri: &str, token: &str) -> Request<Body> {
    Request::delete(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn deleting_progress_removes_its_images(db: PgPool) {
    let uploads = TempDir::new().unwrap();
    let app = test_app(db, &uploads);
    let auth = register(&app, "runner@example.com").await;
    let token = auth["accessToken"].as_str().unwrap();
    let user_id = auth["user"]["id"].as_str().unwrap();

    let (id, path) = progress_with_image(&app, &uploads, user_id, token).await;
    let (status, _) = send(&app, delete_req(&format!("/api/v1/progress/{id}"), token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!path.exists());

    let (id, path) = progress_with_image(&app, &uploads, user_id, token).await;
    std::fs::remove_file(&path).unwrap();
    let (status, _) = send(&app, delete_req(&format!("/api/v1/progress/{id}"), token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, page) = send(&app, get_req(&format!("/api/v1/users/{user_id}/progress"), token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 0);
}
