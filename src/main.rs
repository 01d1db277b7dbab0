use fitcoach::{app, error, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "fitcoach=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;
    error::expose_internal_errors(app_state.config.is_development());

    sqlx::migrate!("./migrations").run(&app_state.db).await?;
    tracing::info!(
        env = %app_state.config.app_env,
        storage = ?app_state.config.storage,
        "migrations applied"
    );

    app::serve(app::build_app(app_state)).await
}
