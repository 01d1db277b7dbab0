use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, PublicUser, RefreshRequest,
            RegisterRequest, ResetPasswordRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{generate_reset_token, hash_password, reset_token_digest, verify_password},
        repo,
        repo_types::User,
    },
    error::{AppError, AppResult},
    mail::password_reset_mail,
    state::AppState,
    validate::{is_valid_email, normalize_email, Validator, MIN_PASSWORD_LEN},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

/// Persists a refresh-token row and signs the access/refresh pair for it.
async fn issue_tokens<'e>(
    db: impl PgExecutor<'e>,
    keys: &JwtKeys,
    user: User,
) -> AppResult<AuthResponse> {
    let jti = Uuid::new_v4();
    repo::insert_refresh_token(db, jti, user.id, keys.refresh_expiry()).await?;
    let access_token = keys.sign_access(user.id, user.role)?;
    let refresh_token = keys.sign_refresh(user.id, user.role, jti)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    payload.email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();

    Validator::new()
        .check(is_valid_email(&payload.email), "email", "Invalid email")
        .check(
            payload.password.len() >= MIN_PASSWORD_LEN,
            "password",
            "Password too short",
        )
        .required(Some(name.as_str()), "name")
        .finish()
        .inspect_err(|_| warn!(email = %payload.email, "invalid registration"))?;

    let hash = hash_password(&payload.password)?;

    let user = match User::create(&state.db, &payload.email, &hash, &name).await {
        Ok(u) => u,
        Err(e) => {
            let err = AppError::from(e);
            if matches!(err, AppError::Conflict(_)) {
                warn!(email = %payload.email, "email already registered");
                return Err(AppError::Conflict("Email already registered".into()));
            }
            return Err(err);
        }
    };

    let keys = state.jwt.clone();
    let user_id = user.id;
    let response = issue_tokens(&state.db, &keys, user).await?;

    info!(%user_id, email = %payload.email, "user registered");
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation(vec![crate::error::FieldError::new(
            "email",
            "Invalid email",
        )]));
    }

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    // Checked before any refresh token row exists for this login.
    user.ensure_active(OffsetDateTime::now_utc())
        .inspect_err(|_| warn!(user_id = %user.id, "login by blocked user"))?;

    let keys = state.jwt.clone();
    let user_id = user.id;
    let response = issue_tokens(&state.db, &keys, user).await?;

    info!(%user_id, "user logged in");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = state.jwt.clone();
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "invalid refresh token");
        AppError::Unauthorized("invalid or expired refresh token".into())
    })?;

    let mut tx = state.db.begin().await?;

    if !repo::revoke_refresh_token(&mut *tx, claims.jti, claims.sub).await? {
        warn!(user_id = %claims.sub, jti = %claims.jti, "refresh token reused or revoked");
        return Err(AppError::Unauthorized("refresh token revoked".into()));
    }

    let user = User::find_by_id(&mut *tx, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    user.ensure_active(OffsetDateTime::now_utc())?;

    let response = issue_tokens(&mut *tx, &keys, user).await?;
    tx.commit().await?;

    info!(user_id = %claims.sub, "tokens rotated");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    let keys = state.jwt.clone();
    if let Ok(claims) = keys.verify_refresh(&payload.refresh_token) {
        repo::revoke_refresh_token(&state.db, claims.jti, claims.sub).await?;
        info!(user_id = %claims.sub, "logged out");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Always answers 202 so the endpoint cannot be used to probe for accounts.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<StatusCode> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Ok(StatusCode::ACCEPTED);
    }

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        info!("password reset requested for unknown email");
        return Ok(StatusCode::ACCEPTED);
    };

    let token = generate_reset_token();
    let expires_at =
        OffsetDateTime::now_utc() + Duration::minutes(state.config.mail.reset_ttl_minutes);
    repo::insert_reset_token(&state.db, user.id, &reset_token_digest(&token), expires_at).await?;

    let mail = password_reset_mail(&user.email, &state.config.app_base_url, &token);
    if let Err(e) = state.mailer.send(mail).await {
        error!(error = %e, user_id = %user.id, "password reset mail failed");
    } else {
        info!(user_id = %user.id, "password reset mail queued");
    }
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    Validator::new()
        .required(Some(payload.token.as_str()), "token")
        .check(
            payload.password.len() >= MIN_PASSWORD_LEN,
            "password",
            "Password too short",
        )
        .finish()?;

    let hash = hash_password(&payload.password)?;

    let mut tx = state.db.begin().await?;
    let Some(row) = repo::lock_reset_token(&mut tx, &reset_token_digest(&payload.token)).await?
    else {
        warn!("invalid or expired password reset token");
        return Err(AppError::BadRequest("invalid or expired reset token".into()));
    };

    repo::set_password_hash(&mut *tx, row.user_id, &hash).await?;
    repo::mark_reset_token_used(&mut tx, row.id).await?;
    let revoked = repo::revoke_all_refresh_tokens(&mut *tx, row.user_id).await?;
    tx.commit().await?;

    info!(user_id = %row.user_id, revoked, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, auth.id).await?.ok_or_else(|| {
        error!(user_id = %auth.id, "user not found");
        AppError::Unauthorized("User not found".into())
    })?;
    Ok(Json(PublicUser::from(user)))
}
