use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::Role;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Blocked,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub name: String,
    pub role: Role,
    pub trainer_id: Option<Uuid>,
    pub status: UserStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub blocked_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, password_hash, name, role, trainer_id, status, blocked_until, created_at, updated_at";

impl User {
    pub fn is_blocked_at(&self, now: OffsetDateTime) -> bool {
        self.status == UserStatus::Blocked || self.blocked_until.map(|t| t > now).unwrap_or(false)
    }

    /// Fails with `Blocked` for a permanently blocked account or a temporary
    /// block that has not expired yet.
    pub fn ensure_active(&self, now: OffsetDateTime) -> AppResult<()> {
        if self.is_blocked_at(now) {
            return Err(AppError::Blocked {
                until: self.blocked_until.filter(|t| *t > now),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ResetTokenRow {
    pub id: Uuid,
    pub user_id: Uuid,
}

#[cfg(test)]
pub(crate) fn sample_user(role: Role) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        email: "someone@example.com".into(),
        password_hash: String::new(),
        name: "Someone".into(),
        role,
        trainer_id: None,
        status: UserStatus::Active,
        blocked_until: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn active_user_passes() {
        let user = sample_user(Role::User);
        assert!(user.ensure_active(OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn status_blocked_is_rejected_without_timestamp() {
        let mut user = sample_user(Role::User);
        user.status = UserStatus::Blocked;
        match user.ensure_active(OffsetDateTime::now_utc()) {
            Err(AppError::Blocked { until }) => assert!(until.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn future_blocked_until_is_rejected_with_timestamp() {
        let now = OffsetDateTime::now_utc();
        let mut user = sample_user(Role::Trainer);
        user.blocked_until = Some(now + Duration::days(2));
        match user.ensure_active(now) {
            Err(AppError::Blocked { until }) => assert_eq!(until, user.blocked_until),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn expired_block_no_longer_applies() {
        let now = OffsetDateTime::now_utc();
        let mut user = sample_user(Role::User);
        user.blocked_until = Some(now - Duration::minutes(1));
        assert!(user.ensure_active(now).is_ok());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let mut user = sample_user(Role::User);
        user.password_hash = "$argon2id$secret".into();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"trainerId\""));
    }
}
