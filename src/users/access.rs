use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{AuthUser, Role, User};
use crate::error::{AppError, AppResult};

/// True when `caller` is the assigned trainer of `target`.
pub fn is_trainer_of(caller: &AuthUser, target: &User) -> bool {
    caller.role == Role::Trainer && target.trainer_id == Some(caller.id)
}

/// Self, the user's trainer, or an admin.
pub fn can_view(caller: &AuthUser, target: &User) -> bool {
    caller.id == target.id || caller.is_admin() || is_trainer_of(caller, target)
}

/// The user's trainer or an admin; used for coaching actions such as plan assignment.
pub fn can_coach(caller: &AuthUser, target: &User) -> bool {
    caller.is_admin() || is_trainer_of(caller, target)
}

/// Loads a user the caller is allowed to see: 404 when missing, 403 otherwise.
pub async fn load_visible_user(db: &PgPool, caller: &AuthUser, user_id: Uuid) -> AppResult<User> {
    let user = User::find_by_id(db, user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    if !can_view(caller, &user) {
        return Err(AppError::forbidden());
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::sample_user;

    fn caller_for(user: &User) -> AuthUser {
        AuthUser {
            id: user.id,
            role: user.role,
        }
    }

    #[test]
    fn visibility_rules() {
        let trainer = sample_user(Role::Trainer);
        let other_trainer = sample_user(Role::Trainer);
        let admin = sample_user(Role::Admin);
        let stranger = sample_user(Role::User);
        let mut client = sample_user(Role::User);
        client.trainer_id = Some(trainer.id);

        assert!(can_view(&caller_for(&client), &client));
        assert!(can_view(&caller_for(&trainer), &client));
        assert!(can_view(&caller_for(&admin), &client));
        assert!(!can_view(&caller_for(&other_trainer), &client));
        assert!(!can_view(&caller_for(&stranger), &client));

        assert!(can_coach(&caller_for(&trainer), &client));
        assert!(!can_coach(&caller_for(&client), &client));
    }
}
