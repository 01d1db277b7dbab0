use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{repo_types::UserStatus, Role};
use crate::validate::nullable;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub trainer_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsQuery {
    pub trainer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "nullable")]
    pub trainer_id: Option<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTrainerRequest {
    pub trainer_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockRequest {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub until: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_sex", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserPersonal {
    pub user_id: Uuid,
    pub sex: Option<Sex>,
    pub height: Option<f64>,
    pub goal: Option<String>,
    pub nutrition_plan_id: Option<Uuid>,
    pub workout_plan_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl UserPersonal {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            sex: None,
            height: None,
            goal: None,
            nutrition_plan_id: None,
            workout_plan_id: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePersonalRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub sex: Option<Option<Sex>>,
    #[serde(default, deserialize_with = "nullable")]
    pub height: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub goal: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub nutrition_plan_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub workout_plan_id: Option<Option<Uuid>>,
}

impl UpdatePersonalRequest {
    pub fn touches_plans(&self) -> bool {
        self.nutrition_plan_id.is_some() || self.workout_plan_id.is_some()
    }

    pub fn apply(self, mut p: UserPersonal) -> UserPersonal {
        if let Some(v) = self.sex {
            p.sex = v;
        }
        if let Some(v) = self.height {
            p.height = v;
        }
        if let Some(v) = self.goal {
            p.goal = v.map(|g| g.trim().to_string()).filter(|g| !g.is_empty());
        }
        if let Some(v) = self.nutrition_plan_id {
            p.nutrition_plan_id = v;
        }
        if let Some(v) = self.workout_plan_id {
            p.workout_plan_id = v;
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_patch_only_touches_given_fields() {
        let mut current = UserPersonal::empty(Uuid::new_v4());
        current.height = Some(180.0);
        current.goal = Some("cut".into());

        let patch: UpdatePersonalRequest =
            serde_json::from_str(r#"{"sex":"female","goal":null}"#).unwrap();
        assert!(!patch.touches_plans());
        let next = patch.apply(current);
        assert_eq!(next.sex, Some(Sex::Female));
        assert_eq!(next.height, Some(180.0));
        assert_eq!(next.goal, None);
    }

    #[test]
    fn plan_assignment_is_detected() {
        let patch: UpdatePersonalRequest =
            serde_json::from_str(r#"{"workoutPlanId":null}"#).unwrap();
        assert!(patch.touches_plans());
    }

    #[test]
    fn user_filter_from_query_values() {
        let f: UserFilter =
            serde_json::from_str(r#"{"role":"trainer","status":"blocked","search":"ann"}"#).unwrap();
        assert_eq!(f.role, Some(Role::Trainer));
        assert_eq!(f.status, Some(UserStatus::Blocked));
        assert_eq!(f.search.as_deref(), Some("ann"));
    }
}
