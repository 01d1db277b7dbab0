use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::FieldError;

time::serde::format_description!(pub(crate) iso_day, Date, "[year]-[month]-[day]");

/// Parses an optional `YYYY-MM-DD` query value.
pub fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<Date>, FieldError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Date::parse(s, format_description!("[year]-[month]-[day]"))
            .map(Some)
            .map_err(|_| FieldError::new(field, "must be a date in YYYY-MM-DD format")),
    }
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    pub session_id: Uuid,
    #[serde(default, with = "iso_day::option")]
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteExerciseRequest {
    pub session_exercise_id: Uuid,
    #[serde(default, with = "iso_day::option")]
    pub date: Option<Date>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistQuery {
    pub date: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAck {
    pub session_id: Uuid,
    pub session_exercise_id: Option<Uuid>,
    #[serde(with = "iso_day")]
    pub date: Date,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parse_day_accepts_iso_dates_only() {
        assert_eq!(parse_day("date", Some("2024-03-05")).unwrap(), Some(date!(2024 - 03 - 05)));
        assert_eq!(parse_day("date", None).unwrap(), None);
        assert_eq!(parse_day("date", Some("  ")).unwrap(), None);
        let err = parse_day("from", Some("05/03/2024")).unwrap_err();
        assert_eq!(err.field, "from");
    }

    #[test]
    fn request_date_is_optional() {
        let id = Uuid::new_v4();
        let with: CompleteSessionRequest =
            serde_json::from_str(&format!(r#"{{"sessionId":"{id}","date":"2024-02-29"}}"#)).unwrap();
        assert_eq!(with.date, Some(date!(2024 - 02 - 29)));
        let without: CompleteSessionRequest =
            serde_json::from_str(&format!(r#"{{"sessionId":"{id}"}}"#)).unwrap();
        assert_eq!(without.date, None);
    }
}
