//! Weekly `{day, time}` schedules attached to plan pivots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    /// Accepts short or full English day names, case-insensitive.
    /// Anything else is `None`, never a default day.
    pub fn parse(s: &str) -> Option<Weekday> {
        let day = match s.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => Weekday::Mon,
            "tue" | "tues" | "tuesday" => Weekday::Tue,
            "wed" | "wednesday" => Weekday::Wed,
            "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
            "fri" | "friday" => Weekday::Fri,
            "sat" | "saturday" => Weekday::Sat,
            "sun" | "sunday" => Weekday::Sun,
            _ => return None,
        };
        Some(day)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}

/// One schedule slot as stored in JSONB. The day stays a string so rows
/// written before validation existed still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: String,
    #[serde(default)]
    pub time: Option<String>,
}

impl ScheduleEntry {
    pub fn new(day: Weekday, time: Option<&str>) -> Self {
        Self {
            day: day.as_str().to_string(),
            time: time.map(str::to_string),
        }
    }

    pub fn weekday(&self) -> Option<Weekday> {
        Weekday::parse(&self.day)
    }
}

fn is_valid_time(t: &str) -> bool {
    let Some((h, m)) = t.split_once(':') else {
        return false;
    };
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return false;
    }
    matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}

/// Validates client-supplied entries and returns them with canonical day
/// names (`Mon`..`Sun`) and `HH:MM` times.
pub fn normalize_schedule(
    field: &str,
    entries: &[ScheduleEntry],
) -> Result<Vec<ScheduleEntry>, Vec<FieldError>> {
    let mut out = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let Some(day) = entry.weekday() else {
            errors.push(FieldError::new(
                format!("{}[{}].day", field, i),
                format!("unknown day {:?}", entry.day),
            ));
            continue;
        };
        let time = match entry.time.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            None => None,
            Some(t) if is_valid_time(t) => {
                let (h, m) = t.split_once(':').unwrap_or((t, "00"));
                Some(format!("{:0>2}:{}", h, m))
            }
            Some(t) => {
                errors.push(FieldError::new(
                    format!("{}[{}].time", field, i),
                    format!("invalid time {:?}, expected HH:MM", t),
                ));
                continue;
            }
        };
        out.push(ScheduleEntry {
            day: day.as_str().to_string(),
            time,
        });
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

/// A map holding a value for every weekday, serialized with keys `Mon`..`Sun`.
pub fn week_map<T>(mut init: impl FnMut() -> T) -> BTreeMap<Weekday, T> {
    Weekday::ALL.iter().map(|d| (*d, init())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_full_names() {
        assert_eq!(Weekday::parse("Mon"), Some(Weekday::Mon));
        assert_eq!(Weekday::parse("wednesday"), Some(Weekday::Wed));
        assert_eq!(Weekday::parse(" SUN "), Some(Weekday::Sun));
        assert_eq!(Weekday::parse("Funday"), None);
        assert_eq!(Weekday::parse(""), None);
    }

    #[test]
    fn normalize_canonicalizes_days_and_times() {
        let input = vec![
            ScheduleEntry {
                day: "monday".into(),
                time: Some("8:30".into()),
            },
            ScheduleEntry {
                day: "Fri".into(),
                time: None,
            },
        ];
        let out = normalize_schedule("schedule", &input).unwrap();
        assert_eq!(out[0], ScheduleEntry::new(Weekday::Mon, Some("08:30")));
        assert_eq!(out[1], ScheduleEntry::new(Weekday::Fri, None));
    }

    #[test]
    fn normalize_rejects_unknown_day_instead_of_defaulting() {
        let input = vec![
            ScheduleEntry {
                day: "Someday".into(),
                time: Some("12:00".into()),
            },
            ScheduleEntry {
                day: "Tue".into(),
                time: Some("25:00".into()),
            },
        ];
        let errors = normalize_schedule("schedule", &input).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "schedule[0].day");
        assert_eq!(errors[1].field, "schedule[1].time");
    }

    #[test]
    fn week_map_has_all_days_in_order() {
        let m = week_map(|| 0);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(
            json,
            r#"{"Mon":0,"Tue":0,"Wed":0,"Thu":0,"Fri":0,"Sat":0,"Sun":0}"#
        );
    }
}
