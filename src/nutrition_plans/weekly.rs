//! Weekly view of a nutrition plan: each meal pivot is filed under the days of
//! its schedule and macro totals are summed per day and for the whole week.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use super::repo::PlanMeal;
use crate::{
    meals::repo_types::Macros,
    schedule::{week_map, Weekday},
};

/// A pivot as it appears in a day bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotWithCalc {
    #[serde(flatten)]
    pub pivot: PlanMeal,
    pub time: Option<String>,
    pub multiplier: f64,
    pub totals: Macros,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTotals {
    pub by_day: BTreeMap<Weekday, Macros>,
    pub week: Macros,
}

#[derive(Debug, Serialize)]
pub struct WeeklySchedule {
    pub schedule: BTreeMap<Weekday, Vec<PivotWithCalc>>,
    pub totals: ScheduleTotals,
}

/// `quantity`, else `quantityKg`, else one serving.
pub fn multiplier(pivot: &PlanMeal) -> f64 {
    pivot.quantity.or(pivot.quantity_kg).unwrap_or(1.0)
}

/// Builds the weekly schedule from pivots ordered by position.
///
/// A pivot scheduled on several days contributes once per distinct day, so
/// the week total counts it once for every day it appears on. Pivots with an
/// empty schedule appear nowhere and add nothing.
pub fn aggregate(pivots: Vec<PlanMeal>) -> WeeklySchedule {
    let mut schedule = week_map(Vec::new);
    let mut by_day = week_map(Macros::default);
    let mut week = Macros::default();

    for pivot in pivots {
        let factor = multiplier(&pivot);
        let totals = pivot.macros.scaled(factor);

        // First entry per day wins; duplicates of a day are credited once.
        let mut days: BTreeMap<Weekday, Option<String>> = BTreeMap::new();
        for entry in pivot.schedule.iter() {
            let Some(day) = entry.weekday() else {
                warn!(pivot_id = %pivot.id, day = %entry.day, "skipping schedule entry with unknown day");
                continue;
            };
            days.entry(day).or_insert_with(|| entry.time.clone());
        }

        for (day, time) in days {
            if let Some(bucket) = schedule.get_mut(&day) {
                bucket.push(PivotWithCalc {
                    pivot: pivot.clone(),
                    time,
                    multiplier: factor,
                    totals,
                });
            }
            if let Some(sum) = by_day.get_mut(&day) {
                sum.add(totals);
            }
            week.add(totals);
        }
    }

    WeeklySchedule {
        schedule,
        totals: ScheduleTotals { by_day, week },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleEntry;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn pivot(days: &[&str], quantity: Option<f64>, quantity_kg: Option<f64>, calories: f64) -> PlanMeal {
        PlanMeal {
            id: Uuid::new_v4(),
            nutrition_plan_id: Uuid::nil(),
            meal_id: Uuid::new_v4(),
            meal_name: "Rice".into(),
            quantity,
            quantity_kg,
            schedule: Json(
                days.iter()
                    .map(|d| ScheduleEntry {
                        day: d.to_string(),
                        time: None,
                    })
                    .collect(),
            ),
            position: 0,
            macros: Macros {
                calories,
                protein: 10.0,
                carbs: 0.0,
                fat: 1.0,
            },
        }
    }

    #[test]
    fn multi_day_pivot_counts_once_per_day() {
        let out = aggregate(vec![pivot(&["Mon", "Wed"], Some(2.0), None, 200.0)]);
        assert_eq!(out.totals.by_day[&Weekday::Mon].calories, 400.0);
        assert_eq!(out.totals.by_day[&Weekday::Wed].calories, 400.0);
        assert_eq!(out.totals.by_day[&Weekday::Tue].calories, 0.0);
        assert_eq!(out.totals.week.calories, 800.0);
        assert_eq!(out.totals.week.protein, 40.0);
        assert_eq!(out.schedule[&Weekday::Mon].len(), 1);
        assert_eq!(out.schedule[&Weekday::Wed][0].totals.calories, 400.0);
    }

    #[test]
    fn empty_schedule_contributes_nothing() {
        let out = aggregate(vec![
            pivot(&[], Some(3.0), None, 500.0),
            pivot(&["Fri"], None, None, 100.0),
        ]);
        assert_eq!(out.totals.week.calories, 100.0);
        let filed: usize = out.schedule.values().map(Vec::len).sum();
        assert_eq!(filed, 1);
    }

    #[test]
    fn multiplier_prefers_quantity_then_kg_then_one() {
        assert_eq!(multiplier(&pivot(&[], Some(2.0), Some(0.5), 1.0)), 2.0);
        assert_eq!(multiplier(&pivot(&[], None, Some(0.5), 1.0)), 0.5);
        assert_eq!(multiplier(&pivot(&[], None, None, 1.0)), 1.0);

        let out = aggregate(vec![pivot(&["Sun"], None, None, 250.0)]);
        assert_eq!(out.totals.by_day[&Weekday::Sun].calories, 250.0);
    }

    #[test]
    fn repeated_day_is_credited_once() {
        let out = aggregate(vec![pivot(&["Tue", "tuesday", "Tue"], Some(1.0), None, 300.0)]);
        assert_eq!(out.schedule[&Weekday::Tue].len(), 1);
        assert_eq!(out.totals.by_day[&Weekday::Tue].calories, 300.0);
        assert_eq!(out.totals.week.calories, 300.0);
    }

    #[test]
    fn unknown_day_is_skipped_not_filed_under_monday() {
        let out = aggregate(vec![pivot(&["Someday", "Thu"], None, None, 120.0)]);
        assert!(out.schedule[&Weekday::Mon].is_empty());
        assert_eq!(out.totals.by_day[&Weekday::Thu].calories, 120.0);
        assert_eq!(out.totals.week.calories, 120.0);
    }

    #[test]
    fn all_seven_days_are_always_present() {
        let out = aggregate(Vec::new());
        let json = serde_json::to_value(&out).unwrap();
        for day in ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] {
            assert!(json["schedule"][day].as_array().unwrap().is_empty());
            assert_eq!(json["totals"]["byDay"][day]["calories"], 0.0);
        }
        assert_eq!(json["totals"]["week"]["fat"], 0.0);
    }
}
