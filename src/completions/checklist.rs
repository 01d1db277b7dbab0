use std::collections::HashSet;

use serde::Serialize;
use time::Date;
use uuid::Uuid;

use super::dto::iso_day;
use crate::sessions::repo::SessionExercise;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub session_exercise_id: Uuid,
    pub exercise_id: Uuid,
    pub name: String,
    pub occurrence: i32,
    pub position: i32,
    pub sets: Option<i32>,
    pub reps: Option<i32>,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub session_id: Uuid,
    #[serde(with = "iso_day")]
    pub date: Date,
    pub items: Vec<ChecklistItem>,
    pub completed_count: usize,
    pub total: usize,
    pub session_completed: bool,
}

/// Merges prescribed exercises with the completion rows of one day.
/// `completions` holds `session_exercise_id` values, `None` for a whole-session mark.
pub fn build_checklist(
    session_id: Uuid,
    date: Date,
    mut prescribed: Vec<SessionExercise>,
    completions: &[Option<Uuid>],
) -> Checklist {
    prescribed.sort_by_key(|e| (e.position, e.occurrence));

    let whole_session = completions.iter().any(Option::is_none);
    let done: HashSet<Uuid> = completions.iter().flatten().copied().collect();

    let items: Vec<ChecklistItem> = prescribed
        .into_iter()
        .map(|e| ChecklistItem {
            completed: done.contains(&e.id),
            session_exercise_id: e.id,
            exercise_id: e.exercise_id,
            name: e.exercise_name,
            occurrence: e.occurrence,
            position: e.position,
            sets: e.sets,
            reps: e.reps,
        })
        .collect();

    let completed_count = items.iter().filter(|i| i.completed).count();
    let total = items.len();
    Checklist {
        session_id,
        date,
        session_completed: whole_session || (total > 0 && completed_count == total),
        items,
        completed_count,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn prescribed(position: i32, occurrence: i32) -> SessionExercise {
        SessionExercise {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            exercise_id: Uuid::new_v4(),
            exercise_name: format!("ex-{position}-{occurrence}"),
            occurrence,
            position,
            sets: Some(3),
            reps: Some(10),
            rest_seconds: None,
            notes: None,
        }
    }

    #[test]
    fn marks_checked_items_and_orders_by_position() {
        let a = prescribed(1, 1);
        let b = prescribed(0, 1);
        let c = prescribed(2, 2);
        let done = vec![Some(a.id)];
        let list = build_checklist(Uuid::nil(), date!(2024 - 05 - 01), vec![a.clone(), b, c], &done);

        let positions: Vec<_> = list.items.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(list.items[1].completed);
        assert_eq!(list.completed_count, 1);
        assert_eq!(list.total, 3);
        assert!(!list.session_completed);
    }

    #[test]
    fn all_checked_completes_the_session() {
        let a = prescribed(0, 1);
        let b = prescribed(1, 1);
        let done = vec![Some(a.id), Some(b.id)];
        let list = build_checklist(Uuid::nil(), date!(2024 - 05 - 01), vec![a, b], &done);
        assert!(list.session_completed);
        assert_eq!(list.completed_count, 2);
    }

    #[test]
    fn whole_session_mark_completes_even_when_items_are_open() {
        let list = build_checklist(Uuid::nil(), date!(2024 - 05 - 01), vec![prescribed(0, 1)], &[None]);
        assert!(list.session_completed);
        assert_eq!(list.completed_count, 0);
    }

    #[test]
    fn empty_session_is_not_completed_by_default() {
        let list = build_checklist(Uuid::nil(), date!(2024 - 05 - 01), Vec::new(), &[]);
        assert!(!list.session_completed);
        assert_eq!(list.total, 0);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["date"], "2024-05-01");
        assert_eq!(json["completedCount"], 0);
    }

    #[test]
    fn completions_for_other_exercises_are_ignored() {
        let a = prescribed(0, 1);
        let list = build_checklist(Uuid::nil(), date!(2024 - 05 - 01), vec![a], &[Some(Uuid::new_v4())]);
        assert_eq!(list.completed_count, 0);
        assert!(!list.items[0].completed);
    }
}
