//! Ordering and filtering of task lists

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::due::local_day_bounds;
use crate::error::Result;
use crate::task::Task;

/// The canonical order of the active list.
///
/// Incomplete tasks first, then tasks with a due date (earliest first) before tasks without one,
/// then by first tag, then by creation date.
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    a.completed().cmp(&b.completed())
        .then_with(|| compare_due_dates(a.due_date(), b.due_date()))
        .then_with(|| first_tag(a).cmp(first_tag(b)))
        .then_with(|| a.created_at().cmp(b.created_at()))
}

fn compare_due_dates(a: Option<&DateTime<Utc>>, b: Option<&DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn first_tag(task: &Task) -> &str {
    task.tags().first().map(String::as_str).unwrap_or("")
}

/// Stable sort in the canonical order
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}

/// Whether the characters of `pattern` appear in `text`, in order (case-insensitive)
pub fn fuzzy_match(pattern: &str, text: &str) -> bool {
    let mut text_chars = text.chars().flat_map(char::to_lowercase);
    pattern.chars()
        .flat_map(char::to_lowercase)
        .all(|p| text_chars.any(|t| t == p))
}

/// The tasks whose title fuzzy-matches `pattern`, in canonical order.
/// An empty pattern matches everything.
pub fn search(tasks: &[Task], pattern: &str) -> Vec<Task> {
    let mut found: Vec<Task> = tasks.iter()
        .filter(|t| fuzzy_match(pattern, t.title()))
        .cloned()
        .collect();
    sort_tasks(&mut found);
    found
}

/// Incomplete tasks due during the local day of `now`, in canonical order
pub fn due_today(tasks: &[Task], now: DateTime<Utc>) -> Result<Vec<Task>> {
    let (start, end) = local_day_bounds(now)?;
    let mut found: Vec<Task> = tasks.iter()
        .filter(|t| t.completed() == false)
        .filter(|t| matches!(t.due_date(), Some(due) if *due >= start && *due < end))
        .cloned()
        .collect();
    sort_tasks(&mut found);
    Ok(found)
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::due::end_of_day;
    use crate::task::{CompletionStatus, ListName};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap()
    }

    fn task(title: &str, tags: &[&str], due: Option<DateTime<Utc>>, created_offset: i64) -> Task {
        let created = t0() + Duration::minutes(created_offset);
        Task::new_with_parameters(title.to_string(), title.to_string(), None,
            tags.iter().map(|t| t.to_string()).collect(), due, CompletionStatus::Uncompleted,
            created, created, ListName::Local)
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title()).collect()
    }

    #[test]
    fn canonical_order() {
        let today = end_of_day(t0().with_timezone(&chrono::Local).date_naive()).unwrap();
        let mut done = task("done", &[], Some(today - Duration::days(3)), 0);
        done.toggle_completion(t0());

        let mut tasks = vec![
            done,
            task("no due, tag b", &["b"], None, 1),
            task("no due, tag a", &["a"], None, 2),
            task("due later", &[], Some(today + Duration::days(2)), 3),
            task("due today", &[], Some(today), 4),
            task("no due, untagged, old", &[], None, 5),
            task("no due, untagged, new", &[], None, 6),
        ];
        sort_tasks(&mut tasks);
        assert_eq!(titles(&tasks), vec![
            "due today", "due later",
            "no due, untagged, old", "no due, untagged, new", "no due, tag a", "no due, tag b",
            "done",
        ]);
    }

    #[test]
    fn fuzzy() {
        assert!(fuzzy_match("bml", "Buy milk"));
        assert!(fuzzy_match("", "anything"));
        assert!(fuzzy_match("MILK", "buy milk"));
        assert!(fuzzy_match("klim", "Buy milk") == false);
        assert!(fuzzy_match("milks", "Buy milk") == false);
    }

    #[test]
    fn empty_search_returns_everything() {
        let tasks = vec![task("b", &["x"], None, 0), task("a", &[], None, 1)];
        let mut sorted = tasks.clone();
        sort_tasks(&mut sorted);
        assert_eq!(search(&tasks, ""), sorted);
        assert_eq!(titles(&search(&tasks, "A")), vec!["a"]);
    }

    #[test]
    fn due_today_window() {
        let (start, end) = local_day_bounds(t0()).unwrap();
        let mut completed = task("completed", &[], Some(start), 0);
        completed.toggle_completion(t0());

        let tasks = vec![
            task("at start", &[], Some(start), 1),
            task("last second", &[], Some(end - Duration::seconds(1)), 2),
            task("at end", &[], Some(end), 3),
            task("yesterday", &[], Some(start - Duration::seconds(1)), 4),
            task("no due date", &[], None, 5),
            completed,
        ];
        assert_eq!(titles(&due_today(&tasks, t0()).unwrap()), vec!["at start", "last second"]);
    }
}
