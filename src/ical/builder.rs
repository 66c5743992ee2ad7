//! A module to build ICal files

use chrono::{DateTime, Utc};
use ics::properties::{Categories, Completed, Created, Description, Due, LastModified, PercentComplete, Status, Summary};
use ics::{ICalendar, ToDo};

use crate::task::{CompletionStatus, Task};
use super::{default_prod_id, escape_text, format_date_time};

/// Create an iCal item from a [`Task`].
///
/// `dtstamp` is the time the iCal object is created, which usually is "now".
/// The local-only fields of the task (archival, list name) are not part of the output.
pub fn build_from(task: &Task, dtstamp: &DateTime<Utc>) -> String {
    let mut todo = ToDo::new(
        task.id(),
        format_date_time(dtstamp),
    );
    todo.push(Created::new(format_date_time(task.created_at())));
    todo.push(LastModified::new(format_date_time(task.updated_at())));
    todo.push(Summary::new(escape_text(task.title())));

    if let Some(note) = task.note() {
        todo.push(Description::new(escape_text(note)));
    }
    if let Some(due) = task.due_date() {
        todo.push(Due::new(format_date_time(due)));
    }

    match task.completion_status() {
        CompletionStatus::Completed(at) => {
            todo.push(Status::completed());
            todo.push(Completed::new(format_date_time(at)));
            todo.push(PercentComplete::new("100"));
        },
        CompletionStatus::Uncompleted => {
            todo.push(Status::needs_action());
            todo.push(PercentComplete::new("0"));
        },
    }

    if task.tags().is_empty() == false {
        let categories: Vec<String> = task.tags().iter().map(|tag| escape_text(tag)).collect();
        todo.push(Categories::new(categories.join(",")));
    }

    let mut calendar = ICalendar::new("2.0", default_prod_id());
    calendar.add_todo(todo);

    calendar.to_string()
}
