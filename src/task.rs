//! To-do tasks (iCal `VTODO` item)

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::error::Error;

/// How long a task must have been completed before it gets archived when the store is loaded
pub fn auto_archive_delay() -> Duration {
    Duration::hours(24)
}

/// Which list a task belongs to.
///
/// Only `Remote` tasks are ever sent to the CalDAV server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListName {
    Local,
    Remote,
}

impl Default for ListName {
    fn default() -> Self {
        ListName::Local
    }
}

impl Display for ListName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ListName::Local => write!(f, "local"),
            ListName::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for ListName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(ListName::Local),
            "remote" => Ok(ListName::Remote),
            other => Err(Error::Parse(format!("unknown list name {:?} (expected \"local\" or \"remote\")", other))),
        }
    }
}

/// RFC5545 defines the completion as several optional fields, yet some combinations make no sense.
/// This enum provides an API that forbids such impossible combinations.
///
/// A completed task always knows when it was completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed(DateTime<Utc>),
    Uncompleted,
}
impl CompletionStatus {
    pub fn is_completed(&self) -> bool {
        match self {
            CompletionStatus::Completed(_) => true,
            _ => false,
        }
    }

    pub fn completed_at(&self) -> Option<&DateTime<Utc>> {
        match self {
            CompletionStatus::Completed(at) => Some(at),
            CompletionStatus::Uncompleted => None,
        }
    }
}

/// Lower-cases and trims a tag. Returns `None` for tags that are empty once trimmed.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Normalizes every tag and drops duplicates, keeping the first occurrence
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result: Vec<String> = Vec::new();
    for tag in tags {
        if let Some(tag) = normalize_tag(tag.as_ref()) {
            if result.contains(&tag) == false {
                result.push(tag);
            }
        }
    }
    result
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.filter(|n| n.trim().is_empty() == false)
}

fn normalize_title(title: &str) -> Result<String, Error> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Parse("a task title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}


/// A to-do task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    /// Persistent, globally unique identifier. This is also the iCal `UID` and the stem of the remote file name
    id: String,
    /// The display name of the task
    title: String,
    note: Option<String>,
    tags: Vec<String>,
    /// End of the day the task is due, in the user's time zone
    due_date: Option<DateTime<Utc>>,
    completion_status: CompletionStatus,
    created_at: DateTime<Utc>,
    /// The last time this task was modified
    updated_at: DateTime<Utc>,
    /// Local-only flag, never sent to the server
    archived: bool,
    list_name: ListName,
}


impl Task {
    /// Create a brand new task.
    /// This will pick a new (random) task ID.
    pub fn new(title: &str, list_name: ListName, now: DateTime<Utc>) -> Result<Self, Error> {
        let title = normalize_title(title)?;
        let new_id = Uuid::new_v4().to_hyphenated().to_string();
        let now = now.trunc_subsecs(0);
        Ok(Self::new_with_parameters(new_id, title, None, Vec::new(), None, CompletionStatus::Uncompleted, now, now, list_name))
    }

    /// Create a new Task instance, that may exist on a server already.
    ///
    /// Tags and note are normalized, and `updated_at` is never earlier than `created_at`.
    pub fn new_with_parameters(id: String, title: String, note: Option<String>, tags: Vec<String>,
                               due_date: Option<DateTime<Utc>>, completion_status: CompletionStatus,
                               created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
                               list_name: ListName,
                            ) -> Self
    {
        let created_at = created_at.trunc_subsecs(0);
        let updated_at = std::cmp::max(updated_at.trunc_subsecs(0), created_at);
        let completion_status = match completion_status {
            CompletionStatus::Completed(at) => CompletionStatus::Completed(at.trunc_subsecs(0)),
            CompletionStatus::Uncompleted => CompletionStatus::Uncompleted,
        };
        Self {
            id,
            title,
            note: normalize_note(note),
            tags: normalize_tags(tags),
            due_date: due_date.map(|d| d.trunc_subsecs(0)),
            completion_status,
            created_at,
            updated_at,
            archived: false,
            list_name,
        }
    }

    pub fn id(&self) -> &str        { &self.id          }
    pub fn title(&self) -> &str     { &self.title       }
    pub fn note(&self) -> Option<&str>  { self.note.as_deref() }
    pub fn tags(&self) -> &[String]     { &self.tags        }
    pub fn completed(&self) -> bool     { self.completion_status.is_completed() }
    pub fn archived(&self) -> bool      { self.archived     }
    pub fn list_name(&self) -> ListName { self.list_name    }
    pub fn due_date(&self) -> Option<&DateTime<Utc>>     { self.due_date.as_ref() }
    pub fn completed_at(&self) -> Option<&DateTime<Utc>> { self.completion_status.completed_at() }
    pub fn created_at(&self) -> &DateTime<Utc>           { &self.created_at }
    pub fn updated_at(&self) -> &DateTime<Utc>           { &self.updated_at }
    pub fn completion_status(&self) -> &CompletionStatus { &self.completion_status }

    /// Whether this task is synced with the CalDAV server
    pub fn is_remote(&self) -> bool {
        self.list_name == ListName::Remote
    }

    /// Whether this task has been completed for long enough to be archived
    pub fn is_archivable(&self, now: DateTime<Utc>) -> bool {
        match &self.completion_status {
            CompletionStatus::Completed(at) => now.signed_duration_since(*at) > auto_archive_delay(),
            CompletionStatus::Uncompleted => false,
        }
    }

    fn update_last_modified(&mut self, now: DateTime<Utc>) {
        let now = now.trunc_subsecs(0);
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Raise `updated_at` to `prev` if it is earlier, leaving the content untouched
    pub(crate) fn set_updated_at_at_least(&mut self, prev: DateTime<Utc>) {
        self.update_last_modified(prev);
    }

    /// Rename a task.
    /// This updates its "last modified" field
    pub fn set_title(&mut self, new_title: &str, now: DateTime<Utc>) -> Result<(), Error> {
        let new_title = normalize_title(new_title)?;
        self.update_last_modified(now);
        self.title = new_title;
        Ok(())
    }

    /// Set or clear the note. An empty note is the same as no note.
    pub fn set_note(&mut self, new_note: Option<String>, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.note = normalize_note(new_note);
    }

    pub fn set_tags(&mut self, new_tags: Vec<String>, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.tags = normalize_tags(new_tags);
    }

    /// Add a tag, unless the task already has it.
    /// Returns whether the tag list changed
    pub fn add_tag(&mut self, tag: &str, now: DateTime<Utc>) -> bool {
        let tag = match normalize_tag(tag) {
            None => return false,
            Some(tag) => tag,
        };
        if self.tags.contains(&tag) {
            return false;
        }
        self.update_last_modified(now);
        self.tags.push(tag);
        true
    }

    /// Remove a tag.
    /// Returns whether the tag list changed
    pub fn remove_tag(&mut self, tag: &str, now: DateTime<Utc>) -> bool {
        let tag = match normalize_tag(tag) {
            None => return false,
            Some(tag) => tag,
        };
        let len_before = self.tags.len();
        self.tags.retain(|t| t != &tag);
        if self.tags.len() == len_before {
            return false;
        }
        self.update_last_modified(now);
        true
    }

    pub fn set_due_date(&mut self, new_due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.due_date = new_due_date.map(|d| d.trunc_subsecs(0));
    }

    /// Set the completion status
    pub fn set_completion_status(&mut self, new_completion_status: CompletionStatus, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.completion_status = match new_completion_status {
            CompletionStatus::Completed(at) => CompletionStatus::Completed(at.trunc_subsecs(0)),
            CompletionStatus::Uncompleted => CompletionStatus::Uncompleted,
        };
    }

    /// Mark an uncompleted task as completed `now`, or reopen a completed one
    pub fn toggle_completion(&mut self, now: DateTime<Utc>) {
        let new_status = match self.completion_status {
            CompletionStatus::Uncompleted => CompletionStatus::Completed(now),
            CompletionStatus::Completed(_) => CompletionStatus::Uncompleted,
        };
        self.set_completion_status(new_status, now);
    }

    pub fn set_list_name(&mut self, new_list_name: ListName, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.list_name = new_list_name;
    }

    pub fn set_archived(&mut self, archived: bool, now: DateTime<Utc>) {
        self.update_last_modified(now);
        self.archived = archived;
    }
}


/// The on-disk representation of a [`Task`].
///
/// Completion is stored as two separate keys so that the files stay readable by other tools.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TaskRecord {
    id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    list_name: ListName,
}

impl TryFrom<TaskRecord> for Task {
    type Error = Error;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.id.trim().is_empty() {
            return Err(Error::Parse("a task id cannot be empty".to_string()));
        }
        let title = normalize_title(&record.title)?;
        let updated_at = record.updated_at.unwrap_or(record.created_at);
        let completion_status = match (record.completed, record.completed_at) {
            (true, Some(at)) => CompletionStatus::Completed(at),
            (true, None) => {
                log::warn!("Task {} is completed but has no completion date. Using its last modification date", record.id);
                CompletionStatus::Completed(updated_at)
            },
            (false, _) => CompletionStatus::Uncompleted,
        };

        let mut task = Task::new_with_parameters(
            record.id, title, record.note, record.tags, record.due_date,
            completion_status, record.created_at, updated_at, record.list_name,
        );
        task.archived = record.archived;
        Ok(task)
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        let completed_at = task.completed_at().cloned();
        Self {
            completed: task.completed(),
            completed_at,
            id: task.id,
            title: task.title,
            note: task.note,
            tags: task.tags,
            due_date: task.due_date,
            created_at: task.created_at,
            updated_at: Some(task.updated_at),
            archived: task.archived,
            list_name: task.list_name,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap()
    }

    #[test]
    fn toggling_sets_and_clears_completion_date() {
        let mut task = Task::new("Water the plants", ListName::Local, t0()).unwrap();
        assert_eq!(task.completed(), false);
        assert_eq!(task.completed_at(), None);

        let later = t0() + Duration::minutes(5);
        task.toggle_completion(later);
        assert_eq!(task.completed(), true);
        assert_eq!(task.completed_at(), Some(&later));
        assert_eq!(task.updated_at(), &later);

        let even_later = later + Duration::minutes(5);
        task.toggle_completion(even_later);
        assert_eq!(task.completed(), false);
        assert_eq!(task.completed_at(), None);
        assert_eq!(task.updated_at(), &even_later);
    }

    #[test]
    fn updated_at_never_goes_backwards() {
        let mut task = Task::new("Task", ListName::Local, t0()).unwrap();
        task.set_note(Some("note".to_string()), t0() - Duration::hours(3));
        assert_eq!(task.updated_at(), &t0());
        assert_eq!(task.note(), Some("note"));

        task.set_updated_at_at_least(t0() - Duration::days(1));
        assert_eq!(task.updated_at(), &t0());
        task.set_updated_at_at_least(t0() + Duration::hours(2));
        assert_eq!(task.updated_at(), &(t0() + Duration::hours(2)));
    }

    #[test]
    fn empty_titles_are_refused() {
        assert!(Task::new("   ", ListName::Local, t0()).is_err());
        let mut task = Task::new("A title", ListName::Local, t0()).unwrap();
        assert!(task.set_title("", t0()).is_err());
        assert_eq!(task.title(), "A title");
    }

    #[test]
    fn tags_are_normalized() {
        let mut task = Task::new("Task", ListName::Local, t0()).unwrap();
        task.set_tags(vec!["Work".to_string(), " work ".to_string(), "".to_string(), "home".to_string()], t0());
        assert_eq!(task.tags(), &["work".to_string(), "home".to_string()]);

        assert_eq!(task.add_tag("HOME", t0()), false);
        assert_eq!(task.add_tag("garden", t0()), true);
        assert_eq!(task.remove_tag("Work", t0()), true);
        assert_eq!(task.remove_tag("work", t0()), false);
        assert_eq!(task.tags(), &["home".to_string(), "garden".to_string()]);
    }

    #[test]
    fn archivable_only_after_a_full_day() {
        let mut task = Task::new("Task", ListName::Local, t0()).unwrap();
        assert_eq!(task.is_archivable(t0() + Duration::days(30)), false);

        task.toggle_completion(t0());
        assert_eq!(task.is_archivable(t0() + Duration::hours(24)), false);
        assert_eq!(task.is_archivable(t0() + Duration::hours(24) + Duration::seconds(1)), true);
    }

    #[test]
    fn json_uses_separate_completion_keys() {
        let mut task = Task::new("Task", ListName::Remote, t0()).unwrap();
        task.toggle_completion(t0());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["completed"], serde_json::Value::Bool(true));
        assert_eq!(json["list_name"], serde_json::Value::String("remote".to_string()));
        assert!(json["completed_at"].is_string());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn json_completed_without_date_is_repaired() {
        let json = r#"{"id": "abc", "title": "Old task", "completed": true,
                       "created_at": "2024-01-01T10:00:00Z", "updated_at": "2024-01-02T10:00:00Z",
                       "some_unknown_key": 42}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.completed_at(), Some(&Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap()));
        assert_eq!(task.list_name(), ListName::Local);
    }

    #[test]
    fn list_names_parse() {
        assert_eq!("Remote".parse::<ListName>().unwrap(), ListName::Remote);
        assert_eq!("local".parse::<ListName>().unwrap(), ListName::Local);
        assert!("shared".parse::<ListName>().is_err());
    }
}
