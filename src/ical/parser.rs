//! A module to parse ICal files

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use ical::parser::ical::component::IcalTodo;
use ical::property::Property;
use uuid::Uuid;

use crate::due::end_of_day;
use crate::error::Error;
use crate::task::{CompletionStatus, ListName, Task};
use super::{split_text_list, unescape_text};


/// Parse an iCal file into a [`Task`].
///
/// `content` may be a whole `VCALENDAR`, or a bare `VTODO` block. Only the first `VTODO` is considered.
/// `now` is used for the fields the server did not provide (and that a [`Task`] requires).
///
/// The returned task belongs to the [`ListName::Remote`] list.
pub fn parse(content: &str, now: DateTime<Utc>) -> Result<Task, Error> {
    let normalized = normalize_lines(content);
    let mut reader = ical::IcalParser::new(normalized.as_bytes());
    let calendar = match reader.next() {
        None => return Err(Error::Parse("Invalid iCal data to parse".to_string())),
        Some(item) => match item {
            Err(err) => return Err(Error::Parse(format!("Unable to parse iCal data: {}", err))),
            Ok(item) => item,
        }
    };

    let todo = match calendar.todos.first() {
        None => return Err(Error::Parse("iCal data contains no VTODO".to_string())),
        Some(todo) => todo,
    };
    if calendar.todos.len() > 1 {
        log::debug!("iCal data contains {} VTODOs, only the first one is used", calendar.todos.len());
    }

    parse_todo(todo, now)
}

fn parse_todo(todo: &IcalTodo, now: DateTime<Utc>) -> Result<Task, Error> {
    let mut uid = None;
    let mut summary = None;
    let mut description = None;
    let mut tags = Vec::new();
    let mut due_date = None;
    let mut status_completed = false;
    let mut completed_at = None;
    let mut created_at = None;
    let mut last_modified = None;

    for prop in &todo.properties {
        let value = match prop.value.as_deref() {
            None => continue,
            Some(value) => value,
        };

        match prop.name.to_uppercase().as_str() {
            "UID" => uid = Some(value.trim().to_string()),
            "SUMMARY" => summary = Some(unescape_text(value)),
            "DESCRIPTION" => description = Some(unescape_text(value)),
            "CATEGORIES" => tags.extend(split_text_list(value)),
            "STATUS" => status_completed = value.trim().eq_ignore_ascii_case("COMPLETED"),
            "DUE" => due_date = Some(parse_date_time(prop, value, DateKind::Due)?),
            "COMPLETED" => completed_at = Some(parse_date_time(prop, value, DateKind::Instant)?),
            "CREATED" => created_at = Some(parse_date_time(prop, value, DateKind::Instant)?),
            "LAST-MODIFIED" => last_modified = Some(parse_date_time(prop, value, DateKind::Instant)?),
            _ => {},
        }
    }

    let title = match summary {
        Some(title) if title.trim().is_empty() == false => title.trim().to_string(),
        _ => return Err(Error::Parse(format!("Missing SUMMARY for item {}", uid.as_deref().unwrap_or("<no UID>")))),
    };
    let id = match uid {
        Some(uid) if uid.is_empty() == false => uid,
        _ => {
            let new_id = Uuid::new_v4().to_hyphenated().to_string();
            log::debug!("VTODO {:?} has no UID, assigning {}", title, new_id);
            new_id
        },
    };

    let created_at = created_at.or(last_modified).unwrap_or(now);
    let updated_at = last_modified.unwrap_or(created_at);
    let completion_status = if status_completed || completed_at.is_some() {
        CompletionStatus::Completed(completed_at.or(last_modified).unwrap_or(now))
    } else {
        CompletionStatus::Uncompleted
    };

    Ok(Task::new_with_parameters(id, title, description, tags, due_date, completion_status, created_at, updated_at, ListName::Remote))
}

/// Splits on LF and strips trailing CRs.
/// Bare `VTODO` blocks are wrapped into a `VCALENDAR`, as the parser expects one.
fn normalize_lines(content: &str) -> String {
    let lines: Vec<&str> = content.lines()
        .map(|line| line.trim_end_matches('\r'))
        .skip_while(|line| line.trim().is_empty())
        .collect();

    let mut normalized = String::with_capacity(content.len() + 64);
    let is_bare_todo = lines.first().map(|l| l.trim().eq_ignore_ascii_case("BEGIN:VTODO")).unwrap_or(false);
    if is_bare_todo {
        normalized.push_str("BEGIN:VCALENDAR\n");
    }
    for line in lines {
        normalized.push_str(line);
        normalized.push('\n');
    }
    if is_bare_todo {
        normalized.push_str("END:VCALENDAR\n");
    }
    normalized
}

enum DateKind {
    /// A plain date means the end of that (local) day
    Due,
    /// A plain date means the start of that (local) day
    Instant,
}

/// Parses the three supported forms: `YYYYMMDD`, `YYYYMMDDThhmmssZ` (UTC) and `YYYYMMDDThhmmss` (floating, i.e. local)
fn parse_date_time(prop: &Property, value: &str, kind: DateKind) -> Result<DateTime<Utc>, Error> {
    let value = value.trim();
    let invalid = |err: chrono::ParseError| Error::Parse(format!("Invalid {} value {:?}: {}", prop.name, value, err));

    if is_date_only(prop, value) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").map_err(invalid)?;
        return match kind {
            DateKind::Due => end_of_day(date),
            DateKind::Instant => from_local(date.and_time(NaiveTime::MIN), prop, value),
        };
    }

    if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(invalid)?;
        return Ok(Utc.from_utc_datetime(&naive));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(invalid)?;
    from_local(naive, prop, value)
}

fn is_date_only(prop: &Property, value: &str) -> bool {
    let declared_as_date = prop.params.as_ref()
        .map(|params| params.iter().any(|(name, values)| {
            name.eq_ignore_ascii_case("VALUE") && values.iter().any(|v| v.eq_ignore_ascii_case("DATE"))
        }))
        .unwrap_or(false);

    declared_as_date || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()))
}

fn from_local(naive: NaiveDateTime, prop: &Property, value: &str) -> Result<DateTime<Utc>, Error> {
    Local.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Parse(format!("{} value {:?} does not exist in the local time zone", prop.name, value)))
}
