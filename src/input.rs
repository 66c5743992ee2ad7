//! Quick-add syntax for new tasks
//!
//! `Buy milk +shopping +1d` is a task titled `Buy milk`, tagged `shopping`, due tomorrow.
//! A `+word` is a due date when `word` follows the [due-date grammar](crate::due), and a tag otherwise.

use chrono::{DateTime, Utc};

use crate::due::parse_due;
use crate::error::Error;
use crate::task::normalize_tag;

/// The fields extracted from a quick-add line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInput {
    pub title: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskInput {
    pub fn parse(input: &str, now: DateTime<Utc>) -> Result<Self, Error> {
        let mut title_words = Vec::new();
        let mut tags: Vec<String> = Vec::new();
        let mut due_date = None;

        for word in input.split_whitespace() {
            let marker = match word.strip_prefix('+') {
                Some(rest) if rest.is_empty() == false => rest,
                _ => {
                    title_words.push(word);
                    continue;
                },
            };

            if let Ok(due) = parse_due(marker, now) {
                // The last due date wins
                due_date = Some(due);
                continue;
            }

            if let Some(tag) = normalize_tag(marker) {
                if tags.contains(&tag) == false {
                    tags.push(tag);
                }
            }
        }

        let title = title_words.join(" ");
        if title.is_empty() {
            return Err(Error::Parse(format!("{:?} has no title", input)));
        }

        Ok(Self { title, tags, due_date })
    }
}
