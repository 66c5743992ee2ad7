//! This module handles conversion between iCal files and [`Task`](crate::Task)s
//!
//! Output is generated with the `ics` crate and input is read with the `ical` crate, as neither does both.
//! Only the `VTODO` properties a [`Task`](crate::Task) carries are handled.

mod parser;
pub use parser::parse;
mod builder;
pub use builder::build_from;

use chrono::{DateTime, Utc};

/// Part of the PRODID string that describes the organization
pub const ORG_NAME: &str = "cbra";
/// Part of the PRODID string that describes the product
pub const PRODUCT_NAME: &str = "cbratasks";

pub fn default_prod_id() -> String {
    format!("-//{}//{}//EN", ORG_NAME, PRODUCT_NAME)
}

/// Format an instant as an iCal UTC date-time (`YYYYMMDDThhmmssZ`)
pub fn format_date_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape a TEXT value (RFC 5545, section 3.3.11)
pub fn escape_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverse [`escape_text`].
///
/// Unknown escape sequences are kept verbatim.
pub fn unescape_text(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => unescaped.push('\n'),
            Some(';') => unescaped.push(';'),
            Some(',') => unescaped.push(','),
            Some('\\') => unescaped.push('\\'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            },
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Split a multi-valued TEXT property (such as `CATEGORIES`) on its unescaped commas, and unescape every value
pub fn split_text_list(value: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            ',' => values.push(unescape_text(&std::mem::take(&mut current))),
            c => current.push(c),
        }
    }
    values.push(unescape_text(&current));
    values
}
