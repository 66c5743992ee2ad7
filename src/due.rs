//! The due-date grammar
//!
//! Due dates are whole days: every accepted form resolves to 23:59:59 of some day, in the user's time zone.
//!
//! | Input                    | Meaning                                         |
//! |--------------------------|-------------------------------------------------|
//! | `+Nd`, `Nd`              | N days from today                               |
//! | `+Nw`, `Nw`              | N weeks from today                              |
//! | `+Nm`, `Nm`              | N calendar months from today (day is clamped)   |
//! | `today`                  | end of today                                    |
//! | `tomorrow`               | end of tomorrow                                 |
//! | `nextweek`               | end of next Monday (a week from today on Mondays)|
//! | `DD-MM-YYYY`, `YYYY-MM-DD` | that date                                     |

use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;

static RELATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?(\d+)([dwm])$").unwrap());
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap());

const ACCEPTED_FORMS: &str = "+Nd, +Nw, +Nm, today, tomorrow, nextweek, DD-MM-YYYY or YYYY-MM-DD";

/// Parse a due date relative to `now`, in the local time zone
pub fn parse_due(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    parse_due_in(input, &now.with_timezone(&Local))
}

/// Parse a due date relative to `now`, in the time zone of `now`
pub fn parse_due_in<Tz: TimeZone>(input: &str, now: &DateTime<Tz>) -> Result<DateTime<Utc>, Error> {
    let normalized = input.trim().to_lowercase();
    let today = now.date_naive();
    let tz = now.timezone();

    let day = match normalized.as_str() {
        "today" => today,
        "tomorrow" => add_days(today, 1, input)?,
        "nextweek" => {
            let days_to_monday = (7 - today.weekday().num_days_from_monday()) % 7;
            let days_to_monday = if days_to_monday == 0 { 7 } else { days_to_monday };
            add_days(today, days_to_monday.into(), input)?
        },
        other => {
            if let Some(caps) = RELATIVE.captures(other) {
                let amount: u32 = caps[1].parse()
                    .map_err(|_| Error::Parse(format!("{:?} is too large a due date offset", input)))?;
                if amount == 0 {
                    return Err(Error::Parse(format!("Invalid due date {:?}: the offset must be at least 1", input)));
                }
                match &caps[2] {
                    "d" => add_days(today, amount.into(), input)?,
                    "w" => add_days(today, i64::from(amount) * 7, input)?,
                    _ => today.checked_add_months(Months::new(amount))
                        .ok_or_else(|| Error::Parse(format!("{:?} is out of range", input)))?,
                }
            } else if ISO_DATE.is_match(other) {
                parse_civil_date(other, "%Y-%m-%d", input)?
            } else if DAY_FIRST.is_match(other) {
                parse_civil_date(other, "%d-%m-%Y", input)?
            } else {
                return Err(Error::Parse(format!("Invalid due date {:?}. Accepted forms are {}", input, ACCEPTED_FORMS)));
            }
        },
    };

    end_of_day_in(day, &tz)
}

/// Render a due date the way users type it back (`YYYY-MM-DD`, local time)
pub fn format_due(due: &DateTime<Utc>) -> String {
    due.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// 23:59:59 on the given local day
pub fn end_of_day(day: NaiveDate) -> Result<DateTime<Utc>, Error> {
    end_of_day_in(day, &Local)
}

pub fn end_of_day_in<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>, Error> {
    let naive = day.and_time(end_of_day_time());
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Parse(format!("{} does not exist in the local time zone", naive)))
}

/// Bounds of the local civil day containing `now`, as `[start, end)`
pub fn local_day_bounds(now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    day_bounds_in(&now.with_timezone(&Local))
}

pub fn day_bounds_in<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = add_days(today, 1, "tomorrow")?;
    Ok((start_of_day_in(today, &tz)?, start_of_day_in(tomorrow, &tz)?))
}

fn start_of_day_in<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>, Error> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        // Some zones skip midnight on DST changes
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Parse(format!("{} does not exist in the local time zone", naive)))
}

fn end_of_day_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn add_days(day: NaiveDate, days: i64, input: &str) -> Result<NaiveDate, Error> {
    day.checked_add_signed(Duration::days(days))
        .ok_or_else(|| Error::Parse(format!("{:?} is out of range", input)))
}

fn parse_civil_date(s: &str, format: &str, input: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(s, format)
        .map_err(|err| Error::Parse(format!("Invalid date {:?}: {}", input, err)))
}
