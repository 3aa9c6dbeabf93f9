// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Launchd schedule handling.
//!
//! Launchd can start a job in one of two ways that launchd-me cares about:
//!
//! 1. __Interval__: every N seconds through the `StartInterval` key.
//! 2. __Calendar__: whenever the current time matches a set of calendar
//!    fields through the `StartCalendarInterval` key, e.g., `{"Hour": 9,
//!    "Minute": 30}` starts the job every day at 9:30 AM.
//!
//! Only a single calendar entry with scalar fields is supported. Launchd also
//! accepts arrays of calendar dictionaries, but launchd-me rejects them rather
//! than silently keeping the first entry.
//!
//! Calendar fields omitted from a schedule act as wildcards. Thus, an empty
//! calendar schedule is valid, but means "run every minute".
//!
//! # See Also
//!
//! 1. [launchd.info - StartCalendarInterval](https://www.launchd.info)

use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::RangeInclusive,
    str::FromStr,
};

/// Valid calendar fields and their inclusive value ranges.
///
/// Weekday 0 is Sunday.
const CALENDAR_FIELDS: [(&str, RangeInclusive<i64>); 5] = [
    ("Month", 1..=12),
    ("Day", 1..=31),
    ("Hour", 0..=23),
    ("Minute", 0..=59),
    ("Weekday", 0..=6),
];

/// Discriminator of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Interval,
    Calendar,
}

impl FromStr for ScheduleType {
    type Err = ScheduleError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "interval" => Ok(Self::Interval),
            "calendar" => Ok(Self::Calendar),
            other => Err(ScheduleError::InvalidScheduleType(other.into())),
        }
    }
}

impl Display for ScheduleType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Interval => fmt.write_str("interval"),
            Self::Calendar => fmt.write_str("calendar"),
        }
    }
}

/// When launchd should start a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Start job every given number of seconds.
    Interval(u64),

    /// Start job whenever calendar fields match.
    ///
    /// Keys are ordered alphabetically, so rendered output is reproducible.
    Calendar(BTreeMap<String, i64>),
}

impl Schedule {
    /// Construct calendar schedule from field/value pairs.
    pub fn calendar(fields: impl IntoIterator<Item = (impl Into<String>, i64)>) -> Self {
        Self::Calendar(
            fields
                .into_iter()
                .map(|(field, value)| (field.into(), value))
                .collect(),
        )
    }

    /// Parse schedule details supplied by the user.
    ///
    /// Interval details are a positive number of seconds. Calendar details are
    /// a JSON object of integers, e.g., `{"Day": 15, "Hour": 15}`. Single
    /// quotes are accepted in place of double quotes, but only if the details
    /// are not valid JSON as given.
    ///
    /// Parsing does not check calendar field names or ranges. Use
    /// [`Schedule::validate`] for that.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError::InvalidScheduleValue`] if interval is not a
    ///   positive integer, or a calendar field is not an integer.
    /// - Return [`ScheduleError::InvalidScheduleType`] if calendar details
    ///   contain arrays.
    /// - Return [`ScheduleError::MalformedCalendar`] if calendar details are
    ///   not valid JSON.
    pub fn parse(schedule_type: ScheduleType, details: impl AsRef<str>) -> Result<Self> {
        let details = details.as_ref().trim();
        match schedule_type {
            ScheduleType::Interval => match details.parse::<u64>() {
                Ok(seconds) if seconds > 0 => Ok(Self::Interval(seconds)),
                _ => Err(ScheduleError::InvalidScheduleValue {
                    field: "StartInterval".into(),
                    value: details.into(),
                }),
            },
            ScheduleType::Calendar => parse_calendar(details),
        }
    }

    /// Rebuild schedule from its persisted type and value columns.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError`] if either column cannot be parsed.
    pub fn from_stored(schedule_type: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        Self::parse(schedule_type.as_ref().parse()?, value)
    }

    pub fn schedule_type(&self) -> ScheduleType {
        match self {
            Self::Interval(_) => ScheduleType::Interval,
            Self::Calendar(_) => ScheduleType::Calendar,
        }
    }

    /// Check that schedule can be handed to launchd.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError::InvalidScheduleValue`] for a zero interval.
    /// - Return [`ScheduleError`] from [`validate_calendar_schedule`] for
    ///   calendar schedules.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Interval(0) => Err(ScheduleError::InvalidScheduleValue {
                field: "StartInterval".into(),
                value: "0".into(),
            }),
            Self::Interval(_) => Ok(()),
            Self::Calendar(fields) => validate_calendar_schedule(fields),
        }
    }

    /// Serialized form stored in the `ScheduleValue` column.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError::Serialize`] if calendar fields cannot be
    ///   serialized.
    pub fn value_string(&self) -> Result<String> {
        match self {
            Self::Interval(seconds) => Ok(seconds.to_string()),
            Self::Calendar(fields) => Ok(serde_json::to_string(fields)?),
        }
    }
}

fn parse_calendar(details: &str) -> Result<Schedule> {
    // INVARIANT: Only rewrite single quotes if details are not JSON as given.
    let value: Value = match serde_json::from_str(details) {
        Ok(value) => value,
        Err(err) => serde_json::from_str(&details.replace('\'', "\"")).map_err(|_| {
            ScheduleError::MalformedCalendar {
                details: details.into(),
                source: err,
            }
        })?,
    };

    let entries = match value {
        Value::Object(entries) => entries,
        Value::Array(_) => {
            return Err(ScheduleError::InvalidScheduleType(
                "multiple calendar entries are not supported".into(),
            ))
        }
        other => {
            return Err(ScheduleError::InvalidScheduleValue {
                field: "StartCalendarInterval".into(),
                value: other.to_string(),
            })
        }
    };

    let mut fields = BTreeMap::new();
    for (field, value) in entries {
        match value {
            Value::Number(number) => match number.as_i64() {
                Some(value) => {
                    fields.insert(field, value);
                }
                None => {
                    return Err(ScheduleError::InvalidScheduleValue {
                        field,
                        value: number.to_string(),
                    })
                }
            },
            Value::Array(_) => {
                return Err(ScheduleError::InvalidScheduleType(format!(
                    "array values for calendar field {field} are not supported"
                )))
            }
            other => {
                return Err(ScheduleError::InvalidScheduleValue {
                    field,
                    value: other.to_string(),
                })
            }
        }
    }

    Ok(Schedule::Calendar(fields))
}

/// Validate fields of a calendar schedule.
///
/// Valid fields and inclusive ranges are Month 1-12, Day 1-31, Hour 0-23,
/// Minute 0-59, and Weekday 0-6 where 0 is Sunday. Field names are case
/// sensitive.
///
/// # Errors
///
/// - Return [`ScheduleError::InvalidScheduleField`] if a field is unknown.
/// - Return [`ScheduleError::InvalidScheduleValue`] if a value is out of range.
pub fn validate_calendar_schedule(fields: &BTreeMap<String, i64>) -> Result<()> {
    for (field, value) in fields {
        let (_, range) = CALENDAR_FIELDS
            .iter()
            .find(|(name, _)| name == field)
            .ok_or_else(|| ScheduleError::InvalidScheduleField(field.clone()))?;

        if !range.contains(value) {
            return Err(ScheduleError::InvalidScheduleValue {
                field: field.clone(),
                value: value.to_string(),
            });
        }
    }

    Ok(())
}

/// Build the scheduling block of a plist file.
///
/// The first line is left unindented, because it replaces a placeholder that
/// already sits at the indentation level of the top-level dictionary.
pub fn build_schedule_block(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Interval(seconds) => {
            format!("<key>StartInterval</key>\n    <integer>{seconds}</integer>")
        }
        Schedule::Calendar(fields) => {
            let mut block = String::from("<key>StartCalendarInterval</key>\n    <dict>");
            for (field, value) in fields {
                block.push_str(&format!(
                    "\n        <key>{field}</key>\n        <integer>{value}</integer>"
                ));
            }
            block.push_str("\n    </dict>");
            block
        }
    }
}

/// Schedule error types.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Schedule type or shape is not supported.
    #[error("invalid schedule type: {0}, choose 'interval' or 'calendar' with a single entry")]
    InvalidScheduleType(String),

    /// Calendar field is not recognized by launchd.
    #[error("{0} is not a valid launchd calendar field")]
    InvalidScheduleField(String),

    /// Schedule value is out of range or of the wrong kind.
    #[error("a value of {value} is not valid for {field}")]
    InvalidScheduleValue { field: String, value: String },

    /// Calendar details are not valid JSON.
    #[error("cannot parse calendar schedule {details:?}")]
    MalformedCalendar {
        #[source]
        source: serde_json::Error,
        details: String,
    },

    /// Calendar fields cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;
