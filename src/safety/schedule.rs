//! Minimal 5-field cron matcher (`minute hour dom month dow`) for
//! maintenance windows. Supports `*`, a single integer, `a-b` ranges,
//! `*/n` and `a-b/n` steps, and comma-separated lists of any of the above
//! per field — enough for a maintenance schedule, not a general-purpose
//! cron implementation.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Values(Vec<u32>),
}

impl Field {
    fn parse(raw: &str) -> Result<Self> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        let mut values = Vec::new();
        for part in raw.split(',') {
            values.extend(Self::parse_part(part.trim(), raw)?);
        }
        if values.is_empty() {
            return Err(Error::Config(format!("empty cron field: {raw}")));
        }
        values.sort_unstable();
        values.dedup();
        Ok(Field::Values(values))
    }

    fn parse_part(part: &str, whole: &str) -> Result<Vec<u32>> {
        let (range_part, step) = match part.split_once('/') {
            Some((range_part, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid cron step in {whole}")))?;
                if step == 0 {
                    return Err(Error::Config(format!("cron step must be nonzero in {whole}")));
                }
                (range_part, step)
            }
            None => (part, 1),
        };

        if range_part == "*" {
            return Err(Error::Config(format!(
                "`*/n` steps need a bound elsewhere in the schedule, not supported standalone: {whole}"
            )));
        }

        let (start, end) = match range_part.split_once('-') {
            Some((start, end)) => (
                start
                    .parse::<u32>()
                    .map_err(|_| Error::Config(format!("invalid cron range start in {whole}")))?,
                end.parse::<u32>()
                    .map_err(|_| Error::Config(format!("invalid cron range end in {whole}")))?,
            ),
            None => {
                let value: u32 = range_part
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid cron field value: {part}")))?;
                (value, value)
            }
        };

        if start > end {
            return Err(Error::Config(format!("cron range start exceeds end in {whole}")));
        }

        Ok((start..=end).step_by(step as usize).collect())
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Values(values) => values.contains(&value),
        }
    }
}

/// A parsed 5-field cron expression, matched against UTC timestamps.
///
/// Timezone handling is intentionally limited to UTC: the crate carries no
/// IANA timezone database dependency, so a non-`UTC` `timezone` field on a
/// maintenance window is accepted but evaluated as UTC.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronSchedule {
    /// Parse a 5-field `minute hour dom month dow` expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::Config(format!(
                "cron expression must have 5 fields, got {}: {expression}",
                fields.len()
            )));
        }
        Ok(Self {
            minute: Field::parse(fields[0])?,
            hour: Field::parse(fields[1])?,
            day_of_month: Field::parse(fields[2])?,
            month: Field::parse(fields[3])?,
            day_of_week: Field::parse(fields[4])?,
        })
    }

    /// Whether `now` falls on a minute matched by this schedule.
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        self.minute.matches(now.minute())
            && self.hour.matches(now.hour())
            && self.day_of_month.matches(now.day())
            && self.month.matches(now.month())
            && self.day_of_week.matches(now.weekday().num_days_from_sunday())
    }
}
