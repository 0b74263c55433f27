//! Cron schedules for periodic snapshot refresh.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use croner::Cron;

/// A cron expression that failed to parse or evaluate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cron expression {expression:?}: {reason}")]
pub struct ScheduleError {
    /// The offending expression.
    pub expression: String,
    /// Parser or evaluator message.
    pub reason: String,
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Parse a standard five-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not valid cron.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let cron = Cron::new(expression).parse().map_err(|e| ScheduleError {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    /// The source expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression never fires again.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.cron
            .find_next_occurrence(after, false)
            .map_err(|e| ScheduleError {
                expression: self.expression.clone(),
                reason: e.to_string(),
            })
    }

    /// Returns true if the next fire time after `now` falls before `now + period`,
    /// i.e. the schedule fires before the following pass would look at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression never fires again.
    pub fn is_due(&self, now: &DateTime<Utc>, period: Duration) -> Result<bool, ScheduleError> {
        let next = self.next_after(now)?;
        Ok(fires_within(now, &next, period))
    }
}

/// Returns true if `next` is strictly earlier than `now + period`.
#[must_use]
pub fn fires_within(now: &DateTime<Utc>, next: &DateTime<Utc>, period: Duration) -> bool {
    TimeDelta::from_std(period)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .map_or(true, |horizon| horizon > *next)
}
