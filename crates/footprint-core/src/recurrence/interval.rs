use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl IntervalUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            IntervalUnit::Days => "days",
            IntervalUnit::Weeks => "weeks",
            IntervalUnit::Months => "months",
            IntervalUnit::Years => "years",
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" | "jour" | "jours" => Ok(IntervalUnit::Days),
            "week" | "weeks" | "semaine" | "semaines" => Ok(IntervalUnit::Weeks),
            "month" | "months" | "mois" => Ok(IntervalUnit::Months),
            "year" | "years" | "an" | "ans" | "annee" | "annees" | "année" | "années" => {
                Ok(IntervalUnit::Years)
            }
            other => Err(ValidationError::InvalidInterval(format!(
                "unknown interval unit '{other}'"
            ))),
        }
    }
}

/// Repetition step of a recurrence rule: `count` units of `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub count: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    /// Build an interval, rejecting a zero count.
    pub fn new(count: u32, unit: IntervalUnit) -> Result<Self, ValidationError> {
        if count == 0 {
            return Err(ValidationError::InvalidInterval(
                "interval count must be greater than zero".into(),
            ));
        }
        Ok(Self { count, unit })
    }

    pub fn days(count: u32) -> Result<Self, ValidationError> {
        Self::new(count, IntervalUnit::Days)
    }

    /// Date of the occurrence following `date`.
    ///
    /// Month and year steps clamp the day-of-month at month end
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn next_occurrence(&self, date: NaiveDate) -> Result<NaiveDate, ValidationError> {
        let next = match self.unit {
            IntervalUnit::Days => date.checked_add_days(Days::new(u64::from(self.count))),
            IntervalUnit::Weeks => date.checked_add_days(Days::new(u64::from(self.count) * 7)),
            IntervalUnit::Months => date.checked_add_months(Months::new(self.count)),
            IntervalUnit::Years => self
                .count
                .checked_mul(12)
                .and_then(|months| date.checked_add_months(Months::new(months))),
        };
        next.ok_or_else(|| {
            ValidationError::InvalidInterval(format!("{self} after {date} overflows the calendar"))
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "every {} {}", self.count, self.unit)
    }
}
