//! Recurrence rules ("passive actions") and their calendar arithmetic.

mod interval;
mod rule;

pub use interval::{Interval, IntervalUnit};
pub use rule::{NewRule, QuantityUnit, RecurrenceRule, RulePayload};
