//! Ledger entries ("iterations"): concrete dated events with their emissions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Category;
use crate::recurrence::RulePayload;

/// One concrete occurrence of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub action_id: i64,
    /// Rule that materialized this entry; `None` for one-off entries and for
    /// history left behind by a retired rule.
    pub rule_id: Option<i64>,
    /// Parameters resolved when the entry was created.
    pub params: RulePayload,
    /// Kilograms of CO2e. `None` when the action carries no direct emissions.
    pub emissions_kg: Option<f64>,
    /// Occurrence date.
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Fields of an entry before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub action_id: i64,
    pub rule_id: Option<i64>,
    pub params: RulePayload,
    pub emissions_kg: Option<f64>,
    pub date: NaiveDate,
}

/// Filter for listing entries. Empty filter lists everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub rule_id: Option<i64>,
    pub action_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl EntryFilter {
    pub fn for_rule(rule_id: i64) -> Self {
        Self {
            rule_id: Some(rule_id),
            ..Self::default()
        }
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

/// Emissions per category over a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmissionsSummary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub entries: u64,
    pub total_kg: f64,
    pub by_category: Vec<CategoryTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub entries: u64,
    pub total_kg: f64,
}
