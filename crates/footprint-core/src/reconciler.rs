//! Materializes recurrence rules into ledger entries.
//!
//! A pass brings one rule's ledger up to date with "today": it resumes after
//! the rule's latest entry, writes one entry per missing occurrence (two for
//! food, creation and usage), skips dates covered by the rule's suspension,
//! and retires the rule once its end date has passed.
//!
//! ## Usage
//! ```rust,ignore
//! let db = FootprintDb::open()?;
//! let calculator = FactorTable::default();
//! let reconciler = Reconciler::new(&db, &calculator);
//! let outcome = reconciler.reconcile_rule(rule_id, false, today)?;
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionResolver, ActionType, Category};
use crate::emissions::{EmissionRequest, EmissionsCalculator};
use crate::error::{CoreError, Result};
use crate::ledger::NewLedgerEntry;
use crate::recurrence::{RecurrenceRule, RulePayload};
use crate::storage::FootprintDb;

/// Default horizon for rules without an end date.
pub const DEFAULT_HORIZON_YEARS: u32 = 3;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub rule_id: i64,
    /// Ids of the entries written by this pass.
    pub inserted: Vec<i64>,
    /// Occurrences skipped because they fall inside the rule's suspension.
    pub skipped_suspended: Vec<NaiveDate>,
    /// Occurrences skipped because an entry already existed.
    pub skipped_existing: Vec<NaiveDate>,
    /// The rule's end date had passed and it was removed.
    pub retired: bool,
}

impl ReconcileOutcome {
    fn new(rule_id: i64) -> Self {
        Self {
            rule_id,
            ..Self::default()
        }
    }
}

/// Brings rules up to date against an injected store and calculator.
pub struct Reconciler<'a> {
    db: &'a FootprintDb,
    calculator: &'a dyn EmissionsCalculator,
    horizon_years: u32,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a FootprintDb, calculator: &'a dyn EmissionsCalculator) -> Self {
        Self {
            db,
            calculator,
            horizon_years: DEFAULT_HORIZON_YEARS,
        }
    }

    /// Override how far past its start an unbounded rule materializes.
    pub fn with_horizon_years(mut self, years: u32) -> Self {
        self.horizon_years = years;
        self
    }

    pub fn db(&self) -> &'a FootprintDb {
        self.db
    }

    pub fn horizon_years(&self) -> u32 {
        self.horizon_years
    }

    /// Load a rule and reconcile it.
    pub fn reconcile_rule(
        &self,
        rule_id: i64,
        suspension_just_ended: bool,
        today: NaiveDate,
    ) -> Result<ReconcileOutcome> {
        let rule = self
            .db
            .get_rule(rule_id)?
            .ok_or_else(|| CoreError::not_found("rule", rule_id))?;
        self.reconcile(&rule, suspension_just_ended, today)
    }

    /// Reconcile `rule` against `today`.
    ///
    /// The cursor never runs before `rule.start_date`: after a settled
    /// suspension the rule starts the day after it, and occurrences are
    /// stepped forward from the latest entry until they reach that date.
    /// `suspension_just_ended` marks the pass that follows a settle.
    ///
    /// # Errors
    /// A store or calculator failure aborts the pass. Entries already written
    /// by the pass are kept.
    pub fn reconcile(
        &self,
        rule: &RecurrenceRule,
        suspension_just_ended: bool,
        today: NaiveDate,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::new(rule.id);
        if !rule.active {
            return Ok(outcome);
        }

        let action = self
            .db
            .get_action(rule.action_id)?
            .ok_or_else(|| CoreError::not_found("action", rule.action_id))?;
        rule.payload.ensure_category(action.category)?;

        let mut cursor = match self.db.latest_rule_entry_date(rule.id, today)? {
            None => rule.start_date,
            Some(latest) => rule.interval.next_occurrence(latest)?,
        };
        while cursor < rule.start_date {
            cursor = rule.interval.next_occurrence(cursor)?;
        }
        if suspension_just_ended {
            tracing::debug!(rule_id = rule.id, %cursor, "resuming after suspension");
        }

        let suspension = self.db.suspension_for_rule(rule.id)?;
        let last = rule.last_materializable(self.horizon_years).min(today);

        while cursor <= last {
            let suspended = suspension
                .as_ref()
                .is_some_and(|s| s.contains(cursor));
            if suspended {
                outcome.skipped_suspended.push(cursor);
            } else {
                self.materialize(rule, &action, cursor, &mut outcome)?;
            }
            cursor = rule.interval.next_occurrence(cursor)?;
        }

        if rule.has_ended(today) {
            let kept = self.db.retire_rule(rule.id)?;
            outcome.retired = true;
            tracing::info!(rule_id = rule.id, kept, "retired rule past its end date");
        }

        Ok(outcome)
    }

    fn materialize(
        &self,
        rule: &RecurrenceRule,
        action: &Action,
        date: NaiveDate,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        match &rule.payload {
            RulePayload::Housing { .. } => {
                if self.db.entry_exists(action.id, date)? {
                    outcome.skipped_existing.push(date);
                    return Ok(());
                }
                self.write_entry(rule, action, date, outcome)
            }
            RulePayload::Transport { .. } => self.write_entry(rule, action, date, outcome),
            RulePayload::Food { .. } => {
                for action_type in [ActionType::Creation, ActionType::Usage] {
                    let paired = self.db.find_or_create_action(
                        action_type,
                        Category::Food,
                        action.reference_id,
                    )?;
                    self.write_entry(rule, &paired, date, outcome)?;
                }
                Ok(())
            }
        }
    }

    fn write_entry(
        &self,
        rule: &RecurrenceRule,
        action: &Action,
        date: NaiveDate,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        if self.db.rule_entry_exists(action.id, date)? {
            outcome.skipped_existing.push(date);
            return Ok(());
        }

        let emissions_kg = self.price(action, &rule.payload)?;
        let entry = NewLedgerEntry {
            action_id: action.id,
            rule_id: Some(rule.id),
            params: rule.payload.clone(),
            emissions_kg,
            date,
        };
        match self.db.insert_entry(&entry)? {
            Some(id) => {
                tracing::debug!(rule_id = rule.id, action_id = action.id, %date, id, "materialized entry");
                outcome.inserted.push(id);
            }
            None => outcome.skipped_existing.push(date),
        }
        Ok(())
    }

    /// Log a one-off entry outside any rule.
    ///
    /// # Errors
    /// Fails if the action is unknown, the payload does not match its
    /// category, or the calculator fails.
    pub fn log_one_off(
        &self,
        action_id: i64,
        payload: RulePayload,
        date: NaiveDate,
    ) -> Result<i64> {
        payload.validate()?;
        let action = self
            .db
            .get_action(action_id)?
            .ok_or_else(|| CoreError::not_found("action", action_id))?;
        payload.ensure_category(action.category)?;

        let emissions_kg = self.price(&action, &payload)?;
        let entry = NewLedgerEntry {
            action_id,
            rule_id: None,
            params: payload,
            emissions_kg,
            date,
        };
        self.db
            .insert_entry(&entry)?
            .ok_or_else(|| CoreError::Custom(format!("entry for action {action_id} on {date} was not written")))
    }

    fn price(&self, action: &Action, payload: &RulePayload) -> Result<Option<f64>> {
        let reference = self.db.reference_for_action(action.id)?;
        let request = EmissionRequest::new(action.action_type, reference.code, payload.clone());
        Ok(self.calculator.estimate(&request)?)
    }
}
