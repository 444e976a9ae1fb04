//! Absences: date ranges that pause a recurrence rule.
//!
//! Creating or editing an absence retracts the rule's entries inside the
//! range. While the range contains "today" the rule is inactive; once it has
//! passed, the absence is settled: the rule resumes the day after it ends and
//! is backfilled up to today, then the absence row is dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, ValidationError};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::recurrence::RecurrenceRule;

/// A suspension of one rule, both bounds inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionInterval {
    pub id: i64,
    pub rule_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Where a suspension stands relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspensionPhase {
    /// `start <= today <= end`
    Active,
    /// `today > end`
    Expired,
    /// `today < start`
    Scheduled,
}

impl SuspensionInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn phase(&self, today: NaiveDate) -> SuspensionPhase {
        classify(self.start_date, self.end_date, today)
    }
}

pub fn classify(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> SuspensionPhase {
    if today > end {
        SuspensionPhase::Expired
    } else if today < start {
        SuspensionPhase::Scheduled
    } else {
        SuspensionPhase::Active
    }
}

fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::InvalidDateRange { start, end });
    }
    Ok(())
}

/// Result of a suspension operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionOutcome {
    /// The stored suspension, `None` once it has been removed.
    pub suspension: Option<SuspensionInterval>,
    pub phase: SuspensionPhase,
    /// Entries retracted from the ledger.
    pub retracted: usize,
    /// The reconciliation run as part of the operation, if any.
    pub reconciled: Option<ReconcileOutcome>,
}

/// Suspension operations over a reconciler's store.
pub struct Suspensions<'r, 'a> {
    reconciler: &'r Reconciler<'a>,
}

impl<'r, 'a> Suspensions<'r, 'a> {
    pub fn new(reconciler: &'r Reconciler<'a>) -> Self {
        Self { reconciler }
    }

    fn rule(&self, rule_id: i64) -> Result<RecurrenceRule> {
        self.reconciler
            .db()
            .get_rule(rule_id)?
            .ok_or_else(|| CoreError::not_found("rule", rule_id))
    }

    fn suspension(&self, id: i64) -> Result<SuspensionInterval> {
        self.reconciler
            .db()
            .get_suspension(id)?
            .ok_or_else(|| CoreError::not_found("suspension", id))
    }

    /// Suspend `rule_id` over `[start, end]`.
    ///
    /// # Errors
    /// Fails before any write if the range is inverted, the rule is unknown,
    /// or the rule is already suspended.
    pub fn create(
        &self,
        rule_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Result<SuspensionOutcome> {
        validate_range(start, end)?;
        let db = self.reconciler.db();
        self.rule(rule_id)?;
        if let Some(existing) = db.suspension_for_rule(rule_id)? {
            return Err(ValidationError::SuspensionExists {
                rule_id,
                suspension_id: existing.id,
            }
            .into());
        }

        let suspension = db.create_suspension(rule_id, start, end)?;
        let phase = suspension.phase(today);
        tracing::info!(rule_id, suspension_id = suspension.id, ?phase, "created suspension");

        match phase {
            SuspensionPhase::Active => self.activate(&suspension, today),
            SuspensionPhase::Expired => self.settle(&suspension, today),
            SuspensionPhase::Scheduled => Ok(SuspensionOutcome {
                suspension: Some(suspension),
                phase,
                retracted: 0,
                reconciled: None,
            }),
        }
    }

    /// Move an existing suspension to `[start, end]`.
    pub fn update(
        &self,
        id: i64,
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
    ) -> Result<SuspensionOutcome> {
        validate_range(start, end)?;
        let db = self.reconciler.db();
        let current = self.suspension(id)?;
        let rule = self.rule(current.rule_id)?;

        db.update_suspension_range(id, start, end)?;
        let suspension = SuspensionInterval {
            start_date: start,
            end_date: end,
            ..current
        };
        let phase = suspension.phase(today);
        tracing::info!(rule_id = rule.id, suspension_id = id, ?phase, "updated suspension");

        match phase {
            SuspensionPhase::Active => {
                // Let the catch-up pass backfill dates the old range covered.
                if !rule.active {
                    db.set_rule_active(rule.id, true)?;
                }
                self.activate(&suspension, today)
            }
            SuspensionPhase::Expired => self.settle(&suspension, today),
            SuspensionPhase::Scheduled => {
                let reconciled = if rule.active {
                    None
                } else {
                    db.set_rule_active(rule.id, true)?;
                    Some(self.reconciler.reconcile_rule(rule.id, false, today)?)
                };
                Ok(SuspensionOutcome {
                    suspension: Some(suspension),
                    phase,
                    retracted: 0,
                    reconciled,
                })
            }
        }
    }

    /// Put a started suspension into effect.
    ///
    /// The rule is first brought up to `today` (suspended dates are skipped),
    /// then its entries inside the range are retracted and it is deactivated.
    pub fn activate(
        &self,
        suspension: &SuspensionInterval,
        today: NaiveDate,
    ) -> Result<SuspensionOutcome> {
        let db = self.reconciler.db();
        let reconciled = self
            .reconciler
            .reconcile_rule(suspension.rule_id, false, today)?;
        // Retiring the rule also removed its suspension.
        if reconciled.retired {
            return Ok(SuspensionOutcome {
                suspension: None,
                phase: SuspensionPhase::Active,
                retracted: 0,
                reconciled: Some(reconciled),
            });
        }
        let retracted = db.delete_rule_entries_between(
            suspension.rule_id,
            suspension.start_date,
            suspension.end_date,
        )?;
        db.set_rule_active(suspension.rule_id, false)?;
        tracing::debug!(rule_id = suspension.rule_id, retracted, "rule suspended");

        Ok(SuspensionOutcome {
            suspension: Some(suspension.clone()),
            phase: SuspensionPhase::Active,
            retracted,
            reconciled: Some(reconciled),
        })
    }

    /// Close an expired suspension: resume the rule the day after it ends,
    /// backfill through `today`, and drop the suspension.
    ///
    /// Also used for suspensions created or moved entirely into the past.
    /// The moved start date keeps later passes from rewriting the range.
    pub fn settle(
        &self,
        suspension: &SuspensionInterval,
        today: NaiveDate,
    ) -> Result<SuspensionOutcome> {
        let db = self.reconciler.db();
        let current = self.rule(suspension.rule_id)?;
        let after_end = suspension.end_date.succ_opt().ok_or_else(|| {
            ValidationError::invalid_value("end_date", "no day follows the suspension end")
        })?;
        let resume = after_end.max(current.start_date);

        let retracted = db.delete_rule_entries_between(
            suspension.rule_id,
            suspension.start_date,
            suspension.end_date,
        )?;
        db.set_rule_start(suspension.rule_id, resume)?;
        db.set_rule_active(suspension.rule_id, true)?;

        let rule = self.rule(suspension.rule_id)?;
        let reconciled = self.reconciler.reconcile(&rule, true, today)?;
        // A retired rule already took its suspension with it.
        if !reconciled.retired {
            db.delete_suspension(suspension.id)?;
        }
        tracing::info!(
            rule_id = suspension.rule_id,
            %resume,
            inserted = reconciled.inserted.len(),
            "settled suspension"
        );

        Ok(SuspensionOutcome {
            suspension: None,
            phase: SuspensionPhase::Expired,
            retracted,
            reconciled: Some(reconciled),
        })
    }

    /// Remove a suspension early and backfill the rule through `today`.
    ///
    /// The rule keeps its start date; dates retracted by the suspension are
    /// not restored unless they follow the rule's latest entry.
    pub fn delete(&self, id: i64, today: NaiveDate) -> Result<SuspensionOutcome> {
        let db = self.reconciler.db();
        let suspension = self.suspension(id)?;
        let phase = suspension.phase(today);

        db.delete_suspension(id)?;
        db.set_rule_active(suspension.rule_id, true)?;
        let reconciled = self.reconciler.reconcile_rule(suspension.rule_id, false, today)?;
        tracing::info!(rule_id = suspension.rule_id, suspension_id = id, "deleted suspension");

        Ok(SuspensionOutcome {
            suspension: None,
            phase,
            retracted: 0,
            reconciled: Some(reconciled),
        })
    }
}
