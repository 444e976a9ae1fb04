//! The top-level catch-up pass.
//!
//! A sweep first brings every suspension in line with today (activating the
//! ones that have started, settling the ones that have ended), then
//! reconciles every active rule. A failing rule does not stop the sweep; it
//! is logged and reported in the summary.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::suspension::{SuspensionPhase, Suspensions};

/// A rule the sweep could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub rule_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub today: NaiveDate,
    /// Suspensions that started since the last sweep.
    pub activated: usize,
    /// Expired suspensions closed by this sweep.
    pub settled: usize,
    /// Active rules reconciled.
    pub reconciled: usize,
    /// Entries written across all rules.
    pub inserted: usize,
    /// Rules removed because their end date has passed.
    pub retired: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepSummary {
    fn new(today: NaiveDate) -> Self {
        Self {
            today,
            activated: 0,
            settled: 0,
            reconciled: 0,
            inserted: 0,
            retired: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, rule_id: i64, stage: &str, err: impl std::fmt::Display) {
        tracing::warn!(rule_id, stage, error = %err, "sweep failed for rule");
        self.failures.push(SweepFailure {
            rule_id,
            error: err.to_string(),
        });
    }
}

/// Settle suspensions and reconcile every active rule against `today`.
///
/// # Errors
/// Only failures to list rules or suspensions abort the sweep; per-rule
/// failures are collected in [`SweepSummary::failures`].
pub fn sweep(reconciler: &Reconciler<'_>, today: NaiveDate) -> Result<SweepSummary> {
    let db = reconciler.db();
    let suspensions = Suspensions::new(reconciler);
    let mut summary = SweepSummary::new(today);

    for suspension in db.list_suspensions()? {
        let rule_id = suspension.rule_id;
        match suspension.phase(today) {
            SuspensionPhase::Scheduled => {}
            SuspensionPhase::Active => {
                match db.get_rule(rule_id) {
                    Ok(Some(rule)) if rule.active => {}
                    Ok(_) => continue,
                    Err(e) => {
                        summary.fail(rule_id, "activate", e);
                        continue;
                    }
                }
                match suspensions.activate(&suspension, today) {
                    Ok(outcome) => {
                        summary.activated += 1;
                        if let Some(reconciled) = outcome.reconciled {
                            summary.inserted += reconciled.inserted.len();
                        }
                    }
                    Err(e) => summary.fail(rule_id, "activate", e),
                }
            }
            SuspensionPhase::Expired => match suspensions.settle(&suspension, today) {
                Ok(outcome) => {
                    summary.settled += 1;
                    if let Some(reconciled) = outcome.reconciled {
                        summary.inserted += reconciled.inserted.len();
                        summary.retired += usize::from(reconciled.retired);
                    }
                }
                Err(e) => summary.fail(rule_id, "settle", e),
            },
        }
    }

    for rule in db.list_active_rules()? {
        match reconciler.reconcile(&rule, false, today) {
            Ok(outcome) => {
                summary.reconciled += 1;
                summary.inserted += outcome.inserted.len();
                summary.retired += usize::from(outcome.retired);
            }
            Err(e) => summary.fail(rule.id, "reconcile", e),
        }
    }

    tracing::info!(
        %today,
        activated = summary.activated,
        settled = summary.settled,
        reconciled = summary.reconciled,
        inserted = summary.inserted,
        failures = summary.failures.len(),
        "sweep finished"
    );
    Ok(summary)
}
