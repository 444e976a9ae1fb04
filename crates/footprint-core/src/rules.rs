//! Rule lifecycle: create, edit and delete recurrence rules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::recurrence::{Interval, NewRule, RecurrenceRule, RulePayload};

/// Fields to change on an existing rule. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleChanges {
    pub payload: Option<RulePayload>,
    pub interval: Option<Interval>,
    pub start_date: Option<NaiveDate>,
    /// `Some(None)` clears the end date.
    pub end_date: Option<Option<NaiveDate>>,
}

impl RuleChanges {
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
            && self.interval.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }

    /// The bounds to prune against: only the ones this change sets.
    fn pruning_bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (self.start_date, self.end_date.flatten())
    }

    fn apply(&self, rule: &mut RecurrenceRule) {
        if let Some(payload) = &self.payload {
            rule.payload = payload.clone();
        }
        if let Some(interval) = self.interval {
            rule.interval = interval;
        }
        if let Some(start) = self.start_date {
            rule.start_date = start;
        }
        if let Some(end) = self.end_date {
            rule.end_date = end;
        }
    }
}

/// A rule after a lifecycle operation, with the pass that followed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: RecurrenceRule,
    /// Entries dropped because they fell outside the new bounds.
    pub pruned: usize,
    pub reconciled: ReconcileOutcome,
}

pub struct Rules<'r, 'a> {
    reconciler: &'r Reconciler<'a>,
}

impl<'r, 'a> Rules<'r, 'a> {
    pub fn new(reconciler: &'r Reconciler<'a>) -> Self {
        Self { reconciler }
    }

    /// Store a new rule and materialize it through `today`.
    ///
    /// # Errors
    /// Fails before any write if the rule is invalid, its action is unknown,
    /// or the payload does not match the action's category.
    pub fn create(&self, new: &NewRule, today: NaiveDate) -> Result<RuleOutcome> {
        new.validate()?;
        let db = self.reconciler.db();
        let action = db
            .get_action(new.action_id)?
            .ok_or_else(|| CoreError::not_found("action", new.action_id))?;
        new.payload.ensure_category(action.category)?;

        let rule = db.create_rule(new)?;
        tracing::info!(rule_id = rule.id, action_id = action.id, interval = %rule.interval, "created rule");
        let reconciled = self.reconciler.reconcile(&rule, false, today)?;
        Ok(RuleOutcome {
            rule,
            pruned: 0,
            reconciled,
        })
    }

    /// Edit a rule.
    ///
    /// Existing entries keep the payload they were written with. Setting a
    /// start date drops entries before it; setting an end date drops entries
    /// after it. A bound left untouched prunes nothing.
    pub fn update(&self, id: i64, changes: &RuleChanges, today: NaiveDate) -> Result<RuleOutcome> {
        let db = self.reconciler.db();
        let mut rule = db
            .get_rule(id)?
            .ok_or_else(|| CoreError::not_found("rule", id))?;
        changes.apply(&mut rule);
        rule.validate()?;
        if changes.payload.is_some() {
            let action = db
                .get_action(rule.action_id)?
                .ok_or_else(|| CoreError::not_found("action", rule.action_id))?;
            rule.payload.ensure_category(action.category)?;
        }

        db.update_rule(&rule)?;
        let pruned = match changes.pruning_bounds() {
            (None, None) => 0,
            (start, end) => db.delete_rule_entries_outside(rule.id, start, end)?,
        };
        tracing::info!(rule_id = id, pruned, "updated rule");

        let reconciled = self.reconciler.reconcile(&rule, false, today)?;
        Ok(RuleOutcome {
            rule,
            pruned,
            reconciled,
        })
    }

    /// Delete a rule with its entries and suspension.
    ///
    /// Returns the number of entries removed.
    pub fn delete(&self, id: i64) -> Result<usize> {
        let db = self.reconciler.db();
        if db.get_rule(id)?.is_none() {
            return Err(CoreError::not_found("rule", id));
        }
        let removed = db.delete_rule_cascade(id)?;
        tracing::info!(rule_id = id, removed, "deleted rule");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionResolver, ActionType, Category};
    use crate::emissions::FactorTable;
    use crate::error::ValidationError;
    use crate::ledger::EntryFilter;
    use crate::storage::FootprintDb;
    use crate::suspension::Suspensions;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn commute(db: &FootprintDb) -> NewRule {
        let car = db.create_reference(Category::Transport, Some("car"), "Car").unwrap();
        let drive = db
            .find_or_create_action(ActionType::Usage, Category::Transport, car.id)
            .unwrap();
        NewRule {
            action_id: drive.id,
            payload: RulePayload::Transport { distance_km: 24.0 },
            interval: Interval::days(1).unwrap(),
            start_date: date(2025, 3, 1),
            end_date: None,
        }
    }

    #[test]
    fn create_materializes_through_today() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);

        let outcome = Rules::new(&reconciler)
            .create(&commute(&db), date(2025, 3, 4))
            .unwrap();
        assert_eq!(outcome.reconciled.inserted.len(), 4);
        assert!(db.get_rule(outcome.rule.id).unwrap().is_some());
    }

    #[test]
    fn create_rejects_payload_of_another_category() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let mut new = commute(&db);
        new.payload = RulePayload::Housing {
            heating_temperature_c: 19.0,
        };

        let err = Rules::new(&reconciler).create(&new, date(2025, 3, 4)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::CategoryMismatch { .. })
        ));
        assert!(db.list_rules().unwrap().is_empty());
    }

    #[test]
    fn create_rejects_unknown_action() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let mut new = commute(&db);
        new.action_id = 99;

        let err = Rules::new(&reconciler).create(&new, date(2025, 3, 4)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "action", id: 99 }));
    }

    #[test]
    fn moving_end_date_earlier_prunes_and_retires() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let rules = Rules::new(&reconciler);
        let created = rules.create(&commute(&db), date(2025, 3, 10)).unwrap();

        let changes = RuleChanges {
            end_date: Some(Some(date(2025, 3, 5))),
            ..RuleChanges::default()
        };
        let outcome = rules.update(created.rule.id, &changes, date(2025, 3, 10)).unwrap();
        assert_eq!(outcome.pruned, 5);
        assert!(outcome.reconciled.retired);
        assert!(db.get_rule(created.rule.id).unwrap().is_none());
    }

    #[test]
    fn end_only_edit_keeps_history_before_a_settled_suspension() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let rules = Rules::new(&reconciler);
        let created = rules.create(&commute(&db), date(2025, 3, 10)).unwrap();
        let id = created.rule.id;

        let suspensions = Suspensions::new(&reconciler);
        suspensions
            .create(id, date(2025, 3, 8), date(2025, 3, 12), date(2025, 3, 10))
            .unwrap();
        let suspension = db.suspension_for_rule(id).unwrap().unwrap();
        suspensions.settle(&suspension, date(2025, 3, 15)).unwrap();
        assert_eq!(db.get_rule(id).unwrap().unwrap().start_date, date(2025, 3, 13));
        assert_eq!(db.count_rule_entries(id).unwrap(), 7 + 3);

        let changes = RuleChanges {
            end_date: Some(Some(date(2025, 12, 31))),
            ..RuleChanges::default()
        };
        let outcome = rules.update(id, &changes, date(2025, 3, 16)).unwrap();
        assert_eq!(outcome.pruned, 0);
        assert_eq!(outcome.reconciled.inserted.len(), 1);

        let dates: Vec<_> = db
            .list_entries(&EntryFilter::for_rule(id))
            .unwrap()
            .into_iter()
            .map(|e| e.date)
            .collect();
        let mut expected: Vec<_> = (1..=7).map(|d| date(2025, 3, d)).collect();
        expected.extend((13..=16).map(|d| date(2025, 3, d)));
        assert_eq!(dates, expected);

        let clear = RuleChanges {
            end_date: Some(None),
            ..RuleChanges::default()
        };
        assert_eq!(rules.update(id, &clear, date(2025, 3, 16)).unwrap().pruned, 0);
        assert_eq!(db.count_rule_entries(id).unwrap(), 11);
    }

    #[test]
    fn moving_start_later_prunes_only_earlier_entries() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let rules = Rules::new(&reconciler);
        let created = rules.create(&commute(&db), date(2025, 3, 10)).unwrap();

        let changes = RuleChanges {
            start_date: Some(date(2025, 3, 4)),
            ..RuleChanges::default()
        };
        let outcome = rules.update(created.rule.id, &changes, date(2025, 3, 11)).unwrap();
        assert_eq!(outcome.pruned, 3);
        assert_eq!(outcome.reconciled.inserted.len(), 1);
        assert_eq!(db.count_rule_entries(created.rule.id).unwrap(), 8);
    }

    #[test]
    fn update_rejects_inverted_bounds() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let rules = Rules::new(&reconciler);
        let created = rules.create(&commute(&db), date(2025, 3, 2)).unwrap();

        let changes = RuleChanges {
            end_date: Some(Some(date(2025, 2, 1))),
            ..RuleChanges::default()
        };
        let err = rules.update(created.rule.id, &changes, date(2025, 3, 2)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidDateRange { .. })
        ));
        assert_eq!(db.get_rule(created.rule.id).unwrap().unwrap().end_date, None);
    }

    #[test]
    fn delete_cascades() {
        let db = FootprintDb::open_memory().unwrap();
        let calculator = FactorTable::default();
        let reconciler = Reconciler::new(&db, &calculator);
        let rules = Rules::new(&reconciler);
        let created = rules.create(&commute(&db), date(2025, 3, 3)).unwrap();

        assert_eq!(rules.delete(created.rule.id).unwrap(), 3);
        assert!(db.get_rule(created.rule.id).unwrap().is_none());
        assert!(matches!(
            rules.delete(created.rule.id),
            Err(CoreError::NotFound { .. })
        ));
    }
}
