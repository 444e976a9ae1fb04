//! Integration tests for rule materialization and absences.
//!
//! Every test runs against a fresh in-memory database and the offline
//! factor table.

use chrono::NaiveDate;
use footprint_core::{
    sweep, ActionResolver, ActionType, Category, EntryFilter, FactorTable, FootprintDb, Interval,
    IntervalUnit, NewRule, QuantityUnit, Reconciler, Rules, RulePayload, SuspensionPhase,
    Suspensions,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn usage_action(db: &FootprintDb, category: Category, code: Option<&str>) -> i64 {
    let reference = db.create_reference(category, code, "test reference").unwrap();
    db.find_or_create_action(ActionType::Usage, category, reference.id)
        .unwrap()
        .id
}

fn heating(action_id: i64, start: NaiveDate, end: Option<NaiveDate>) -> NewRule {
    NewRule {
        action_id,
        payload: RulePayload::Housing {
            heating_temperature_c: 19.0,
        },
        interval: Interval::new(1, "jours".parse::<IntervalUnit>().unwrap()).unwrap(),
        start_date: start,
        end_date: end,
    }
}

fn rule_dates(db: &FootprintDb, rule_id: i64) -> Vec<NaiveDate> {
    db.list_entries(&EntryFilter::for_rule(rule_id))
        .unwrap()
        .into_iter()
        .map(|e| e.date)
        .collect()
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn bounded_rule_materializes_then_retires() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);

    let outcome = Rules::new(&reconciler)
        .create(
            &heating(action, date(2025, 1, 1), Some(date(2025, 1, 5))),
            date(2025, 1, 10),
        )
        .unwrap();

    assert_eq!(outcome.reconciled.inserted.len(), 5);
    assert!(outcome.reconciled.retired);
    assert!(db.get_rule(outcome.rule.id).unwrap().is_none());

    // Retired entries stay in the ledger, detached from the rule.
    let entries = db.list_entries(&EntryFilter::default()).unwrap();
    let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
    assert_eq!(dates, (1..=5).map(|d| date(2025, 1, d)).collect::<Vec<_>>());
    assert!(entries.iter().all(|e| e.rule_id.is_none()));
}

#[test]
fn housing_reconcile_is_idempotent() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rule = db.create_rule(&heating(action, date(2025, 2, 1), None)).unwrap();

    let first = reconciler.reconcile(&rule, false, date(2025, 2, 14)).unwrap();
    let second = reconciler.reconcile(&rule, false, date(2025, 2, 14)).unwrap();

    assert_eq!(first.inserted.len(), 14);
    assert!(second.inserted.is_empty());
    assert_eq!(db.count_rule_entries(rule.id).unwrap(), 14);
}

#[test]
fn transport_reconcile_is_idempotent() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Transport, Some("bus"));
    let rule = db
        .create_rule(&NewRule {
            action_id: action,
            payload: RulePayload::Transport { distance_km: 11.0 },
            interval: Interval::new(2, IntervalUnit::Days).unwrap(),
            start_date: date(2025, 2, 1),
            end_date: None,
        })
        .unwrap();

    reconciler.reconcile(&rule, false, date(2025, 2, 9)).unwrap();
    let second = reconciler.reconcile(&rule, false, date(2025, 2, 9)).unwrap();

    assert!(second.inserted.is_empty());
    assert_eq!(
        rule_dates(&db, rule.id),
        vec![date(2025, 2, 1), date(2025, 2, 3), date(2025, 2, 5), date(2025, 2, 7), date(2025, 2, 9)]
    );
}

#[test]
fn monthly_rule_clamps_to_month_end() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Transport, None);
    let rule = db
        .create_rule(&NewRule {
            action_id: action,
            payload: RulePayload::Transport { distance_km: 300.0 },
            interval: Interval::new(1, IntervalUnit::Months).unwrap(),
            start_date: date(2025, 1, 31),
            end_date: None,
        })
        .unwrap();

    reconciler.reconcile(&rule, false, date(2025, 4, 30)).unwrap();
    assert_eq!(
        rule_dates(&db, rule.id),
        vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 28), date(2025, 4, 28)]
    );
}

#[test]
fn food_occurrence_writes_creation_and_usage() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let eat = usage_action(&db, Category::Food, Some("3017620422003"));
    let reference_id = db.get_action(eat).unwrap().unwrap().reference_id;

    let created = Rules::new(&reconciler)
        .create(
            &NewRule {
                action_id: eat,
                payload: RulePayload::Food {
                    quantity: 2.0,
                    unit: QuantityUnit::Portions,
                },
                interval: Interval::new(1, IntervalUnit::Weeks).unwrap(),
                start_date: date(2025, 6, 2),
                end_date: None,
            },
            date(2025, 6, 16),
        )
        .unwrap();

    let produce = db
        .find_action(ActionType::Creation, Category::Food, reference_id)
        .unwrap()
        .expect("creation action is created on demand");
    let entries = db.list_entries(&EntryFilter::for_rule(created.rule.id)).unwrap();
    assert_eq!(entries.len(), 6);
    for day in [2, 9, 16] {
        let on_day: Vec<_> = entries.iter().filter(|e| e.date == date(2025, 6, day)).collect();
        assert_eq!(on_day.len(), 2);
        assert!(on_day.iter().any(|e| e.action_id == produce.id));
        assert!(on_day.iter().any(|e| e.action_id == eat));
        assert!(on_day.iter().all(|e| e.rule_id == Some(created.rule.id)));
    }
}

// ============================================================================
// Absences
// ============================================================================

#[test]
fn active_absence_retracts_and_pauses() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rule = db.create_rule(&heating(action, date(2025, 7, 1), None)).unwrap();
    reconciler.reconcile(&rule, false, date(2025, 8, 10)).unwrap();

    let outcome = Suspensions::new(&reconciler)
        .create(rule.id, date(2025, 8, 1), date(2025, 8, 23), date(2025, 8, 10))
        .unwrap();

    assert_eq!(outcome.phase, SuspensionPhase::Active);
    assert_eq!(outcome.retracted, 10);
    let stored = db.get_rule(rule.id).unwrap().unwrap();
    assert!(!stored.active);
    assert_eq!(rule_dates(&db, rule.id).last(), Some(&date(2025, 7, 31)));

    let paused = reconciler
        .reconcile(&stored, false, date(2025, 8, 12))
        .unwrap();
    assert!(paused.inserted.is_empty());
}

#[test]
fn past_absence_is_dropped_immediately() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rule = db.create_rule(&heating(action, date(2025, 8, 1), None)).unwrap();
    reconciler.reconcile(&rule, false, date(2025, 9, 1)).unwrap();

    let outcome = Suspensions::new(&reconciler)
        .create(rule.id, date(2025, 8, 20), date(2025, 8, 28), date(2025, 9, 1))
        .unwrap();

    assert_eq!(outcome.phase, SuspensionPhase::Expired);
    assert_eq!(outcome.retracted, 9);
    assert!(outcome.suspension.is_none());
    assert!(db.suspension_for_rule(rule.id).unwrap().is_none());
    assert!(db.get_rule(rule.id).unwrap().unwrap().active);
    assert_eq!(db.count_rule_entries(rule.id).unwrap(), 32 - 9);

    let summary = sweep(&reconciler, date(2025, 9, 2)).unwrap();
    assert_eq!(summary.inserted, 1);
    let dates = rule_dates(&db, rule.id);
    assert!(dates.iter().all(|d| *d < date(2025, 8, 20) || *d > date(2025, 8, 28)));
    assert_eq!(dates.last(), Some(&date(2025, 9, 2)));
}

#[test]
fn future_absence_dates_are_skipped() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rule = db.create_rule(&heating(action, date(2025, 8, 1), None)).unwrap();

    let outcome = Suspensions::new(&reconciler)
        .create(rule.id, date(2025, 8, 3), date(2025, 8, 4), date(2025, 7, 20))
        .unwrap();
    assert_eq!(outcome.phase, SuspensionPhase::Scheduled);

    // A pass that runs past the range before any sweep still leaves it empty.
    let passed = reconciler.reconcile(&rule, false, date(2025, 8, 6)).unwrap();
    assert_eq!(passed.skipped_suspended, vec![date(2025, 8, 3), date(2025, 8, 4)]);
    assert_eq!(
        rule_dates(&db, rule.id),
        vec![date(2025, 8, 1), date(2025, 8, 2), date(2025, 8, 5), date(2025, 8, 6)]
    );
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn deleting_a_rule_cascades_to_its_entries() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rules = Rules::new(&reconciler);
    let created = rules
        .create(&heating(action, date(2025, 1, 1), None), date(2025, 1, 7))
        .unwrap();
    reconciler
        .log_one_off(
            action,
            RulePayload::Housing {
                heating_temperature_c: 22.0,
            },
            date(2024, 12, 31),
        )
        .unwrap();

    assert_eq!(rules.delete(created.rule.id).unwrap(), 7);
    let remaining = db.list_entries(&EntryFilter::default()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].rule_id, None);
}

#[test]
fn deleting_an_absence_keeps_entries() {
    let db = FootprintDb::open_memory().unwrap();
    let calculator = FactorTable::default();
    let reconciler = Reconciler::new(&db, &calculator);
    let action = usage_action(&db, Category::Housing, None);
    let rule = db.create_rule(&heating(action, date(2025, 1, 1), None)).unwrap();
    reconciler.reconcile(&rule, false, date(2025, 1, 5)).unwrap();
    let suspensions = Suspensions::new(&reconciler);

    let created = suspensions
        .create(rule.id, date(2025, 2, 1), date(2025, 2, 5), date(2025, 1, 5))
        .unwrap();
    suspensions
        .delete(created.suspension.unwrap().id, date(2025, 1, 5))
        .unwrap();

    assert_eq!(db.count_rule_entries(rule.id).unwrap(), 5);
}
