//! Recurring rule commands.

use chrono::NaiveDate;
use clap::Subcommand;
use footprint_core::{
    ActionResolver, ActionType, CoreError, EntryFilter, Interval, IntervalUnit, NewRule,
    RuleChanges, Rules,
};
use serde_json::json;

use super::{print_json, CmdResult, PayloadArgs, Session};

#[derive(Subcommand)]
pub enum RuleAction {
    /// Create a rule and materialize it up to today
    Create {
        /// Reference the rule is about
        #[arg(long = "ref")]
        reference: i64,
        /// Action type: creation or usage
        #[arg(long = "type", default_value = "usage")]
        action_type: ActionType,
        /// Repeat every N units
        #[arg(long, default_value = "1")]
        every: u32,
        /// Interval unit: days, weeks, months, years (jours, semaines, mois, ans)
        #[arg(long, default_value = "days")]
        unit: IntervalUnit,
        /// First occurrence (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last possible occurrence (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// List rules
    List,
    /// Show a rule with its absence and entry count
    Show {
        /// Rule ID
        id: i64,
    },
    /// Update a rule
    Update {
        /// Rule ID
        id: i64,
        /// New interval count (needs --unit)
        #[arg(long, requires = "unit")]
        every: Option<u32>,
        /// New interval unit (needs --every)
        #[arg(long, requires = "every")]
        unit: Option<IntervalUnit>,
        /// New start date
        #[arg(long)]
        start: Option<NaiveDate>,
        /// New end date
        #[arg(long, conflicts_with = "clear_end")]
        end: Option<NaiveDate>,
        /// Remove the end date
        #[arg(long)]
        clear_end: bool,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Delete a rule with its entries
    Delete {
        /// Rule ID
        id: i64,
    },
}

pub fn run(action: RuleAction, today: NaiveDate) -> CmdResult {
    let session = Session::open()?;
    let db = &session.db;
    let reconciler = session.reconciler();
    let rules = Rules::new(&reconciler);

    match action {
        RuleAction::Create {
            reference,
            action_type,
            every,
            unit,
            start,
            end,
            payload,
        } => {
            let reference = db
                .get_reference(reference)?
                .ok_or_else(|| CoreError::not_found("reference", reference))?;
            let action = db.find_or_create_action(action_type, reference.category, reference.id)?;
            let new = NewRule {
                action_id: action.id,
                payload: payload.payload(reference.category)?,
                interval: Interval::new(every, unit)?,
                start_date: start,
                end_date: end,
            };
            let outcome = rules.create(&new, today)?;
            println!("Rule created: {}", outcome.rule.id);
            print_json(&outcome)?;
        }
        RuleAction::List => print_json(&db.list_rules()?)?,
        RuleAction::Show { id } => {
            let rule = db
                .get_rule(id)?
                .ok_or_else(|| CoreError::not_found("rule", id))?;
            let suspension = db.suspension_for_rule(id)?;
            let entries = db.list_entries(&EntryFilter::for_rule(id))?;
            print_json(&json!({
                "rule": rule,
                "absence": suspension,
                "entries": entries.len(),
                "last_entry": entries.last().map(|e| e.date),
            }))?;
        }
        RuleAction::Update {
            id,
            every,
            unit,
            start,
            end,
            clear_end,
            payload,
        } => {
            let rule = db
                .get_rule(id)?
                .ok_or_else(|| CoreError::not_found("rule", id))?;
            let interval = match (every, unit) {
                (Some(every), Some(unit)) => Some(Interval::new(every, unit)?),
                (None, None) => None,
                _ => return Err("--every and --unit must be given together".into()),
            };
            let changes = RuleChanges {
                payload: payload.changed_payload(rule.category())?,
                interval,
                start_date: start,
                end_date: if clear_end { Some(None) } else { end.map(Some) },
            };
            if changes.is_empty() {
                return Err("nothing to update".into());
            }
            let outcome = rules.update(id, &changes, today)?;
            print_json(&outcome)?;
        }
        RuleAction::Delete { id } => {
            let removed = rules.delete(id)?;
            println!("Rule deleted: {id} ({removed} entries removed)");
        }
    }
    Ok(())
}
