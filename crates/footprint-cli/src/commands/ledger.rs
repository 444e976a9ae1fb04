//! Ledger commands: list, log one-off entries, delete, summarize.

use chrono::NaiveDate;
use clap::Subcommand;
use footprint_core::{ActionResolver, ActionType, CoreError, EntryFilter};

use super::{print_json, CmdResult, PayloadArgs, Session};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// List entries
    List {
        /// Only entries materialized by this rule
        #[arg(long)]
        rule: Option<i64>,
        /// Only entries of this action
        #[arg(long)]
        action: Option<i64>,
        /// Earliest date (inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest date (inclusive)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Log a one-off entry
    Log {
        /// Reference the entry is about
        #[arg(long = "ref")]
        reference: i64,
        /// Action type: creation or usage
        #[arg(long = "type", default_value = "usage")]
        action_type: ActionType,
        /// Entry date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Delete one entry
    Delete {
        /// Entry ID
        id: i64,
    },
    /// Total emissions per category
    Summary {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

pub fn run(action: LedgerAction, today: NaiveDate) -> CmdResult {
    let session = Session::open()?;
    let db = &session.db;

    match action {
        LedgerAction::List {
            rule,
            action,
            from,
            to,
        } => {
            let filter = EntryFilter {
                rule_id: rule,
                action_id: action,
                from,
                to,
            };
            print_json(&db.list_entries(&filter)?)?;
        }
        LedgerAction::Log {
            reference,
            action_type,
            date,
            payload,
        } => {
            let reference = db
                .get_reference(reference)?
                .ok_or_else(|| CoreError::not_found("reference", reference))?;
            let action = db.find_or_create_action(action_type, reference.category, reference.id)?;
            let payload = payload.payload(reference.category)?;
            let id = session
                .reconciler()
                .log_one_off(action.id, payload, date.unwrap_or(today))?;
            let entry = db
                .get_entry(id)?
                .ok_or_else(|| CoreError::not_found("entry", id))?;
            println!("Entry logged: {id}");
            print_json(&entry)?;
        }
        LedgerAction::Delete { id } => {
            if !db.delete_entry(id)? {
                return Err(CoreError::not_found("entry", id).into());
            }
            println!("Entry deleted: {id}");
        }
        LedgerAction::Summary { from, to } => print_json(&db.emissions_summary(from, to)?)?,
    }
    Ok(())
}
