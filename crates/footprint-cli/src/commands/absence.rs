use chrono::NaiveDate;
use clap::Subcommand;
use footprint_core::Suspensions;

use super::{print_json, CmdResult, Session};

#[derive(Subcommand)]
pub enum AbsenceAction {
    /// Pause a rule between two dates (inclusive)
    Create {
        /// Rule ID
        rule: i64,
        /// First day of the absence (YYYY-MM-DD)
        start: NaiveDate,
        /// Last day of the absence (YYYY-MM-DD)
        end: NaiveDate,
    },
    /// Move an absence
    Update {
        /// Absence ID
        id: i64,
        start: NaiveDate,
        end: NaiveDate,
    },
    /// Remove an absence early and resume its rule
    Delete {
        /// Absence ID
        id: i64,
    },
    /// List absences
    List,
}

pub fn run(action: AbsenceAction, today: NaiveDate) -> CmdResult {
    let session = Session::open()?;
    let reconciler = session.reconciler();
    let suspensions = Suspensions::new(&reconciler);

    match action {
        AbsenceAction::Create { rule, start, end } => {
            print_json(&suspensions.create(rule, start, end, today)?)?;
        }
        AbsenceAction::Update { id, start, end } => {
            print_json(&suspensions.update(id, start, end, today)?)?;
        }
        AbsenceAction::Delete { id } => {
            print_json(&suspensions.delete(id, today)?)?;
        }
        AbsenceAction::List => print_json(&session.db.list_suspensions()?)?,
    }
    Ok(())
}
