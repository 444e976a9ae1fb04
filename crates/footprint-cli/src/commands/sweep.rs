use chrono::NaiveDate;

use super::{print_json, CmdResult, Session};

pub fn run(today: NaiveDate) -> CmdResult {
    let session = Session::open()?;
    let summary = footprint_core::sweep(&session.reconciler(), today)?;
    print_json(&summary)?;
    if !summary.failures.is_empty() {
        return Err(format!("{} rule(s) failed to reconcile", summary.failures.len()).into());
    }
    Ok(())
}
