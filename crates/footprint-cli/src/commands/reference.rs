//! Reference commands: the homes, vehicles and food items actions point at.

use clap::Subcommand;
use footprint_core::{Category, FootprintDb};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum RefAction {
    /// Add a reference
    Add {
        /// Category: logement|housing, transport, aliment|food
        category: Category,
        /// Display label
        label: String,
        /// External code (food barcode, vehicle kind)
        #[arg(long)]
        code: Option<String>,
    },
    /// List references
    List,
}

pub fn run(action: RefAction) -> CmdResult {
    let db = FootprintDb::open()?;

    match action {
        RefAction::Add {
            category,
            label,
            code,
        } => {
            let reference = db.create_reference(category, code.as_deref(), &label)?;
            println!("Reference created: {}", reference.id);
            print_json(&reference)?;
        }
        RefAction::List => print_json(&db.list_references()?)?,
    }
    Ok(())
}
