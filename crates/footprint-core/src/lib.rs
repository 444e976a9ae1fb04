//! # Footprint Core Library
//!
//! Core logic for the footprint carbon ledger. Users log events (heating a
//! home, a commute, a meal) and each event carries a computed CO2e value.
//! Recurring events are declared once as rules and re-materialized into dated
//! ledger entries on demand, while absences pause a rule and are reconciled
//! retroactively.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite ledger (`rusqlite`) and TOML configuration
//! - **Reconciler**: brings one rule's ledger up to date with "today"
//! - **Suspensions**: absence intervals that retract and pause a rule
//! - **Sweep**: settles every absence and reconciles every active rule
//! - **Emissions**: offline factor table or the backend HTTP estimator
//!
//! ## Key Components
//!
//! - [`FootprintDb`]: ledger persistence, injected into every service
//! - [`Reconciler`]: materializes missing occurrences
//! - [`Suspensions`] and [`Rules`]: lifecycle operations
//! - [`sweep()`]: the on-demand catch-up entry point
//! - [`Config`]: application configuration management

pub mod action;
pub mod emissions;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod recurrence;
pub mod rules;
pub mod storage;
pub mod suspension;
pub mod sweep;

pub use action::{Action, ActionResolver, ActionType, Category, Reference};
pub use emissions::{EmissionRequest, EmissionsCalculator, FactorTable, HttpCalculator};
pub use error::{CalculatorError, ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use ledger::{EmissionsSummary, EntryFilter, LedgerEntry, NewLedgerEntry};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use recurrence::{Interval, IntervalUnit, NewRule, QuantityUnit, RecurrenceRule, RulePayload};
pub use rules::{RuleChanges, RuleOutcome, Rules};
pub use storage::{Config, FootprintDb};
pub use suspension::{SuspensionInterval, SuspensionOutcome, SuspensionPhase, Suspensions};
pub use sweep::{sweep, SweepFailure, SweepSummary};
