//! Emissions calculators.
//!
//! The reconciler prices every materialized entry through an
//! [`EmissionsCalculator`]. Two implementations ship: [`FactorTable`]
//! computes offline from configured factors, [`HttpCalculator`] asks the
//! backend proxy.

mod factors;
mod http;

pub use factors::FactorTable;
pub use http::HttpCalculator;

use serde::Serialize;

use crate::action::{ActionType, Category};
use crate::error::{CalculatorError, CoreError};
use crate::recurrence::RulePayload;
use crate::storage::{CalculatorMode, Config};

/// What to price: one occurrence of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionRequest {
    pub category: Category,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// External code of the linked entity (food barcode, vehicle kind).
    pub code: Option<String>,
    pub params: RulePayload,
}

impl EmissionRequest {
    pub fn new(action_type: ActionType, code: Option<String>, params: RulePayload) -> Self {
        Self {
            category: params.category(),
            action_type,
            code,
            params,
        }
    }
}

/// Prices one ledger entry in kilograms of CO2e.
///
/// `Ok(None)` means the action carries no direct emissions (housing creation).
pub trait EmissionsCalculator {
    fn estimate(&self, request: &EmissionRequest) -> Result<Option<f64>, CalculatorError>;
}

/// Round to grams, the precision the backend reports.
pub fn round_kg(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Build the calculator selected in `config`.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(config: &Config) -> Result<Box<dyn EmissionsCalculator>, CoreError> {
    match config.calculator.mode {
        CalculatorMode::Offline => Ok(Box::new(FactorTable::new(config.factors.clone()))),
        CalculatorMode::Http => Ok(Box::new(HttpCalculator::new(
            &config.calculator.base_url,
            std::time::Duration::from_secs(config.calculator.timeout_secs),
        )?)),
    }
}
