use super::{round_kg, EmissionRequest, EmissionsCalculator};
use crate::action::ActionType;
use crate::error::CalculatorError;
use crate::recurrence::{QuantityUnit, RulePayload};
use crate::storage::EmissionFactors;

/// Offline calculator backed by configured emission factors.
#[derive(Debug, Clone, Default)]
pub struct FactorTable {
    factors: EmissionFactors,
}

impl FactorTable {
    pub fn new(factors: EmissionFactors) -> Self {
        Self { factors }
    }

    pub fn factors(&self) -> &EmissionFactors {
        &self.factors
    }

    fn mass_kg(&self, quantity: f64, unit: QuantityUnit) -> f64 {
        match unit {
            QuantityUnit::Grams => quantity / 1000.0,
            QuantityUnit::Kilograms => quantity,
            QuantityUnit::Millilitres => quantity / 1000.0 * self.factors.litre_mass_kg,
            QuantityUnit::Litres => quantity * self.factors.litre_mass_kg,
            QuantityUnit::Portions => quantity * self.factors.portion_mass_kg,
        }
    }
}

impl EmissionsCalculator for FactorTable {
    fn estimate(&self, request: &EmissionRequest) -> Result<Option<f64>, CalculatorError> {
        let f = &self.factors;
        let kg = match (&request.params, request.action_type) {
            (RulePayload::Housing { .. }, ActionType::Creation) => return Ok(None),
            (RulePayload::Housing { heating_temperature_c }, ActionType::Usage) => {
                f.housing_kg_per_degree_day * heating_temperature_c
            }
            (RulePayload::Transport { distance_km }, ActionType::Creation) => {
                f.transport_creation_kg_per_km * distance_km
            }
            (RulePayload::Transport { distance_km }, ActionType::Usage) => {
                f.transport_kg_per_km * distance_km
            }
            (RulePayload::Food { quantity, unit }, ActionType::Creation) => {
                f.food_kg_per_kg * self.mass_kg(*quantity, *unit)
            }
            (RulePayload::Food { quantity, unit }, ActionType::Usage) => {
                f.food_usage_kg_per_kg * self.mass_kg(*quantity, *unit)
            }
        };
        Ok(Some(round_kg(kg)))
    }
}
