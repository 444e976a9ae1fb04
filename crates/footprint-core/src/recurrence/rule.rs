use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::Interval;
use crate::action::Category;
use crate::error::ValidationError;

/// Unit of a food quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityUnit {
    Grams,
    Kilograms,
    Millilitres,
    Litres,
    Portions,
}

impl QuantityUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            QuantityUnit::Grams => "g",
            QuantityUnit::Kilograms => "kg",
            QuantityUnit::Millilitres => "ml",
            QuantityUnit::Litres => "l",
            QuantityUnit::Portions => "portion",
        }
    }
}

impl fmt::Display for QuantityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantityUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" | "grammes" => Ok(QuantityUnit::Grams),
            "kg" | "kilogram" | "kilograms" | "kilogrammes" => Ok(QuantityUnit::Kilograms),
            "ml" | "millilitre" | "millilitres" => Ok(QuantityUnit::Millilitres),
            "l" | "litre" | "litres" | "liter" | "liters" => Ok(QuantityUnit::Litres),
            "portion" | "portions" | "unit" | "units" => Ok(QuantityUnit::Portions),
            other => Err(ValidationError::invalid_value(
                "unit",
                format!("unknown quantity unit '{other}'"),
            )),
        }
    }
}

/// Category-specific parameters of a rule or a one-off entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum RulePayload {
    Housing { heating_temperature_c: f64 },
    Transport { distance_km: f64 },
    Food { quantity: f64, unit: QuantityUnit },
}

impl RulePayload {
    pub fn category(&self) -> Category {
        match self {
            RulePayload::Housing { .. } => Category::Housing,
            RulePayload::Transport { .. } => Category::Transport,
            RulePayload::Food { .. } => Category::Food,
        }
    }

    /// Reject non-finite or out-of-range values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            RulePayload::Housing { heating_temperature_c } => {
                if !heating_temperature_c.is_finite() || !(0.0..=40.0).contains(&heating_temperature_c) {
                    return Err(ValidationError::invalid_value(
                        "heating_temperature_c",
                        "must be between 0 and 40",
                    ));
                }
            }
            RulePayload::Transport { distance_km } => {
                if !distance_km.is_finite() || distance_km <= 0.0 {
                    return Err(ValidationError::invalid_value("distance_km", "must be positive"));
                }
            }
            RulePayload::Food { quantity, .. } => {
                if !quantity.is_finite() || quantity <= 0.0 {
                    return Err(ValidationError::invalid_value("quantity", "must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Check the payload against the category of the action it is bound to.
    pub fn ensure_category(&self, category: Category) -> Result<(), ValidationError> {
        if self.category() != category {
            return Err(ValidationError::CategoryMismatch {
                action: category.as_str(),
                payload: self.category().as_str(),
            });
        }
        Ok(())
    }
}

/// A declarative repeating event attached to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: i64,
    pub action_id: i64,
    pub payload: RulePayload,
    /// False while a suspension is in effect.
    pub active: bool,
    pub interval: Interval,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Fields of a rule before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub action_id: i64,
    pub payload: RulePayload,
    pub interval: Interval,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewRule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_bounds(self.start_date, self.end_date)?;
        if self.interval.count == 0 {
            return Err(ValidationError::InvalidInterval(
                "interval count must be greater than zero".into(),
            ));
        }
        self.payload.validate()
    }
}

impl RecurrenceRule {
    pub fn category(&self) -> Category {
        self.payload.category()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_bounds(self.start_date, self.end_date)?;
        if self.interval.count == 0 {
            return Err(ValidationError::InvalidInterval(
                "interval count must be greater than zero".into(),
            ));
        }
        self.payload.validate()
    }

    /// Last date the rule may materialize: its end date, or `horizon_years`
    /// after its start when unbounded.
    pub fn last_materializable(&self, horizon_years: u32) -> NaiveDate {
        match self.end_date {
            Some(end) => end,
            None => horizon_years
                .checked_mul(12)
                .and_then(|months| self.start_date.checked_add_months(Months::new(months)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    /// True once `today` is past an explicit end date.
    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| today > end)
    }
}

fn validate_bounds(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    match end {
        Some(end) if start > end => Err(ValidationError::InvalidDateRange { start, end }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::IntervalUnit;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn heating_rule(end: Option<NaiveDate>) -> RecurrenceRule {
        RecurrenceRule {
            id: 1,
            action_id: 1,
            payload: RulePayload::Housing {
                heating_temperature_c: 19.0,
            },
            active: true,
            interval: Interval::new(1, IntervalUnit::Days).unwrap(),
            start_date: date(2025, 1, 1),
            end_date: end,
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        let rule = heating_rule(Some(date(2024, 12, 31)));
        assert!(matches!(
            rule.validate(),
            Err(ValidationError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn unbounded_rule_stops_at_horizon() {
        let rule = heating_rule(None);
        assert_eq!(rule.last_materializable(3), date(2028, 1, 1));
        assert!(!rule.has_ended(date(2030, 1, 1)));
    }

    #[test]
    fn bounded_rule_ends_after_end_date() {
        let rule = heating_rule(Some(date(2025, 1, 5)));
        assert!(!rule.has_ended(date(2025, 1, 5)));
        assert!(rule.has_ended(date(2025, 1, 6)));
    }

    #[test]
    fn payload_category_mismatch_is_reported() {
        let payload = RulePayload::Transport { distance_km: 12.0 };
        assert!(payload.ensure_category(Category::Transport).is_ok());
        assert!(matches!(
            payload.ensure_category(Category::Food),
            Err(ValidationError::CategoryMismatch { .. })
        ));
    }

    #[test]
    fn payload_serializes_with_category_tag() {
        let payload = RulePayload::Food {
            quantity: 250.0,
            unit: QuantityUnit::Grams,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "food");
        assert_eq!(json["unit"], "grams");
        let back: RulePayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn non_positive_quantities_fail_validation() {
        assert!(RulePayload::Transport { distance_km: 0.0 }.validate().is_err());
        assert!(RulePayload::Food {
            quantity: f64::NAN,
            unit: QuantityUnit::Kilograms
        }
        .validate()
        .is_err());
    }
}
