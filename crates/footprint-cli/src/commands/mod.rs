pub mod absence;
pub mod config;
pub mod ledger;
pub mod reference;
pub mod rule;
pub mod sweep;

use chrono::{Local, NaiveDate};
use clap::Args;
use footprint_core::{
    emissions, Category, Config, EmissionsCalculator, FootprintDb, QuantityUnit, Reconciler,
    RulePayload, ValidationError,
};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn today(arg: Option<NaiveDate>) -> NaiveDate {
    arg.unwrap_or_else(|| Local::now().date_naive())
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Store, calculator and settings opened for one command.
pub struct Session {
    pub db: FootprintDb,
    calculator: Box<dyn EmissionsCalculator>,
    horizon_years: u32,
}

impl Session {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load_or_default();
        let db = FootprintDb::open()?;
        let calculator = emissions::from_config(&config)?;
        Ok(Self {
            db,
            calculator,
            horizon_years: config.reconcile.horizon_years,
        })
    }

    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.db, self.calculator.as_ref()).with_horizon_years(self.horizon_years)
    }
}

/// Category-specific flags shared by `rule` and `ledger log`.
#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Heating temperature in °C (housing)
    #[arg(long)]
    pub temperature: Option<f64>,
    /// Distance in km (transport)
    #[arg(long)]
    pub distance: Option<f64>,
    /// Quantity (food)
    #[arg(long)]
    pub quantity: Option<f64>,
    /// Quantity unit: g, kg, ml, l, portion (food)
    #[arg(long, default_value = "g")]
    pub quantity_unit: QuantityUnit,
}

impl Default for PayloadArgs {
    fn default() -> Self {
        Self {
            temperature: None,
            distance: None,
            quantity: None,
            quantity_unit: QuantityUnit::Grams,
        }
    }
}

impl PayloadArgs {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.distance.is_none() && self.quantity.is_none()
    }

    /// Build the payload for `category`, requiring its flag.
    pub fn payload(&self, category: Category) -> Result<RulePayload, ValidationError> {
        let missing = |flag: &str| {
            ValidationError::invalid_value(flag, format!("--{flag} is required for {category}"))
        };
        match category {
            Category::Housing => Ok(RulePayload::Housing {
                heating_temperature_c: self.temperature.ok_or_else(|| missing("temperature"))?,
            }),
            Category::Transport => Ok(RulePayload::Transport {
                distance_km: self.distance.ok_or_else(|| missing("distance"))?,
            }),
            Category::Food => Ok(RulePayload::Food {
                quantity: self.quantity.ok_or_else(|| missing("quantity"))?,
                unit: self.quantity_unit,
            }),
        }
    }

    /// Like [`PayloadArgs::payload`], but `None` when no payload flag was given.
    pub fn changed_payload(
        &self,
        category: Category,
    ) -> Result<Option<RulePayload>, ValidationError> {
        if self.is_empty() {
            return Ok(None);
        }
        self.payload(category).map(Some)
    }
}
