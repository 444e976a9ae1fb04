mod config;
pub mod footprint_db;
pub mod migrations;

pub use config::{CalculatorConfig, CalculatorMode, Config, EmissionFactors, ReconcileConfig};
pub use footprint_db::FootprintDb;

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `FOOTPRINT_HOME` overrides the location outright. Otherwise the directory
/// is `~/.config/footprint/`, or `~/.config/footprint-dev/` when
/// `FOOTPRINT_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("FOOTPRINT_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOOTPRINT_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("footprint-dev")
            } else {
                base_dir.join("footprint")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
