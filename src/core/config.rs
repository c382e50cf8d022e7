use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ConditionCategory, DepreciationSchedule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fixed value discounts for write-off categories, as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionDiscounts {
    pub non_structural: f64,
    pub structural: f64,
}

impl Default for ConditionDiscounts {
    fn default() -> Self {
        Self {
            non_structural: 0.15,
            structural: 0.25,
        }
    }
}

impl ConditionDiscounts {
    pub fn fraction(&self, category: ConditionCategory) -> f64 {
        match category {
            ConditionCategory::None => 0.0,
            ConditionCategory::NonStructuralWriteOff => self.non_structural,
            ConditionCategory::StructuralWriteOff => self.structural,
        }
    }
}

/// Static model parameters. Loaded once at start-up and passed by reference
/// into every valuation; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValuationConfig {
    pub depreciation_schedule: DepreciationSchedule,
    pub reference_mileage: f64,
    pub mileage_scale_factor: f64,
    pub reference_annual_mileage: f64,
    pub ratio_reference_annual_mileage: f64,
    pub projection_base_rate: f64,
    pub condition_discounts: ConditionDiscounts,
    pub fair_band_percent: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            depreciation_schedule: DepreciationSchedule::default(),
            reference_mileage: 10_000.0,
            mileage_scale_factor: 100_000.0,
            reference_annual_mileage: 10_000.0,
            ratio_reference_annual_mileage: 15_000.0,
            projection_base_rate: 0.07,
            condition_discounts: ConditionDiscounts::default(),
            fair_band_percent: 5.0,
        }
    }
}

impl ValuationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("referenceMileage", self.reference_mileage),
            ("mileageScaleFactor", self.mileage_scale_factor),
            ("referenceAnnualMileage", self.reference_annual_mileage),
            (
                "ratioReferenceAnnualMileage",
                self.ratio_reference_annual_mileage,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }

        for (name, value) in [
            ("projectionBaseRate", self.projection_base_rate),
            (
                "conditionDiscounts.nonStructural",
                self.condition_discounts.non_structural,
            ),
            (
                "conditionDiscounts.structural",
                self.condition_discounts.structural,
            ),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1)"
                )));
            }
        }

        if !self.fair_band_percent.is_finite() || self.fair_band_percent < 0.0 {
            return Err(ConfigError::Invalid(
                "fairBandPercent must be >= 0".to_string(),
            ));
        }

        Ok(())
    }
}
