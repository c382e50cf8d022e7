mod condition;
mod config;
mod engine;
mod error;
mod mileage;
mod types;

pub use condition::{apply_discount, apply_discount_str};
pub use config::{ConditionDiscounts, ConfigError, ValuationConfig};
pub use engine::{
    MAX_SPAN_YEARS, build_curve, classify_deviation, deviation_percent, evaluate, project_forward,
};
pub use error::ValuationError;
pub use mileage::{normalize_linear, normalize_ratio};
pub use types::{
    AdvertDetails, AdvertRecord, ConditionCategory, CurvePoint, DepreciationSchedule,
    MileagePolicy, PriceRating, ValuationInputs, ValuationResult, ValueCurve,
};
