use super::config::ValuationConfig;
use super::error::ValuationError;
use super::types::{MileagePolicy, ValuationInputs};

/// Linear offset: every `scale_factor` miles under the reference adds 100% of
/// value, every `scale_factor` over removes it.
pub fn normalize_linear(
    observed_mileage: f64,
    reference_mileage: f64,
    scale_factor: f64,
) -> Result<f64, ValuationError> {
    if !observed_mileage.is_finite() || observed_mileage < 0.0 {
        return Err(ValuationError::invalid(format!(
            "observed mileage must be >= 0, got {observed_mileage}"
        )));
    }
    if !reference_mileage.is_finite() || reference_mileage < 0.0 {
        return Err(ValuationError::invalid(format!(
            "reference mileage must be >= 0, got {reference_mileage}"
        )));
    }
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        return Err(ValuationError::invalid(format!(
            "mileage scale factor must be > 0, got {scale_factor}"
        )));
    }

    Ok(1.0 + (reference_mileage - observed_mileage) / scale_factor)
}

/// Ratio: value scales with `reference / observed`.
pub fn normalize_ratio(
    observed_mileage: f64,
    reference_mileage: f64,
) -> Result<f64, ValuationError> {
    if observed_mileage == 0.0 {
        return Err(ValuationError::DivisionByZero(
            "observed mileage is zero under ratio normalization",
        ));
    }
    if !observed_mileage.is_finite() || observed_mileage < 0.0 {
        return Err(ValuationError::invalid(format!(
            "observed mileage must be > 0, got {observed_mileage}"
        )));
    }
    if !reference_mileage.is_finite() || reference_mileage <= 0.0 {
        return Err(ValuationError::invalid(format!(
            "reference mileage must be > 0, got {reference_mileage}"
        )));
    }

    Ok(reference_mileage / observed_mileage)
}

impl MileagePolicy {
    /// Multiplier for the mileage figure this policy is defined over.
    pub fn multiplier(
        self,
        inputs: &ValuationInputs,
        config: &ValuationConfig,
    ) -> Result<f64, ValuationError> {
        match self {
            MileagePolicy::AdvertLinear => normalize_linear(
                inputs.advert_mileage,
                config.reference_mileage,
                config.mileage_scale_factor,
            ),
            MileagePolicy::AnnualRatio => normalize_ratio(
                inputs.annual_mileage,
                config.ratio_reference_annual_mileage,
            ),
        }
    }
}
