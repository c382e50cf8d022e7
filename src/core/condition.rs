use super::config::ConditionDiscounts;
use super::error::ValuationError;
use super::types::ConditionCategory;

pub fn apply_discount(
    value: f64,
    category: ConditionCategory,
    discounts: &ConditionDiscounts,
) -> Result<f64, ValuationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValuationError::invalid(format!(
            "value to discount must be >= 0, got {value}"
        )));
    }
    Ok(value * (1.0 - discounts.fraction(category)))
}

/// Parses a free-form category label and applies its discount.
pub fn apply_discount_str(
    value: f64,
    category: &str,
    discounts: &ConditionDiscounts,
) -> Result<f64, ValuationError> {
    apply_discount(value, category.parse()?, discounts)
}
