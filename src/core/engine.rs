use tracing::debug;

use super::condition::apply_discount;
use super::config::ValuationConfig;
use super::error::ValuationError;
use super::types::{
    CurvePoint, DepreciationSchedule, PriceRating, ValuationInputs, ValuationResult, ValueCurve,
};

/// Longest curve or projection the model builds, in years.
pub const MAX_SPAN_YEARS: u32 = 200;

fn year_span(start: i32, end: i32) -> Result<usize, ValuationError> {
    let span = i64::from(end) - i64::from(start);
    if span < 0 {
        return Err(ValuationError::InvalidRange { start, end });
    }
    if span > i64::from(MAX_SPAN_YEARS) {
        return Err(ValuationError::invalid(format!(
            "year range {start}..={end} spans more than {MAX_SPAN_YEARS} years"
        )));
    }
    Ok(span as usize)
}

/// Builds the yearly value curve from `anchor_year` through `end_year`.
///
/// The anchor year is recorded undepreciated; each following year applies the
/// schedule rate for the number of years already elapsed, reusing the last
/// rate once the schedule runs out. Every recorded value is scaled by
/// `mileage_multiplier`.
pub fn build_curve(
    anchor_year: i32,
    anchor_value: f64,
    end_year: i32,
    schedule: &DepreciationSchedule,
    mileage_multiplier: f64,
) -> Result<ValueCurve, ValuationError> {
    let span = year_span(anchor_year, end_year)?;
    if !anchor_value.is_finite() || anchor_value < 0.0 {
        return Err(ValuationError::invalid(format!(
            "anchor value must be >= 0, got {anchor_value}"
        )));
    }
    if !mileage_multiplier.is_finite() || mileage_multiplier <= 0.0 {
        return Err(ValuationError::invalid(format!(
            "mileage multiplier must be > 0, got {mileage_multiplier}"
        )));
    }

    let mut points = Vec::with_capacity(span + 1);
    let mut value = anchor_value;
    points.push(CurvePoint {
        year: anchor_year,
        value: value * mileage_multiplier,
    });
    for elapsed in 0..span {
        value *= 1.0 - schedule.rate_at(elapsed);
        points.push(CurvePoint {
            year: anchor_year + elapsed as i32 + 1,
            value: value * mileage_multiplier,
        });
    }
    if let Some(point) = points.iter().find(|p| !p.value.is_finite()) {
        return Err(ValuationError::invalid(format!(
            "curve value for {} is not finite (anchor value {anchor_value} x multiplier {mileage_multiplier})",
            point.year
        )));
    }

    debug!(
        anchor_year,
        end_year,
        anchor_value,
        mileage_multiplier,
        terminal = value * mileage_multiplier,
        "built depreciation curve"
    );
    Ok(ValueCurve::from_points(points))
}

/// Projects `current_value` forward at a constant yearly rate, scaled by how
/// far the annual mileage is from the reference annual mileage. Every year in
/// `[start_year, end_year]` is depreciated, including the first.
pub fn project_forward(
    current_value: f64,
    start_year: i32,
    end_year: i32,
    annual_mileage: f64,
    reference_annual_mileage: f64,
    base_rate: f64,
) -> Result<ValueCurve, ValuationError> {
    year_span(start_year, end_year)?;
    if !current_value.is_finite() || current_value < 0.0 {
        return Err(ValuationError::invalid(format!(
            "current value must be >= 0, got {current_value}"
        )));
    }
    if !annual_mileage.is_finite() || annual_mileage < 0.0 {
        return Err(ValuationError::invalid(format!(
            "annual mileage must be >= 0, got {annual_mileage}"
        )));
    }
    if reference_annual_mileage == 0.0 {
        return Err(ValuationError::DivisionByZero(
            "reference annual mileage is zero",
        ));
    }
    if !reference_annual_mileage.is_finite() || reference_annual_mileage < 0.0 {
        return Err(ValuationError::invalid(format!(
            "reference annual mileage must be > 0, got {reference_annual_mileage}"
        )));
    }
    if !(0.0..1.0).contains(&base_rate) {
        return Err(ValuationError::invalid(format!(
            "base depreciation rate must be in [0, 1), got {base_rate}"
        )));
    }

    let rate = base_rate * (annual_mileage / reference_annual_mileage);
    if rate > 1.0 {
        return Err(ValuationError::invalid(format!(
            "annual mileage {annual_mileage} implies a yearly depreciation above 100%"
        )));
    }

    let mut value = current_value;
    let points = (start_year..=end_year)
        .map(|year| {
            value *= 1.0 - rate;
            CurvePoint { year, value }
        })
        .collect();
    Ok(ValueCurve::from_points(points))
}

/// Deviations inside `[-fair_band_percent, +fair_band_percent]` are Fair.
pub fn classify_deviation(deviation_percent: f64, fair_band_percent: f64) -> PriceRating {
    if deviation_percent < -fair_band_percent {
        PriceRating::Good
    } else if deviation_percent > fair_band_percent {
        PriceRating::Poor
    } else {
        PriceRating::Fair
    }
}

/// Signed percentage by which the advert price exceeds the market value.
pub fn deviation_percent(advert_price: f64, market_value: f64) -> Result<f64, ValuationError> {
    if market_value == 0.0 {
        return Err(ValuationError::DivisionByZero(
            "adjusted market value is zero",
        ));
    }
    Ok((advert_price - market_value) / market_value * 100.0)
}

pub fn evaluate(
    inputs: &ValuationInputs,
    config: &ValuationConfig,
) -> Result<ValuationResult, ValuationError> {
    validate_inputs(inputs)?;

    let mileage_multiplier = inputs.mileage_policy.multiplier(inputs, config)?;
    let curve = build_curve(
        inputs.registration_year,
        inputs.anchor_price,
        inputs.current_year,
        &config.depreciation_schedule,
        mileage_multiplier,
    )?;
    let pre_discount_value = curve.terminal_value();
    let market_value = apply_discount(
        pre_discount_value,
        inputs.condition,
        &config.condition_discounts,
    )?;

    let deviation_percent = deviation_percent(inputs.advert_price, market_value)?;
    let rating = classify_deviation(deviation_percent, config.fair_band_percent);

    let (per_year_depreciation, per_month_depreciation) =
        depreciation_rates(inputs.anchor_price, market_value, inputs.age_years());

    let projection = inputs
        .projection_end_year
        .map(|end_year| {
            let start_year = inputs.current_year.checked_add(1).ok_or(
                ValuationError::InvalidRange {
                    start: inputs.current_year,
                    end: end_year,
                },
            )?;
            project_forward(
                market_value,
                start_year,
                end_year,
                inputs.annual_mileage,
                config.reference_annual_mileage,
                config.projection_base_rate,
            )
        })
        .transpose()?;

    debug!(
        registration_year = inputs.registration_year,
        current_year = inputs.current_year,
        market_value,
        deviation_percent,
        %rating,
        "evaluated advert"
    );

    Ok(ValuationResult {
        market_value,
        pre_discount_value,
        mileage_multiplier,
        deviation_percent,
        rating,
        per_year_depreciation,
        per_month_depreciation,
        curve,
        projection,
    })
}

impl ValuationInputs {
    fn age_years(&self) -> i64 {
        i64::from(self.current_year) - i64::from(self.registration_year)
    }
}

/// A vehicle valued in its registration year has no elapsed time to spread
/// depreciation over, so both rates are zero rather than undefined.
fn depreciation_rates(anchor_price: f64, market_value: f64, age_years: i64) -> (f64, f64) {
    if age_years <= 0 {
        return (0.0, 0.0);
    }
    let per_year = (anchor_price - market_value) / age_years as f64;
    (per_year, per_year / 12.0)
}

fn validate_inputs(inputs: &ValuationInputs) -> Result<(), ValuationError> {
    for (name, value) in [
        ("anchor price", inputs.anchor_price),
        ("advert price", inputs.advert_price),
        ("advert mileage", inputs.advert_mileage),
        ("annual mileage", inputs.annual_mileage),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ValuationError::invalid(format!(
                "{name} must be >= 0, got {value}"
            )));
        }
    }
    Ok(())
}
