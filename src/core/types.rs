use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ValuationError;

/// Per-year depreciation rates indexed by years elapsed since the anchor
/// year. Lookups past the end reuse the final rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct DepreciationSchedule {
    rates: Vec<f64>,
}

impl DepreciationSchedule {
    pub fn new(rates: Vec<f64>) -> Result<Self, ValuationError> {
        if rates.is_empty() {
            return Err(ValuationError::invalid(
                "depreciation schedule must contain at least one rate",
            ));
        }
        if let Some((idx, rate)) = rates
            .iter()
            .enumerate()
            .find(|(_, rate)| !rate.is_finite() || !(0.0..1.0).contains(*rate))
        {
            return Err(ValuationError::invalid(format!(
                "depreciation rate #{idx} must be in [0, 1), got {rate}"
            )));
        }
        Ok(Self { rates })
    }

    pub fn rate_at(&self, elapsed: usize) -> f64 {
        let last = self.rates.len() - 1;
        self.rates[elapsed.min(last)]
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }
}

impl Default for DepreciationSchedule {
    fn default() -> Self {
        let mut rates = vec![0.25, 0.15, 0.10, 0.08, 0.07];
        rates.extend(std::iter::repeat_n(0.05, 8));
        Self { rates }
    }
}

impl TryFrom<Vec<f64>> for DepreciationSchedule {
    type Error = ValuationError;

    fn try_from(rates: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(rates)
    }
}

impl From<DepreciationSchedule> for Vec<f64> {
    fn from(value: DepreciationSchedule) -> Self {
        value.rates
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CurvePoint {
    pub year: i32,
    pub value: f64,
}

/// Year-ordered monetary values, strictly increasing in year. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueCurve {
    points: Vec<CurvePoint>,
}

impl ValueCurve {
    pub(crate) fn from_points(points: Vec<CurvePoint>) -> Self {
        debug_assert!(!points.is_empty());
        debug_assert!(points.windows(2).all(|w| w[0].year < w[1].year));
        Self { points }
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<CurvePoint> {
        self.points.first().copied()
    }

    pub fn terminal(&self) -> Option<CurvePoint> {
        self.points.last().copied()
    }

    pub fn terminal_value(&self) -> f64 {
        self.points[self.points.len() - 1].value
    }

    pub fn value_at(&self, year: i32) -> Option<f64> {
        self.points
            .binary_search_by_key(&year, |p| p.year)
            .ok()
            .map(|idx| self.points[idx].value)
    }

    /// Joins `later` onto this curve for plotting. Points of `later` that do
    /// not come after this curve's last year are dropped.
    pub fn chain(&self, later: &ValueCurve) -> ValueCurve {
        let mut points = self.points.clone();
        let last_year = self.terminal().map(|p| p.year);
        points.extend(
            later
                .points
                .iter()
                .filter(|p| last_year.is_none_or(|year| p.year > year))
                .copied(),
        );
        ValueCurve { points }
    }
}

/// Insurance write-off classification.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionCategory {
    #[default]
    None,
    NonStructuralWriteOff,
    StructuralWriteOff,
}

impl FromStr for ConditionCategory {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "none" | "clean" => Ok(Self::None),
            "cat-n" | "n" | "non-structural" | "non-structural-write-off" => {
                Ok(Self::NonStructuralWriteOff)
            }
            "cat-s" | "s" | "structural" | "structural-write-off" => Ok(Self::StructuralWriteOff),
            _ => Err(ValuationError::UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRating {
    Good,
    Fair,
    Poor,
}

impl PriceRating {
    /// Human readable rating with the signed deviation, e.g. `Poor (+8.0%)`.
    pub fn describe(self, deviation_percent: f64) -> String {
        match self {
            PriceRating::Good => format!("Good ({deviation_percent:.1}%)"),
            PriceRating::Fair => format!("Fair ({deviation_percent:.1}%)"),
            PriceRating::Poor => format!("Poor (+{deviation_percent:.1}%)"),
        }
    }
}

impl fmt::Display for PriceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PriceRating::Good => "Good",
            PriceRating::Fair => "Fair",
            PriceRating::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// Which mileage figure drives the value adjustment.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MileagePolicy {
    /// Advert odometer reading against the reference mileage, linear offset.
    #[default]
    AdvertLinear,
    /// Projected annual mileage against the reference annual rate, by ratio.
    AnnualRatio,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationInputs {
    pub registration_year: i32,
    pub anchor_price: f64,
    pub advert_price: f64,
    pub advert_mileage: f64,
    pub annual_mileage: f64,
    pub condition: ConditionCategory,
    pub current_year: i32,
    pub mileage_policy: MileagePolicy,
    pub projection_end_year: Option<i32>,
}

impl ValuationInputs {
    pub fn from_advert(
        advert: AdvertDetails,
        anchor_price: f64,
        annual_mileage: f64,
        current_year: i32,
    ) -> Self {
        Self {
            registration_year: advert.registration_year,
            anchor_price,
            advert_price: advert.price,
            advert_mileage: advert.mileage,
            annual_mileage,
            condition: advert.condition,
            current_year,
            mileage_policy: MileagePolicy::default(),
            projection_end_year: None,
        }
    }
}

/// Best-effort fields extracted from an advert; any may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdvertRecord {
    pub year: Option<i32>,
    pub price: Option<f64>,
    pub mileage: Option<f64>,
    pub condition: Option<ConditionCategory>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvertDetails {
    pub registration_year: i32,
    pub price: f64,
    pub mileage: f64,
    pub condition: ConditionCategory,
}

impl AdvertRecord {
    /// Adverts only state a write-off category when there is one, so a
    /// missing condition reads as [`ConditionCategory::None`].
    pub fn require(self) -> Result<AdvertDetails, ValuationError> {
        match (self.year, self.price, self.mileage) {
            (Some(registration_year), Some(price), Some(mileage)) => Ok(AdvertDetails {
                registration_year,
                price,
                mileage,
                condition: self.condition.unwrap_or_default(),
            }),
            _ => {
                let missing = [
                    ("year", self.year.is_none()),
                    ("price", self.price.is_none()),
                    ("mileage", self.mileage.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(ValuationError::IncompleteInput(missing))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationResult {
    pub market_value: f64,
    pub pre_discount_value: f64,
    pub mileage_multiplier: f64,
    pub deviation_percent: f64,
    pub rating: PriceRating,
    pub per_year_depreciation: f64,
    pub per_month_depreciation: f64,
    pub curve: ValueCurve,
    pub projection: Option<ValueCurve>,
}

impl ValuationResult {
    pub fn rating_label(&self) -> String {
        self.rating.describe(self.deviation_percent)
    }
}
