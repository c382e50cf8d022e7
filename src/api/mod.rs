use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Datelike;
use clap::{Parser, ValueEnum, error::ErrorKind};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AdvertRecord, ConditionCategory, MileagePolicy, ValuationConfig, ValuationInputs,
    ValuationResult, ValueCurve, evaluate,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliConditionCategory {
    None,
    #[value(alias = "cat-n")]
    NonStructural,
    #[value(alias = "cat-s")]
    Structural,
}

impl From<CliConditionCategory> for ConditionCategory {
    fn from(value: CliConditionCategory) -> Self {
        match value {
            CliConditionCategory::None => ConditionCategory::None,
            CliConditionCategory::NonStructural => ConditionCategory::NonStructuralWriteOff,
            CliConditionCategory::Structural => ConditionCategory::StructuralWriteOff,
        }
    }
}

impl From<ConditionCategory> for CliConditionCategory {
    fn from(value: ConditionCategory) -> Self {
        match value {
            ConditionCategory::None => CliConditionCategory::None,
            ConditionCategory::NonStructuralWriteOff => CliConditionCategory::NonStructural,
            ConditionCategory::StructuralWriteOff => CliConditionCategory::Structural,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliMileagePolicy {
    AdvertLinear,
    AnnualRatio,
}

impl From<CliMileagePolicy> for MileagePolicy {
    fn from(value: CliMileagePolicy) -> Self {
        match value {
            CliMileagePolicy::AdvertLinear => MileagePolicy::AdvertLinear,
            CliMileagePolicy::AnnualRatio => MileagePolicy::AnnualRatio,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiMileagePolicy {
    #[serde(alias = "advertLinear", alias = "advert_linear", alias = "linear")]
    AdvertLinear,
    #[serde(alias = "annualRatio", alias = "annual_ratio", alias = "ratio")]
    AnnualRatio,
}

impl From<ApiMileagePolicy> for CliMileagePolicy {
    fn from(value: ApiMileagePolicy) -> Self {
        match value {
            ApiMileagePolicy::AdvertLinear => CliMileagePolicy::AdvertLinear,
            ApiMileagePolicy::AnnualRatio => CliMileagePolicy::AnnualRatio,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EvaluatePayload {
    registration_year: Option<i32>,
    advert_price: Option<f64>,
    advert_mileage: Option<f64>,
    condition: Option<String>,

    anchor_price: Option<f64>,
    annual_mileage: Option<f64>,
    current_year: Option<i32>,
    mileage_policy: Option<ApiMileagePolicy>,
    projection_end_year: Option<i32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "van-value",
    about = "Estimate a van's market value from age, mileage and write-off status and rate an advert price"
)]
struct Cli {
    #[arg(long)]
    registration_year: i32,
    #[arg(
        long,
        default_value_t = 30_000.0,
        help = "Original new purchase price"
    )]
    anchor_price: f64,
    #[arg(long)]
    advert_price: f64,
    #[arg(long, help = "Odometer reading stated in the advert")]
    advert_mileage: f64,
    #[arg(
        long,
        default_value_t = 10_000.0,
        help = "Projected annual mileage once bought"
    )]
    annual_mileage: f64,
    #[arg(long, value_enum, default_value_t = CliConditionCategory::None)]
    condition: CliConditionCategory,
    #[arg(long, help = "Valuation year, defaults to the current calendar year")]
    current_year: Option<i32>,
    #[arg(
        long,
        value_enum,
        default_value_t = CliMileagePolicy::AdvertLinear,
        help = "Adjust by advert mileage (linear) or by annual mileage (ratio)"
    )]
    mileage_policy: CliMileagePolicy,
    #[arg(long, help = "Project the market value forward to this year")]
    projection_end_year: Option<i32>,
    #[arg(long, help = "Print the full result as JSON")]
    json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponse {
    current_year: i32,
    mileage_policy: MileagePolicy,
    condition: ConditionCategory,
    rating_label: String,
    #[serde(flatten)]
    result: ValuationResult,
    chart: ValueCurve,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

fn clock_year() -> i32 {
    chrono::Local::now().year()
}

fn build_inputs(cli: &Cli, clock_year: i32) -> Result<ValuationInputs, String> {
    let current_year = cli.current_year.unwrap_or(clock_year);

    for (name, year) in [
        ("--registration-year", Some(cli.registration_year)),
        ("--current-year", Some(current_year)),
        ("--projection-end-year", cli.projection_end_year),
    ] {
        if let Some(year) = year {
            if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                return Err(format!("{name} must be between {MIN_YEAR} and {MAX_YEAR}"));
            }
        }
    }

    if cli.registration_year > current_year {
        return Err("--registration-year must be <= --current-year".to_string());
    }

    if !cli.anchor_price.is_finite() || cli.anchor_price <= 0.0 {
        return Err("--anchor-price must be > 0".to_string());
    }

    if !cli.advert_price.is_finite() || cli.advert_price < 0.0 {
        return Err("--advert-price must be >= 0".to_string());
    }

    if !cli.advert_mileage.is_finite() || cli.advert_mileage < 0.0 {
        return Err("--advert-mileage must be >= 0".to_string());
    }

    if !cli.annual_mileage.is_finite() || cli.annual_mileage <= 0.0 {
        return Err("--annual-mileage must be > 0".to_string());
    }

    if let Some(end_year) = cli.projection_end_year {
        if end_year <= current_year {
            return Err("--projection-end-year must be > --current-year".to_string());
        }
    }

    Ok(ValuationInputs {
        registration_year: cli.registration_year,
        anchor_price: cli.anchor_price,
        advert_price: cli.advert_price,
        advert_mileage: cli.advert_mileage,
        annual_mileage: cli.annual_mileage,
        condition: cli.condition.into(),
        current_year,
        mileage_policy: cli.mileage_policy.into(),
        projection_end_year: cli.projection_end_year,
    })
}

/// Runs one valuation from command line arguments and renders it.
pub fn run_cli<I, T>(args: I, config: &ValuationConfig) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    Ok(e.render().to_string().trim_end().to_string())
                }
                _ => Err(e.render().to_string().trim_end().to_string()),
            };
        }
    };
    let inputs = build_inputs(&cli, clock_year()).map_err(|e| format!("error: {e}"))?;
    let result = evaluate(&inputs, config).map_err(|e| format!("error: {e}"))?;

    if cli.json {
        serde_json::to_string_pretty(&build_evaluate_response(&inputs, result))
            .map_err(|e| format!("failed to encode result: {e}"))
    } else {
        Ok(render_summary(&inputs, &result))
    }
}

fn render_summary(inputs: &ValuationInputs, result: &ValuationResult) -> String {
    let mut lines = vec![
        format!("How good is the price? {}", result.rating_label()),
        format!(
            "Calculated Market Value Today: {}",
            format_pounds(result.market_value)
        ),
        format!(
            "Depreciation per year since purchase: {}",
            format_pounds(result.per_year_depreciation)
        ),
        format!(
            "Depreciation per month since purchase: {}",
            format_pounds(result.per_month_depreciation)
        ),
    ];
    if let Some(end) = result.projection.as_ref().and_then(ValueCurve::terminal) {
        lines.push(format!(
            "Projected value in {} at {:.0} mi/year: {}",
            end.year,
            inputs.annual_mileage,
            format_pounds(end.value)
        ));
    }
    lines.join("\n")
}

fn format_pounds(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-£{grouped}")
    } else {
        format!("£{grouped}")
    }
}

pub async fn run_http_server(port: u16, config: Arc<ValuationConfig>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/config", get(config_handler))
        .route(
            "/api/evaluate",
            get(evaluate_get_handler).post(evaluate_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(config);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "van valuation API listening");
    info!("Local access: http://127.0.0.1:{port}/api/evaluate");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn config_handler(State(config): State<Arc<ValuationConfig>>) -> Response {
    json_response(StatusCode::OK, config.as_ref())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn evaluate_get_handler(
    State(config): State<Arc<ValuationConfig>>,
    Query(payload): Query<EvaluatePayload>,
) -> Response {
    evaluate_handler_impl(&config, payload)
}

async fn evaluate_post_handler(
    State(config): State<Arc<ValuationConfig>>,
    Json(payload): Json<EvaluatePayload>,
) -> Response {
    evaluate_handler_impl(&config, payload)
}

fn evaluate_handler_impl(config: &ValuationConfig, payload: EvaluatePayload) -> Response {
    let inputs = match inputs_from_payload(payload, clock_year()) {
        Ok(inputs) => inputs,
        Err(msg) => {
            warn!(error = %msg, "rejected evaluation request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match evaluate(&inputs, config) {
        Ok(result) => json_response(StatusCode::OK, build_evaluate_response(&inputs, result)),
        Err(e) => {
            warn!(error = %e, "valuation failed");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn inputs_from_json(json: &str, clock_year: i32) -> Result<ValuationInputs, String> {
    let payload = serde_json::from_str::<EvaluatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload, clock_year)
}

/// Advert fields are mandatory and never defaulted; the rest fall back to the
/// command line defaults.
fn inputs_from_payload(payload: EvaluatePayload, clock_year: i32) -> Result<ValuationInputs, String> {
    let condition = payload
        .condition
        .as_deref()
        .map(str::parse::<ConditionCategory>)
        .transpose()
        .map_err(|e| e.to_string())?;
    let advert = AdvertRecord {
        year: payload.registration_year,
        price: payload.advert_price,
        mileage: payload.advert_mileage,
        condition,
    }
    .require()
    .map_err(|e| e.to_string())?;

    let mut cli = default_cli_for_api();
    cli.registration_year = advert.registration_year;
    cli.advert_price = advert.price;
    cli.advert_mileage = advert.mileage;
    cli.condition = advert.condition.into();

    if let Some(v) = payload.anchor_price {
        cli.anchor_price = v;
    }
    if let Some(v) = payload.annual_mileage {
        cli.annual_mileage = v;
    }
    if let Some(v) = payload.mileage_policy {
        cli.mileage_policy = v.into();
    }
    cli.current_year = payload.current_year;
    cli.projection_end_year = payload.projection_end_year;

    build_inputs(&cli, clock_year)
}

fn default_cli_for_api() -> Cli {
    Cli {
        registration_year: 2018,
        anchor_price: 30_000.0,
        advert_price: 15_000.0,
        advert_mileage: 50_000.0,
        annual_mileage: 10_000.0,
        condition: CliConditionCategory::None,
        current_year: None,
        mileage_policy: CliMileagePolicy::AdvertLinear,
        projection_end_year: None,
        json: true,
    }
}

fn build_evaluate_response(inputs: &ValuationInputs, result: ValuationResult) -> EvaluateResponse {
    let chart = match &result.projection {
        Some(projection) => result.curve.chain(projection),
        None => result.curve.clone(),
    };
    EvaluateResponse {
        current_year: inputs.current_year,
        mileage_policy: inputs.mileage_policy,
        condition: inputs.condition,
        rating_label: result.rating_label(),
        result,
        chart,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PriceRating;

    const EPS: f64 = 1e-6;
    const CLOCK_YEAR: i32 = 2025;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn build_inputs_defaults_current_year_to_clock() {
        let inputs = build_inputs(&sample_cli(), CLOCK_YEAR).expect("valid inputs");
        assert_eq!(inputs.current_year, CLOCK_YEAR);
        assert_eq!(inputs.mileage_policy, MileagePolicy::AdvertLinear);
        assert_eq!(inputs.condition, ConditionCategory::None);
    }

    #[test]
    fn build_inputs_prefers_explicit_current_year() {
        let mut cli = sample_cli();
        cli.current_year = Some(2022);
        let inputs = build_inputs(&cli, CLOCK_YEAR).expect("valid inputs");
        assert_eq!(inputs.current_year, 2022);
    }

    #[test]
    fn build_inputs_rejects_future_registration() {
        let mut cli = sample_cli();
        cli.registration_year = CLOCK_YEAR + 1;
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("registration after valuation year");
        assert!(err.contains("--registration-year"));
    }

    #[test]
    fn build_inputs_rejects_non_positive_annual_mileage() {
        let mut cli = sample_cli();
        cli.annual_mileage = 0.0;
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("zero annual mileage");
        assert!(err.contains("--annual-mileage"));
    }

    #[test]
    fn build_inputs_rejects_projection_not_after_current_year() {
        let mut cli = sample_cli();
        cli.projection_end_year = Some(CLOCK_YEAR);
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("projection must look ahead");
        assert!(err.contains("--projection-end-year"));
    }

    #[test]
    fn inputs_from_json_parses_web_keys() {
        let json = r#"{
          "registrationYear": 2019,
          "advertPrice": 14500,
          "advertMileage": 42000,
          "condition": "cat-n",
          "anchorPrice": 32000,
          "annualMileage": 12000,
          "currentYear": 2024,
          "mileagePolicy": "annual-ratio",
          "projectionEndYear": 2030
        }"#;
        let inputs = inputs_from_json(json, CLOCK_YEAR).expect("json should parse");

        assert_eq!(inputs.registration_year, 2019);
        assert_approx(inputs.advert_price, 14_500.0);
        assert_approx(inputs.advert_mileage, 42_000.0);
        assert_eq!(inputs.condition, ConditionCategory::NonStructuralWriteOff);
        assert_approx(inputs.anchor_price, 32_000.0);
        assert_approx(inputs.annual_mileage, 12_000.0);
        assert_eq!(inputs.current_year, 2024);
        assert_eq!(inputs.mileage_policy, MileagePolicy::AnnualRatio);
        assert_eq!(inputs.projection_end_year, Some(2030));
    }

    #[test]
    fn inputs_from_json_accepts_policy_aliases() {
        let json = r#"{
          "registrationYear": 2019,
          "advertPrice": 14500,
          "advertMileage": 42000,
          "mileagePolicy": "ratio"
        }"#;
        let inputs = inputs_from_json(json, CLOCK_YEAR).expect("json should parse");
        assert_eq!(inputs.mileage_policy, MileagePolicy::AnnualRatio);
        assert_eq!(inputs.condition, ConditionCategory::None);
        assert_approx(inputs.anchor_price, 30_000.0);
    }

    #[test]
    fn inputs_from_json_rejects_partial_advert() {
        let json = r#"{ "advertPrice": 14500 }"#;
        let err = inputs_from_json(json, CLOCK_YEAR).expect_err("year and mileage missing");
        assert_eq!(err, "incomplete input: missing year, mileage");
    }

    #[test]
    fn inputs_from_json_rejects_unknown_condition() {
        let json = r#"{
          "registrationYear": 2019,
          "advertPrice": 14500,
          "advertMileage": 42000,
          "condition": "flood"
        }"#;
        let err = inputs_from_json(json, CLOCK_YEAR).expect_err("unknown category");
        assert!(err.contains("unknown condition category"));
    }

    #[test]
    fn response_chart_joins_history_and_projection() {
        let json = r#"{
          "registrationYear": 2018,
          "advertPrice": 15000,
          "advertMileage": 10000,
          "projectionEndYear": 2030
        }"#;
        let inputs = inputs_from_json(json, CLOCK_YEAR).expect("json should parse");
        let result = evaluate(&inputs, &ValuationConfig::default()).expect("valid evaluation");
        let response = build_evaluate_response(&inputs, result);

        assert_eq!(response.chart.len(), 8 + 5);
        assert_eq!(response.result.rating, PriceRating::Poor);
        assert_eq!(response.rating_label, "Poor (+12.9%)");

        let body = serde_json::to_value(&response).expect("serializable");
        assert_eq!(body["rating"], "poor");
        assert_eq!(body["condition"], "none");
        assert_eq!(body["mileagePolicy"], "advert-linear");
        assert_eq!(body["curve"][0]["year"], 2018);
        assert!(body["marketValue"].as_f64().is_some());
        assert_eq!(body["chart"].as_array().map(Vec::len), Some(13));
    }

    #[test]
    fn summary_matches_report_lines() {
        let mut cli = sample_cli();
        cli.advert_mileage = 10_000.0;
        cli.projection_end_year = Some(2027);
        let inputs = build_inputs(&cli, CLOCK_YEAR).expect("valid inputs");
        let result = evaluate(&inputs, &ValuationConfig::default()).expect("valid evaluation");
        let summary = render_summary(&inputs, &result);

        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "How good is the price? Poor (+12.9%)");
        assert_eq!(lines[1], "Calculated Market Value Today: £13,291");
        assert_eq!(lines[2], "Depreciation per year since purchase: £2,387");
        assert_eq!(lines[3], "Depreciation per month since purchase: £199");
        assert!(lines[4].starts_with("Projected value in 2027 at 10000 mi/year: £"));
    }

    #[test]
    fn run_cli_renders_json_when_asked() {
        let output = run_cli(
            [
                "van-value",
                "--registration-year",
                "2018",
                "--advert-price",
                "15000",
                "--advert-mileage",
                "10000",
                "--current-year",
                "2025",
                "--condition",
                "cat-s",
                "--json",
            ],
            &ValuationConfig::default(),
        )
        .expect("valid run");
        let body: serde_json::Value = serde_json::from_str(&output).expect("json output");
        assert_eq!(body["condition"], "structural-write-off");
        assert_eq!(body["currentYear"], 2025);
        let market = body["marketValue"].as_f64().expect("number");
        assert_approx(market, 13_291.131_037_5 * 0.75);
    }

    #[test]
    fn run_cli_surfaces_core_errors() {
        let err = run_cli(
            [
                "van-value",
                "--registration-year",
                "2018",
                "--advert-price",
                "15000",
                "--advert-mileage",
                "250000",
                "--current-year",
                "2025",
            ],
            &ValuationConfig::default(),
        )
        .expect_err("mileage multiplier goes negative");
        assert!(err.contains("mileage multiplier"));
    }

    #[test]
    fn run_cli_returns_flag_errors_instead_of_exiting() {
        let err = run_cli(
            ["van-value", "--registration-year", "2018", "--bogus"],
            &ValuationConfig::default(),
        )
        .expect_err("unknown flag");
        assert!(err.contains("--bogus"), "unexpected error: {err}");

        let err = run_cli(["van-value"], &ValuationConfig::default())
            .expect_err("required flags missing");
        assert!(err.contains("--registration-year"), "unexpected error: {err}");
    }

    #[test]
    fn run_cli_help_is_not_an_error() {
        let help = run_cli(["van-value", "--help"], &ValuationConfig::default())
            .expect("help renders");
        assert!(help.contains("Usage:"));
        assert!(help.contains("--advert-mileage"));
    }

    #[test]
    fn build_inputs_rejects_implausible_years() {
        let mut cli = sample_cli();
        cli.registration_year = -2_000_000_000;
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("registration far in the past");
        assert!(err.contains("--registration-year must be between 1900 and 2100"));

        let mut cli = sample_cli();
        cli.current_year = Some(i32::MAX);
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("current year out of range");
        assert!(err.contains("--current-year"));

        let mut cli = sample_cli();
        cli.projection_end_year = Some(9_999);
        let err = build_inputs(&cli, CLOCK_YEAR).expect_err("projection too far ahead");
        assert!(err.contains("--projection-end-year"));
    }

    #[test]
    fn inputs_from_json_rejects_huge_year_span() {
        let json = r#"{
          "registrationYear": -2000000000,
          "advertPrice": 14500,
          "advertMileage": 42000
        }"#;
        let err = inputs_from_json(json, CLOCK_YEAR).expect_err("span too large");
        assert!(err.contains("--registration-year"));
    }

    #[test]
    fn format_pounds_groups_thousands() {
        assert_eq!(format_pounds(0.4), "£0");
        assert_eq!(format_pounds(999.6), "£1,000");
        assert_eq!(format_pounds(1_234_567.0), "£1,234,567");
        assert_eq!(format_pounds(-2_500.0), "-£2,500");
    }

    #[test]
    fn condition_round_trips_through_cli_enum() {
        for category in [
            ConditionCategory::None,
            ConditionCategory::NonStructuralWriteOff,
            ConditionCategory::StructuralWriteOff,
        ] {
            let cli: CliConditionCategory = category.into();
            assert_eq!(ConditionCategory::from(cli), category);
        }
    }
}
