use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    AllocationPolicy, AssetCategory, BehavioralStats, DrawdownReaction, EmergencyRunway,
    EngineConfig, Evaluation, FinancialGoal, GoalCategory, GrowthPreference, HouseholdState,
    Impact, MarketParameters, NewsItem, Orchestrator, PlanError, PortfolioAsset, RiskAnswers,
    SavingsHorizon, Sentiment,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliDrawdownReaction {
    Withdraw,
    WaitAndSee,
    HoldCalm,
    BuyMore,
}

impl From<CliDrawdownReaction> for DrawdownReaction {
    fn from(value: CliDrawdownReaction) -> Self {
        match value {
            CliDrawdownReaction::Withdraw => DrawdownReaction::Withdraw,
            CliDrawdownReaction::WaitAndSee => DrawdownReaction::WaitAndSee,
            CliDrawdownReaction::HoldCalm => DrawdownReaction::HoldCalm,
            CliDrawdownReaction::BuyMore => DrawdownReaction::BuyMore,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGrowthPreference {
    Steady,
    Balanced,
    HighGrowth,
}

impl From<CliGrowthPreference> for GrowthPreference {
    fn from(value: CliGrowthPreference) -> Self {
        match value {
            CliGrowthPreference::Steady => GrowthPreference::Steady,
            CliGrowthPreference::Balanced => GrowthPreference::Balanced,
            CliGrowthPreference::HighGrowth => GrowthPreference::HighGrowth,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliEmergencyRunway {
    UnderOneMonth,
    OneToThreeMonths,
    ThreeToSixMonths,
    OverSixMonths,
}

impl From<CliEmergencyRunway> for EmergencyRunway {
    fn from(value: CliEmergencyRunway) -> Self {
        match value {
            CliEmergencyRunway::UnderOneMonth => EmergencyRunway::UnderOneMonth,
            CliEmergencyRunway::OneToThreeMonths => EmergencyRunway::OneToThreeMonths,
            CliEmergencyRunway::ThreeToSixMonths => EmergencyRunway::ThreeToSixMonths,
            CliEmergencyRunway::OverSixMonths => EmergencyRunway::OverSixMonths,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSavingsHorizon {
    UnderThreeYears,
    ThreeToTenYears,
    OverTenYears,
}

impl From<CliSavingsHorizon> for SavingsHorizon {
    fn from(value: CliSavingsHorizon) -> Self {
        match value {
            CliSavingsHorizon::UnderThreeYears => SavingsHorizon::UnderThreeYears,
            CliSavingsHorizon::ThreeToTenYears => SavingsHorizon::ThreeToTenYears,
            CliSavingsHorizon::OverTenYears => SavingsHorizon::OverTenYears,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliAllocationPolicy {
    EqualSplit,
    PriorityWeighted,
}

impl From<CliAllocationPolicy> for AllocationPolicy {
    fn from(value: CliAllocationPolicy) -> Self {
        match value {
            CliAllocationPolicy::EqualSplit => AllocationPolicy::EqualSplit,
            CliAllocationPolicy::PriorityWeighted => AllocationPolicy::PriorityWeighted,
        }
    }
}

impl From<AllocationPolicy> for CliAllocationPolicy {
    fn from(value: AllocationPolicy) -> Self {
        match value {
            AllocationPolicy::EqualSplit => CliAllocationPolicy::EqualSplit,
            AllocationPolicy::PriorityWeighted => CliAllocationPolicy::PriorityWeighted,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EvaluatePayload {
    age: Option<u32>,
    target_age: Option<u32>,
    #[serde(alias = "salary")]
    monthly_salary: Option<f64>,
    monthly_expenses: Option<f64>,
    savings: Option<f64>,
    #[serde(alias = "lastContributionAmount")]
    monthly_contribution: Option<f64>,
    contribution_consistency: Option<f64>,
    streak: Option<u32>,
    risk_answers: Option<RiskAnswers>,
    goals: Option<Vec<FinancialGoal>>,

    expected_return: Option<f64>,
    volatility: Option<f64>,
    news: Option<Vec<NewsItem>>,
    held_assets: Option<Vec<PortfolioAsset>>,

    tax_rate: Option<f64>,
    confidence_threshold: Option<f64>,
    allocation_policy: Option<AllocationPolicy>,
    simulations: Option<u32>,
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "wealthplan",
    about = "Household wealth planner (Merton allocation + goal Monte Carlo + portfolio fitness)"
)]
struct Cli {
    #[arg(long)]
    age: u32,
    #[arg(long)]
    target_age: u32,
    #[arg(long, help = "Gross monthly salary")]
    monthly_salary: f64,
    #[arg(long, default_value_t = 0.0)]
    monthly_expenses: f64,
    #[arg(long, default_value_t = 0.0, help = "Current savings and investments")]
    savings: f64,
    #[arg(long, default_value_t = 0.0, help = "Recurring monthly investment (SIP)")]
    monthly_contribution: f64,
    #[arg(long, default_value_t = 0.0, help = "Share of months with a contribution, 0-1")]
    contribution_consistency: f64,
    #[arg(long, default_value_t = 0)]
    streak: u32,

    #[arg(long, value_enum)]
    drawdown_reaction: Option<CliDrawdownReaction>,
    #[arg(long, value_enum)]
    growth_preference: Option<CliGrowthPreference>,
    #[arg(long, value_enum)]
    emergency_runway: Option<CliEmergencyRunway>,
    #[arg(long, value_enum)]
    savings_horizon: Option<CliSavingsHorizon>,

    #[arg(
        long = "goal",
        value_parser = parse_goal,
        help = "id:label:category:target:years:inflation%, e.g. home:Dream Home:housing:2500000:12:6"
    )]
    goals: Vec<FinancialGoal>,
    #[arg(
        long = "news",
        value_parser = parse_news,
        help = "sentiment:impact, e.g. positive:high"
    )]
    news: Vec<NewsItem>,
    #[arg(
        long = "asset",
        value_parser = parse_asset,
        help = "name:category:value, e.g. Index Fund:equity:500000"
    )]
    assets: Vec<PortfolioAsset>,

    #[arg(long, default_value_t = 10.0, help = "Expected annual market return in percent")]
    expected_return: f64,
    #[arg(long, default_value_t = 18.0, help = "Annual market volatility in percent")]
    volatility: f64,
    #[arg(long, default_value_t = 30.0, help = "Flat income tax rate in percent")]
    tax_rate: f64,
    #[arg(long, default_value_t = 4.0, help = "Risk-free rate in percent")]
    risk_free_rate: f64,
    #[arg(long, default_value_t = 4.0, help = "Human capital discount rate in percent")]
    discount_rate: f64,
    #[arg(
        long,
        default_value_t = 70.0,
        help = "Retirement income as a percent of current net income"
    )]
    replacement_ratio: f64,
    #[arg(long, default_value_t = 25)]
    retirement_years: u32,
    #[arg(
        long,
        default_value_t = 90.0,
        help = "Goal success probability to solve for, in percent"
    )]
    confidence_threshold: f64,
    #[arg(long, value_enum, default_value_t = CliAllocationPolicy::EqualSplit)]
    allocation_policy: CliAllocationPolicy,
    #[arg(long, default_value_t = 1000)]
    simulations: u32,
    #[arg(long)]
    seed: Option<u64>,
}

/// Fully validated inputs for one evaluation.
#[derive(Debug, Clone, PartialEq)]
struct EvaluateRequest {
    state: HouseholdState,
    market: MarketParameters,
    news: Vec<NewsItem>,
    held_assets: Option<Vec<PortfolioAsset>>,
    config: EngineConfig,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn split_fields<'a>(raw: &'a str, expected: usize, shape: &str) -> Result<Vec<&'a str>, String> {
    let fields: Vec<&str> = raw.split(':').map(str::trim).collect();
    if fields.len() != expected {
        return Err(format!("expected {shape}, got `{raw}`"));
    }
    Ok(fields)
}

fn parse_number(raw: &str, what: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("{what} must be a number, got `{raw}`"))
}

fn parse_goal(raw: &str) -> Result<FinancialGoal, String> {
    let f = split_fields(raw, 6, "id:label:category:target:years:inflation%")?;
    let category = match f[2].to_ascii_lowercase().as_str() {
        "housing" => GoalCategory::Housing,
        "education" => GoalCategory::Education,
        "legacy" => GoalCategory::Legacy,
        "retirement" => GoalCategory::Retirement,
        other => return Err(format!("unknown goal category `{other}`")),
    };
    let years_away = f[4]
        .parse::<u32>()
        .map_err(|_| format!("goal years must be a whole number, got `{}`", f[4]))?;
    Ok(FinancialGoal {
        id: f[0].to_string(),
        label: f[1].to_string(),
        category,
        target_amount: parse_number(f[3], "goal target")?,
        years_away,
        inflation_rate: parse_number(f[5], "goal inflation")? / 100.0,
    })
}

fn parse_news(raw: &str) -> Result<NewsItem, String> {
    let f = split_fields(raw, 2, "sentiment:impact")?;
    let sentiment = match f[0].to_ascii_lowercase().as_str() {
        "positive" => Sentiment::Positive,
        "neutral" => Sentiment::Neutral,
        "negative" => Sentiment::Negative,
        other => return Err(format!("unknown sentiment `{other}`")),
    };
    let impact = match f[1].to_ascii_lowercase().as_str() {
        "low" => Impact::Low,
        "medium" => Impact::Medium,
        "high" => Impact::High,
        other => return Err(format!("unknown impact `{other}`")),
    };
    Ok(NewsItem {
        headline: String::new(),
        sentiment,
        impact,
    })
}

fn parse_asset(raw: &str) -> Result<PortfolioAsset, String> {
    let f = split_fields(raw, 3, "name:category:value")?;
    let category = match f[1].to_ascii_lowercase().as_str() {
        "equity" => AssetCategory::Equity,
        "debt" => AssetCategory::Debt,
        "cash" => AssetCategory::Cash,
        other => return Err(format!("unknown asset category `{other}`")),
    };
    Ok(PortfolioAsset {
        name: f[0].to_string(),
        value: parse_number(f[2], "asset value")?,
        category,
    })
}

fn build_request(cli: Cli) -> Result<EvaluateRequest, PlanError> {
    if !cli.expected_return.is_finite() || !cli.volatility.is_finite() || cli.volatility < 0.0 {
        return Err(PlanError::InvalidPayload(
            "--expected-return and --volatility must be finite, volatility >= 0".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&cli.contribution_consistency) {
        return Err(PlanError::invalid_household(
            "contributionConsistency",
            "must be between 0 and 1",
        ));
    }
    if cli.simulations == 0 {
        return Err(PlanError::invalid_config("--simulations must be > 0"));
    }

    let mut config = EngineConfig {
        tax_rate: cli.tax_rate / 100.0,
        risk_free_rate: cli.risk_free_rate / 100.0,
        discount_rate: cli.discount_rate / 100.0,
        replacement_ratio: cli.replacement_ratio / 100.0,
        retirement_years: cli.retirement_years,
        allocation_policy: cli.allocation_policy.into(),
        ..EngineConfig::default()
    };
    config.goal_solver.confidence_threshold = cli.confidence_threshold;
    config.simulation.paths = cli.simulations;
    config.simulation.seed = cli.seed;
    config.validate()?;

    let state = HouseholdState {
        age: cli.age,
        target_age: cli.target_age,
        monthly_salary: cli.monthly_salary,
        monthly_expenses: cli.monthly_expenses,
        savings: cli.savings,
        risk_answers: RiskAnswers {
            drawdown_reaction: cli.drawdown_reaction.map(Into::into),
            growth_preference: cli.growth_preference.map(Into::into),
            emergency_runway: cli.emergency_runway.map(Into::into),
            savings_horizon: cli.savings_horizon.map(Into::into),
        },
        behavioral: BehavioralStats {
            monthly_contribution: cli.monthly_contribution,
            contribution_consistency: cli.contribution_consistency,
            streak: cli.streak,
        },
        goals: cli.goals,
    };
    state.validate()?;

    Ok(EvaluateRequest {
        state,
        market: MarketParameters {
            mu: cli.expected_return / 100.0,
            sigma: cli.volatility / 100.0,
        },
        news: cli.news,
        held_assets: (!cli.assets.is_empty()).then_some(cli.assets),
        config,
    })
}

/// Parses process arguments, runs one evaluation, and renders it as pretty JSON.
pub fn run_cli() -> Result<String, PlanError> {
    let evaluation = evaluate_cli(Cli::parse())?;
    serde_json::to_string_pretty(evaluation.as_ref()).map_err(|e| PlanError::Encode(e.to_string()))
}

fn evaluate_cli(cli: Cli) -> Result<Arc<Evaluation>, PlanError> {
    let request = build_request(cli)?;
    let orchestrator = Orchestrator::new(request.config.clone())?;
    Ok(evaluate_with(&orchestrator, &request))
}

fn evaluate_with(orchestrator: &Orchestrator, request: &EvaluateRequest) -> Arc<Evaluation> {
    orchestrator.evaluate(
        &request.state,
        request.market,
        &request.news,
        request.held_assets.as_deref(),
    )
}

pub async fn run_http_server(port: u16) -> io::Result<()> {
    let orchestrator = Orchestrator::new(EngineConfig::default())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(orchestrator));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "wealthplan HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, app).await
}

/// `GET /api/evaluate` reads scalar overrides from the query string only; goals, news,
/// held assets and risk answers need the JSON body of `POST /api/evaluate`.
fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route(
            "/api/evaluate",
            get(evaluate_get_handler).post(evaluate_post_handler),
        )
        .route("/api/health", get(health_handler))
        .fallback(not_found_handler)
        .with_state(orchestrator)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

/// Scalar fields only: query strings cannot carry the nested or list-valued fields.
async fn evaluate_get_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(payload): Query<EvaluatePayload>,
) -> Response {
    evaluate_handler_impl(orchestrator, payload).await
}

async fn evaluate_post_handler(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<EvaluatePayload>,
) -> Response {
    evaluate_handler_impl(orchestrator, payload).await
}

async fn evaluate_handler_impl(shared: Arc<Orchestrator>, payload: EvaluatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    // Requests that change policy constants get a private engine and skip the shared cache.
    let outcome = tokio::task::spawn_blocking(move || {
        if request.config == *shared.config() {
            Ok(evaluate_with(&shared, &request))
        } else {
            Orchestrator::new(request.config.clone())
                .map(|private| evaluate_with(&private, &request))
        }
    })
    .await;

    match outcome {
        Ok(Ok(evaluation)) => json_response(StatusCode::OK, evaluation.as_ref()),
        Ok(Err(err)) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(join_err) => {
            error!(error = %join_err, "evaluation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Evaluation failed")
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
fn api_request_from_json(json: &str) -> Result<EvaluateRequest, PlanError> {
    let payload = serde_json::from_str::<EvaluatePayload>(json)
        .map_err(|e| PlanError::InvalidPayload(format!("invalid API JSON payload: {e}")))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: EvaluatePayload) -> Result<EvaluateRequest, PlanError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.age {
        cli.age = v;
    }
    if let Some(v) = payload.target_age {
        cli.target_age = v;
    }
    if let Some(v) = payload.monthly_salary {
        cli.monthly_salary = v;
    }
    if let Some(v) = payload.monthly_expenses {
        cli.monthly_expenses = v;
    }
    if let Some(v) = payload.savings {
        cli.savings = v;
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.contribution_consistency {
        cli.contribution_consistency = v;
    }
    if let Some(v) = payload.streak {
        cli.streak = v;
    }
    if let Some(v) = payload.goals {
        cli.goals = v;
    }

    if let Some(v) = payload.expected_return {
        cli.expected_return = v;
    }
    if let Some(v) = payload.volatility {
        cli.volatility = v;
    }
    if let Some(v) = payload.news {
        cli.news = v;
    }
    if let Some(v) = payload.held_assets {
        cli.assets = v;
    }

    if let Some(v) = payload.tax_rate {
        cli.tax_rate = v;
    }
    if let Some(v) = payload.confidence_threshold {
        cli.confidence_threshold = v;
    }
    if let Some(v) = payload.allocation_policy {
        cli.allocation_policy = v.into();
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if payload.seed.is_some() {
        cli.seed = payload.seed;
    }

    let mut request = build_request(cli)?;
    if let Some(answers) = payload.risk_answers {
        request.state.risk_answers = answers;
    }
    Ok(request)
}

fn default_cli_for_api() -> Cli {
    Cli {
        age: 28,
        target_age: 60,
        monthly_salary: 250_000.0,
        monthly_expenses: 120_000.0,
        savings: 1_000_000.0,
        monthly_contribution: 25_000.0,
        contribution_consistency: 1.0,
        streak: 0,
        drawdown_reaction: None,
        growth_preference: None,
        emergency_runway: None,
        savings_horizon: None,
        goals: vec![
            FinancialGoal {
                id: "home".to_string(),
                label: "Dream Home".to_string(),
                category: GoalCategory::Housing,
                target_amount: 25_000_000.0,
                years_away: 12,
                inflation_rate: 0.06,
            },
            FinancialGoal {
                id: "education".to_string(),
                label: "Kid's Education".to_string(),
                category: GoalCategory::Education,
                target_amount: 12_000_000.0,
                years_away: 15,
                inflation_rate: 0.10,
            },
        ],
        news: Vec::new(),
        assets: Vec::new(),
        expected_return: 10.0,
        volatility: 18.0,
        tax_rate: 30.0,
        risk_free_rate: 4.0,
        discount_rate: 4.0,
        replacement_ratio: 70.0,
        retirement_years: 25,
        confidence_threshold: 90.0,
        allocation_policy: AllocationPolicy::EqualSplit.into(),
        simulations: 1000,
        seed: None,
    }
}
