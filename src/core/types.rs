use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::config::MAX_HORIZON_YEARS;
use super::error::{PlanError, Result};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawdownReaction {
    #[serde(alias = "A")]
    Withdraw,
    #[serde(alias = "B")]
    WaitAndSee,
    #[serde(alias = "C")]
    HoldCalm,
    #[serde(alias = "D")]
    BuyMore,
}

impl DrawdownReaction {
    pub fn tolerance(self) -> f64 {
        match self {
            DrawdownReaction::Withdraw => 0.0,
            DrawdownReaction::WaitAndSee => 1.0 / 3.0,
            DrawdownReaction::HoldCalm => 2.0 / 3.0,
            DrawdownReaction::BuyMore => 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrowthPreference {
    #[serde(alias = "A")]
    Steady,
    #[serde(alias = "B")]
    Balanced,
    #[serde(alias = "C")]
    HighGrowth,
}

impl GrowthPreference {
    pub fn tolerance(self) -> f64 {
        match self {
            GrowthPreference::Steady => 0.0,
            GrowthPreference::Balanced => 0.5,
            GrowthPreference::HighGrowth => 1.0,
        }
    }
}

/// Months of expenses the household could cover after a job loss.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmergencyRunway {
    #[serde(alias = "A")]
    UnderOneMonth,
    #[serde(alias = "B")]
    OneToThreeMonths,
    #[serde(alias = "C")]
    ThreeToSixMonths,
    #[serde(alias = "D")]
    OverSixMonths,
}

impl EmergencyRunway {
    pub fn tolerance(self) -> f64 {
        match self {
            EmergencyRunway::UnderOneMonth => 0.0,
            EmergencyRunway::OneToThreeMonths => 1.0 / 3.0,
            EmergencyRunway::ThreeToSixMonths => 2.0 / 3.0,
            EmergencyRunway::OverSixMonths => 1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavingsHorizon {
    #[serde(alias = "A")]
    UnderThreeYears,
    #[serde(alias = "B")]
    ThreeToTenYears,
    #[serde(alias = "C")]
    OverTenYears,
}

impl SavingsHorizon {
    pub fn tolerance(self) -> f64 {
        match self {
            SavingsHorizon::UnderThreeYears => 0.0,
            SavingsHorizon::ThreeToTenYears => 0.5,
            SavingsHorizon::OverTenYears => 1.0,
        }
    }
}

/// Questionnaire responses. Unanswered questions stay `None` and score as neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskAnswers {
    #[serde(alias = "midnightTest")]
    pub drawdown_reaction: Option<DrawdownReaction>,
    #[serde(alias = "choiceOfPaths")]
    pub growth_preference: Option<GrowthPreference>,
    #[serde(alias = "safetyNet")]
    pub emergency_runway: Option<EmergencyRunway>,
    #[serde(alias = "goalHorizon")]
    pub savings_horizon: Option<SavingsHorizon>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BehavioralStats {
    /// Recurring monthly investment (SIP).
    #[serde(alias = "lastContributionAmount")]
    pub monthly_contribution: f64,
    pub contribution_consistency: f64,
    pub streak: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GoalCategory {
    Housing,
    Education,
    Legacy,
    Retirement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialGoal {
    pub id: String,
    pub label: String,
    #[serde(alias = "type")]
    pub category: GoalCategory,
    pub target_amount: f64,
    pub years_away: u32,
    pub inflation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdState {
    pub age: u32,
    pub target_age: u32,
    /// Gross monthly salary.
    #[serde(alias = "salary")]
    pub monthly_salary: f64,
    pub monthly_expenses: f64,
    pub savings: f64,
    #[serde(default)]
    pub risk_answers: RiskAnswers,
    #[serde(default)]
    pub behavioral: BehavioralStats,
    #[serde(default)]
    pub goals: Vec<FinancialGoal>,
}

impl HouseholdState {
    pub fn years_to_target(&self) -> u32 {
        self.target_age.saturating_sub(self.age)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_age <= self.age {
            return Err(PlanError::invalid_household(
                "targetAge",
                "must be greater than age",
            ));
        }
        if self.years_to_target() > MAX_HORIZON_YEARS {
            return Err(PlanError::invalid_household(
                "targetAge",
                format!("must be at most {MAX_HORIZON_YEARS} years after age"),
            ));
        }
        for (field, value) in [
            ("monthlySalary", self.monthly_salary),
            ("monthlyExpenses", self.monthly_expenses),
            ("savings", self.savings),
            ("monthlyContribution", self.behavioral.monthly_contribution),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanError::invalid_household(field, "must be a finite value >= 0"));
            }
        }

        let mut seen = HashSet::with_capacity(self.goals.len());
        for goal in &self.goals {
            if !seen.insert(goal.id.as_str()) {
                return Err(PlanError::DuplicateGoalId(goal.id.clone()));
            }
            if !goal.target_amount.is_finite() || goal.target_amount <= 0.0 {
                return Err(PlanError::invalid_goal(&goal.id, "targetAmount must be > 0"));
            }
            if goal.years_away > MAX_HORIZON_YEARS {
                return Err(PlanError::invalid_goal(
                    &goal.id,
                    format!("yearsAway must be <= {MAX_HORIZON_YEARS}"),
                ));
            }
            if !goal.inflation_rate.is_finite() || goal.inflation_rate <= -1.0 {
                return Err(PlanError::invalid_goal(&goal.id, "inflationRate must be > -100%"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketParameters {
    pub mu: f64,
    pub sigma: f64,
}

impl Default for MarketParameters {
    fn default() -> Self {
        Self {
            mu: 0.10,
            sigma: 0.18,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// Pre-labelled news item from the news collaborator. Only `sentiment` and `impact` are scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    #[serde(default)]
    pub headline: String,
    pub sentiment: Sentiment,
    pub impact: Impact,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AssetCategory {
    Equity,
    Debt,
    Cash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioAsset {
    pub name: String,
    pub value: f64,
    pub category: AssetCategory,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BreakdownSource {
    Manual,
    #[serde(alias = "Sentinel Sync")]
    Synced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioBreakdown {
    pub equity: f64,
    pub debt: f64,
    pub cash: f64,
    #[serde(default)]
    pub last_updated: Option<String>,
    pub source: BreakdownSource,
}

impl PortfolioBreakdown {
    pub fn from_assets(assets: &[PortfolioAsset], source: BreakdownSource) -> Self {
        let mut breakdown = Self {
            equity: 0.0,
            debt: 0.0,
            cash: 0.0,
            last_updated: None,
            source,
        };
        for asset in assets {
            if !asset.value.is_finite() || asset.value <= 0.0 {
                continue;
            }
            match asset.category {
                AssetCategory::Equity => breakdown.equity += asset.value,
                AssetCategory::Debt => breakdown.debt += asset.value,
                AssetCategory::Cash => breakdown.cash += asset.value,
            }
        }
        breakdown
    }

    pub fn total(&self) -> f64 {
        self.equity + self.debt + self.cash
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Persona {
    #[serde(rename = "Aggressive Growth Seeker")]
    AggressiveGrowthSeeker,
    #[serde(rename = "Growth Builder")]
    GrowthBuilder,
    #[serde(rename = "Balanced Guardian")]
    BalancedGuardian,
    #[serde(rename = "Conservative Steward")]
    ConservativeSteward,
    #[serde(rename = "Capital Preserver")]
    CapitalPreserver,
}

impl Persona {
    pub fn label(self) -> &'static str {
        match self {
            Persona::AggressiveGrowthSeeker => "Aggressive Growth Seeker",
            Persona::GrowthBuilder => "Growth Builder",
            Persona::BalancedGuardian => "Balanced Guardian",
            Persona::ConservativeSteward => "Conservative Steward",
            Persona::CapitalPreserver => "Capital Preserver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MertonOutput {
    pub risk_aversion: f64,
    pub merton_fraction: f64,
    pub human_capital: f64,
    pub safe_monthly_consumption: f64,
    pub savings_requirement: f64,
    pub persona: Persona,
    pub net_monthly_income: f64,
    pub tax_leakage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPercentiles {
    pub month: u32,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPoint {
    pub age: u32,
    pub human_capital: f64,
    pub financial_assets: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub goal_id: String,
    pub success_rate: f64,
    pub increase_monthly_contribution: f64,
    pub adjust_timeline_months: Option<u32>,
    pub future_target: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSlice {
    pub amount: f64,
    pub pct: f64,
}

/// Monthly consume / save / invest split of net income.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSplit {
    pub consume: AllocationSlice,
    pub invest: AllocationSlice,
    pub save: AllocationSlice,
    pub is_overspending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub adjusted_mu: f64,
    pub sentiment_tilt: f64,
    pub merton: MertonOutput,
    pub allocation: AllocationSplit,
    pub transition_map: Vec<TransitionPoint>,
    pub wealth_paths: Vec<MonthlyPercentiles>,
    pub prescriptions: Vec<Prescription>,
    pub quality_score: f64,
    pub average_goal_success: f64,
    pub fitness_score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> HouseholdState {
        HouseholdState {
            age: 30,
            target_age: 60,
            monthly_salary: 200_000.0,
            monthly_expenses: 80_000.0,
            savings: 1_000_000.0,
            risk_answers: RiskAnswers::default(),
            behavioral: BehavioralStats::default(),
            goals: vec![FinancialGoal {
                id: "home".to_string(),
                label: "Dream Home".to_string(),
                category: GoalCategory::Housing,
                target_amount: 5_000_000.0,
                years_away: 15,
                inflation_rate: 0.07,
            }],
        }
    }

    #[test]
    fn validate_accepts_sample_state() {
        assert!(sample_state().validate().is_ok());
    }

    #[test]
    fn validate_rejects_target_age_not_after_age() {
        let mut state = sample_state();
        state.target_age = 30;
        let err = state.validate().expect_err("must reject");
        assert!(err.to_string().contains("targetAge"));
    }

    #[test]
    fn validate_rejects_duplicate_goal_ids() {
        let mut state = sample_state();
        let dup = state.goals[0].clone();
        state.goals.push(dup);
        assert_eq!(
            state.validate(),
            Err(PlanError::DuplicateGoalId("home".to_string()))
        );
    }

    #[test]
    fn validate_rejects_horizons_beyond_cap() {
        let mut state = sample_state();
        state.target_age = state.age + MAX_HORIZON_YEARS;
        assert!(state.validate().is_ok());
        state.target_age = 1_000_000;
        let err = state.validate().expect_err("must reject");
        assert!(err.to_string().contains("targetAge"));

        let mut state = sample_state();
        state.goals[0].years_away = 400_000_000;
        let err = state.validate().expect_err("must reject");
        assert!(err.to_string().contains("yearsAway"));
    }

    #[test]
    fn validate_rejects_non_positive_goal_target() {
        let mut state = sample_state();
        state.goals[0].target_amount = 0.0;
        let err = state.validate().expect_err("must reject");
        assert!(err.to_string().contains("targetAmount"));
    }

    #[test]
    fn risk_answers_accept_letter_keys_and_legacy_field_names() {
        let answers: RiskAnswers = serde_json::from_str(
            r#"{"midnightTest":"D","choiceOfPaths":"C","safetyNet":null,"goalHorizon":"A"}"#,
        )
        .expect("valid answers");
        assert_eq!(answers.drawdown_reaction, Some(DrawdownReaction::BuyMore));
        assert_eq!(answers.growth_preference, Some(GrowthPreference::HighGrowth));
        assert_eq!(answers.emergency_runway, None);
        assert_eq!(answers.savings_horizon, Some(SavingsHorizon::UnderThreeYears));
    }

    #[test]
    fn breakdown_from_assets_skips_non_positive_values() {
        let assets = vec![
            PortfolioAsset {
                name: "Index fund".to_string(),
                value: 600.0,
                category: AssetCategory::Equity,
            },
            PortfolioAsset {
                name: "Bond".to_string(),
                value: 300.0,
                category: AssetCategory::Debt,
            },
            PortfolioAsset {
                name: "Bad row".to_string(),
                value: -50.0,
                category: AssetCategory::Cash,
            },
        ];
        let breakdown = PortfolioBreakdown::from_assets(&assets, BreakdownSource::Manual);
        assert_eq!(breakdown.equity, 600.0);
        assert_eq!(breakdown.debt, 300.0);
        assert_eq!(breakdown.cash, 0.0);
        assert_eq!(breakdown.total(), 900.0);
    }

    #[test]
    fn persona_serializes_as_label() {
        let json = serde_json::to_string(&Persona::BalancedGuardian).expect("serializes");
        assert_eq!(json, "\"Balanced Guardian\"");
        assert_eq!(Persona::BalancedGuardian.label(), "Balanced Guardian");
    }
}
