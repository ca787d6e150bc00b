mod config;
mod error;
mod factor;
mod goal;
mod merton;
mod monte_carlo;
mod orchestrator;
mod sentiment;
mod tax;
mod types;

pub use config::{
    AllocationPolicy, EngineConfig, FitnessWeights, GoalSolverConfig, MIN_SIMULATION_PATHS,
    MarketBounds, SimulationConfig,
};
pub use error::{PlanError, Result};
pub use factor::{CategoryMix, NEUTRAL_QUALITY_SCORE, score, score_breakdown, score_mix, target_mix};
pub use goal::{
    GoalAssumptions, allocate_contributions, average_success, calculate_goal_gap, future_target,
    success_probability,
};
pub use merton::{
    GAMMA_MAX, GAMMA_MIN, allocation_split, annuity_factor, calculate, human_capital,
    merton_fraction, persona, risk_aversion,
};
pub use monte_carlo::{GbmMonteCarlo, SimulationRequest, WealthSimulator, run_monte_carlo};
pub use orchestrator::{Orchestrator, fitness_score};
pub use sentiment::{adjust_return, tilt};
pub use tax::{FlatRateTax, TaxBreakdown, TaxModel};
pub use types::{
    AllocationSlice, AllocationSplit, AssetCategory, BehavioralStats, BreakdownSource,
    DrawdownReaction, EmergencyRunway, Evaluation, FinancialGoal, GoalCategory, GrowthPreference,
    HouseholdState, Impact, MarketParameters, MertonOutput, MonthlyPercentiles, NewsItem, Persona,
    PortfolioAsset, PortfolioBreakdown, Prescription, RiskAnswers, SavingsHorizon, Sentiment,
    TransitionPoint,
};
