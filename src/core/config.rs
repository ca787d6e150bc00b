use serde::{Deserialize, Serialize};

use super::error::{PlanError, Result};
use super::types::MarketParameters;

/// Fewest Monte Carlo paths accepted; smaller requests are raised to this.
pub const MIN_SIMULATION_PATHS: u32 = 500;
pub const MAX_SIMULATION_PATHS: u32 = 100_000;
/// Longest planning or goal horizon accepted at the boundary; the engine truncates beyond it.
pub const MAX_HORIZON_YEARS: u32 = 120;
pub const MAX_TIMELINE_EXTENSION_MONTHS: u32 = 1_200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketBounds {
    pub mu_min: f64,
    pub mu_max: f64,
    pub sigma_min: f64,
    pub sigma_max: f64,
}

impl Default for MarketBounds {
    fn default() -> Self {
        Self {
            mu_min: 0.05,
            mu_max: 0.25,
            sigma_min: 0.10,
            sigma_max: 0.40,
        }
    }
}

impl MarketBounds {
    /// Clamps collaborator-supplied parameters into range; NaN falls to the lower bound.
    pub fn clamp(&self, market: MarketParameters) -> MarketParameters {
        MarketParameters {
            mu: clamp_or_min(market.mu, self.mu_min, self.mu_max),
            sigma: clamp_or_min(market.sigma, self.sigma_min, self.sigma_max),
        }
    }
}

fn clamp_or_min(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// How the household's recurring contribution is shared between goals.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationPolicy {
    EqualSplit,
    /// Earlier goals in the list receive a larger share (weights n, n-1, ..., 1).
    PriorityWeighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalSolverConfig {
    /// Target success probability in percent.
    pub confidence_threshold: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub max_bracket_doublings: u32,
    pub max_timeline_extension_months: u32,
}

impl Default for GoalSolverConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 90.0,
            tolerance: 1.0,
            max_iterations: 60,
            max_bracket_doublings: 48,
            max_timeline_extension_months: 360,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FitnessWeights {
    pub merton_fraction: f64,
    pub goal_success: f64,
    pub quality: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            merton_fraction: 40.0,
            goal_success: 0.4,
            quality: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub paths: u32,
    /// `None` draws a fresh seed per orchestrator session.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            paths: 1_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn effective_paths(&self) -> u32 {
        self.paths.clamp(MIN_SIMULATION_PATHS, MAX_SIMULATION_PATHS)
    }
}

/// Policy constants for one engine instance. Every value has a documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tax_rate: f64,
    pub risk_free_rate: f64,
    pub discount_rate: f64,
    pub replacement_ratio: f64,
    pub retirement_years: u32,
    pub market_bounds: MarketBounds,
    pub sentiment_tilt_scale: f64,
    pub return_floor: f64,
    pub invest_fraction_cap: f64,
    pub goal_solver: GoalSolverConfig,
    pub allocation_policy: AllocationPolicy,
    pub fitness_weights: FitnessWeights,
    pub simulation: SimulationConfig,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.30,
            risk_free_rate: 0.04,
            discount_rate: 0.04,
            replacement_ratio: 0.70,
            retirement_years: 25,
            market_bounds: MarketBounds::default(),
            sentiment_tilt_scale: 0.02,
            return_floor: 0.05,
            invest_fraction_cap: 0.95,
            goal_solver: GoalSolverConfig::default(),
            allocation_policy: AllocationPolicy::EqualSplit,
            fitness_weights: FitnessWeights::default(),
            simulation: SimulationConfig::default(),
            cache_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.tax_rate) {
            return Err(PlanError::invalid_config("taxRate must be between 0 and 1"));
        }
        if !self.risk_free_rate.is_finite() || !(0.0..1.0).contains(&self.risk_free_rate) {
            return Err(PlanError::invalid_config("riskFreeRate must be in [0, 1)"));
        }
        if !self.discount_rate.is_finite() || !(0.0..1.0).contains(&self.discount_rate) {
            return Err(PlanError::invalid_config("discountRate must be in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.replacement_ratio) {
            return Err(PlanError::invalid_config(
                "replacementRatio must be between 0 and 1",
            ));
        }
        let b = &self.market_bounds;
        if !(b.mu_min <= b.mu_max && b.sigma_min > 0.0 && b.sigma_min <= b.sigma_max) {
            return Err(PlanError::invalid_config(
                "marketBounds must satisfy muMin <= muMax and 0 < sigmaMin <= sigmaMax",
            ));
        }
        if !self.sentiment_tilt_scale.is_finite() || self.sentiment_tilt_scale < 0.0 {
            return Err(PlanError::invalid_config("sentimentTiltScale must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.invest_fraction_cap) {
            return Err(PlanError::invalid_config(
                "investFractionCap must be between 0 and 1",
            ));
        }
        let g = &self.goal_solver;
        if !(0.0..=100.0).contains(&g.confidence_threshold) {
            return Err(PlanError::invalid_config(
                "goalSolver.confidenceThreshold must be between 0 and 100",
            ));
        }
        if !g.tolerance.is_finite() || g.tolerance <= 0.0 {
            return Err(PlanError::invalid_config("goalSolver.tolerance must be > 0"));
        }
        if g.max_iterations == 0 {
            return Err(PlanError::invalid_config(
                "goalSolver.maxIterations must be > 0",
            ));
        }
        if g.max_timeline_extension_months > MAX_TIMELINE_EXTENSION_MONTHS {
            return Err(PlanError::invalid_config(format!(
                "goalSolver.maxTimelineExtensionMonths must be <= {MAX_TIMELINE_EXTENSION_MONTHS}"
            )));
        }
        if self.simulation.paths > MAX_SIMULATION_PATHS {
            return Err(PlanError::invalid_config(format!(
                "simulation.paths must be <= {MAX_SIMULATION_PATHS}"
            )));
        }
        if self.cache_capacity == 0 {
            return Err(PlanError::invalid_config("cacheCapacity must be > 0"));
        }
        Ok(())
    }
}
