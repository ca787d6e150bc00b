use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::config::{EngineConfig, FitnessWeights, MAX_HORIZON_YEARS};
use super::error::{PlanError, Result};
use super::factor;
use super::goal::{self, GoalAssumptions};
use super::merton;
use super::monte_carlo::{GbmMonteCarlo, SimulationRequest, WealthSimulator, entropy_seed};
use super::sentiment;
use super::tax::FlatRateTax;
use super::types::{
    Evaluation, HouseholdState, MarketParameters, MonthlyPercentiles, NewsItem, PortfolioAsset,
    TransitionPoint,
};

#[derive(Serialize)]
struct CacheKey<'a> {
    state: &'a HouseholdState,
    market: MarketParameters,
    news: &'a [NewsItem],
    held_assets: Option<&'a [PortfolioAsset]>,
    seed: u64,
}

/// Runs every engine over one household snapshot and memoizes the result by input value.
pub struct Orchestrator<S: WealthSimulator = GbmMonteCarlo> {
    config: EngineConfig,
    tax: FlatRateTax,
    simulator: S,
    session_seed: u64,
    cache: Mutex<LruCache<String, Arc<Evaluation>>>,
}

impl Orchestrator<GbmMonteCarlo> {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_simulator(config, GbmMonteCarlo)
    }
}

impl<S: WealthSimulator> Orchestrator<S> {
    pub fn with_simulator(config: EngineConfig, simulator: S) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| PlanError::invalid_config("cacheCapacity must be > 0"))?;
        let session_seed = config.simulation.seed.unwrap_or_else(entropy_seed);
        Ok(Self {
            tax: FlatRateTax::new(config.tax_rate),
            config,
            simulator,
            session_seed,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn session_seed(&self) -> u64 {
        self.session_seed
    }

    pub fn evaluate(
        &self,
        state: &HouseholdState,
        market: MarketParameters,
        news: &[NewsItem],
        held_assets: Option<&[PortfolioAsset]>,
    ) -> Arc<Evaluation> {
        let market = self.config.market_bounds.clamp(market);
        let key = serde_json::to_string(&CacheKey {
            state,
            market,
            news,
            held_assets,
            seed: self.session_seed,
        });

        let key = match key {
            Ok(key) => key,
            Err(err) => {
                debug!(error = %err, "evaluation key not serializable; bypassing cache");
                return Arc::new(self.compute(state, market, news, held_assets));
            }
        };

        if let Some(hit) = self.cache.lock().get(&key) {
            debug!("evaluation cache hit");
            return Arc::clone(hit);
        }

        debug!(goals = state.goals.len(), news = news.len(), "evaluation cache miss");
        let evaluation = Arc::new(self.compute(state, market, news, held_assets));
        self.cache.lock().put(key, Arc::clone(&evaluation));
        evaluation
    }

    fn compute(
        &self,
        state: &HouseholdState,
        market: MarketParameters,
        news: &[NewsItem],
        held_assets: Option<&[PortfolioAsset]>,
    ) -> Evaluation {
        let config = &self.config;
        let sentiment_tilt = sentiment::tilt(news);
        let adjusted_mu = sentiment::adjust_return(
            market.mu,
            sentiment_tilt,
            config.sentiment_tilt_scale,
            config.return_floor,
        );

        let adjusted_market = MarketParameters {
            mu: adjusted_mu,
            sigma: market.sigma,
        };
        let merton = merton::calculate(state, adjusted_market, &self.tax, config);
        let allocation =
            merton::allocation_split(&merton, state.monthly_expenses, config.invest_fraction_cap);

        let years = state.years_to_target().clamp(1, MAX_HORIZON_YEARS);
        let contribution = state.behavioral.monthly_contribution;
        let wealth_paths = self.simulator.simulate(&SimulationRequest {
            initial_wealth: state.savings,
            years,
            mu: adjusted_mu,
            sigma: market.sigma,
            monthly_contribution: contribution,
            paths: config.simulation.effective_paths(),
            seed: Some(self.session_seed),
        });
        let transition_map = transition_map(
            state,
            years,
            merton.net_monthly_income,
            config.discount_rate,
            &wealth_paths,
        );

        let assumptions = GoalAssumptions {
            volatility: market.sigma,
            solver: config.goal_solver,
        };
        let shares =
            goal::allocate_contributions(contribution, state.goals.len(), config.allocation_policy);
        let prescriptions: Vec<_> = state
            .goals
            .iter()
            .zip(shares)
            .map(|(g, sip)| goal::calculate_goal_gap(g, sip, adjusted_mu, &assumptions))
            .collect();

        let quality_score = factor::score(merton.persona, held_assets);
        let average_goal_success = goal::average_success(&prescriptions);
        let fitness_score = fitness_score(
            merton.merton_fraction,
            average_goal_success,
            quality_score,
            &config.fitness_weights,
        );

        Evaluation {
            adjusted_mu,
            sentiment_tilt,
            merton,
            allocation,
            transition_map,
            wealth_paths,
            prescriptions,
            quality_score,
            average_goal_success,
            fitness_score,
        }
    }
}

/// One point per year from now to the target age: discounted future earnings against
/// median simulated wealth.
fn transition_map(
    state: &HouseholdState,
    years: u32,
    net_monthly_income: f64,
    discount_rate: f64,
    wealth_paths: &[MonthlyPercentiles],
) -> Vec<TransitionPoint> {
    let annual = net_monthly_income * 12.0;
    let remaining = state.years_to_target();
    (0..=years)
        .map(|i| TransitionPoint {
            age: state.age.saturating_add(i),
            human_capital: merton::human_capital(
                annual,
                remaining.saturating_sub(i),
                discount_rate,
            ),
            financial_assets: wealth_paths
                .get(i as usize * 12)
                .map_or(0.0, |row| row.p50),
        })
        .collect()
}

pub fn fitness_score(
    merton_fraction: f64,
    average_goal_success: f64,
    quality_score: f64,
    weights: &FitnessWeights,
) -> u32 {
    let raw = merton_fraction * weights.merton_fraction
        + average_goal_success * weights.goal_success
        + quality_score * weights.quality;
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monte_carlo::run_monte_carlo;
    use crate::core::types::{
        BehavioralStats, FinancialGoal, GoalCategory, Impact, RiskAnswers, Sentiment,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSimulator {
        calls: AtomicUsize,
    }

    impl WealthSimulator for CountingSimulator {
        fn simulate(&self, request: &SimulationRequest) -> Vec<MonthlyPercentiles> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            run_monte_carlo(request)
        }
    }

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.simulation.paths = 500;
        config.simulation.seed = Some(7);
        config
    }

    fn sample_state(monthly_contribution: f64) -> HouseholdState {
        HouseholdState {
            age: 30,
            target_age: 60,
            monthly_salary: 200_000.0,
            monthly_expenses: 80_000.0,
            savings: 1_000_000.0,
            risk_answers: RiskAnswers::default(),
            behavioral: BehavioralStats {
                monthly_contribution,
                contribution_consistency: 1.0,
                streak: 12,
            },
            goals: vec![FinancialGoal {
                id: "home".to_string(),
                label: "Home".to_string(),
                category: GoalCategory::Housing,
                target_amount: 5_000_000.0,
                years_away: 15,
                inflation_rate: 0.07,
            }],
        }
    }

    #[test]
    fn fitness_matches_weighted_sum() {
        assert_eq!(fitness_score(0.6, 75.0, 85.0, &FitnessWeights::default()), 71);
    }

    #[test]
    fn fitness_is_clamped_and_nan_safe() {
        let heavy = FitnessWeights {
            merton_fraction: 400.0,
            ..FitnessWeights::default()
        };
        assert_eq!(fitness_score(1.0, 100.0, 100.0, &heavy), 100);
        assert_eq!(
            fitness_score(f64::NAN, 0.0, 0.0, &FitnessWeights::default()),
            0
        );
    }

    #[test]
    fn more_sip_improves_goal_success_end_to_end() {
        let orchestrator = Orchestrator::new(test_config()).expect("valid config");
        let market = MarketParameters::default();
        let none = orchestrator.evaluate(&sample_state(0.0), market, &[], None);
        let some = orchestrator.evaluate(&sample_state(20_000.0), market, &[], None);
        assert!(none.prescriptions[0].success_rate < some.prescriptions[0].success_rate);
    }

    #[test]
    fn repeated_inputs_hit_the_cache() {
        let orchestrator = Orchestrator::with_simulator(test_config(), CountingSimulator::default())
            .expect("valid config");
        let state = sample_state(20_000.0);
        let market = MarketParameters::default();

        let first = orchestrator.evaluate(&state, market, &[], None);
        let second = orchestrator.evaluate(&state, market, &[], None);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(orchestrator.simulator().calls.load(Ordering::SeqCst), 1);

        let news = [NewsItem {
            headline: "Rate cut".to_string(),
            sentiment: Sentiment::Positive,
            impact: Impact::High,
        }];
        let third = orchestrator.evaluate(&state, market, &news, None);
        assert_eq!(orchestrator.simulator().calls.load(Ordering::SeqCst), 2);
        assert!(third.adjusted_mu > first.adjusted_mu);
    }

    #[test]
    fn positive_news_raises_risky_share() {
        let orchestrator = Orchestrator::new(test_config()).expect("valid config");
        let state = sample_state(20_000.0);
        let market = MarketParameters::default();
        let news = [NewsItem {
            headline: "Earnings beat".to_string(),
            sentiment: Sentiment::Positive,
            impact: Impact::High,
        }];

        let plain = orchestrator.evaluate(&state, market, &[], None);
        let bull = orchestrator.evaluate(&state, market, &news, None);

        assert!((plain.merton.merton_fraction - 0.06 / (5.5 * 0.0324)).abs() < 1e-9);
        assert!((bull.merton.merton_fraction - 0.08 / (5.5 * 0.0324)).abs() < 1e-9);
        assert!(bull.merton.merton_fraction > plain.merton.merton_fraction);
    }

    #[test]
    fn equivalent_clamped_markets_share_a_cache_entry() {
        let orchestrator = Orchestrator::with_simulator(test_config(), CountingSimulator::default())
            .expect("valid config");
        let state = sample_state(20_000.0);
        orchestrator.evaluate(&state, MarketParameters { mu: 0.9, sigma: 0.18 }, &[], None);
        orchestrator.evaluate(&state, MarketParameters { mu: 0.25, sigma: 0.18 }, &[], None);
        assert_eq!(orchestrator.simulator().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transition_map_spans_each_year_to_target() {
        let orchestrator = Orchestrator::new(test_config()).expect("valid config");
        let eval = orchestrator.evaluate(&sample_state(20_000.0), MarketParameters::default(), &[], None);
        assert_eq!(eval.transition_map.len(), 31);
        assert_eq!(eval.transition_map[0].age, 30);
        let last = eval.transition_map[30];
        assert_eq!(last.age, 60);
        assert_eq!(last.human_capital, 0.0);
        assert_eq!(last.financial_assets, eval.wealth_paths[360].p50);
        assert_eq!(eval.transition_map[0].financial_assets, 1_000_000.0);
        for pair in eval.transition_map.windows(2) {
            assert!(pair[1].human_capital < pair[0].human_capital);
        }
    }

    #[test]
    fn household_at_target_age_still_gets_one_year() {
        let orchestrator = Orchestrator::new(test_config()).expect("valid config");
        let mut state = sample_state(10_000.0);
        state.age = 60;
        let eval = orchestrator.evaluate(&state, MarketParameters::default(), &[], None);
        assert_eq!(eval.transition_map.len(), 2);
        assert_eq!(eval.wealth_paths.len(), 13);
        assert!(eval.transition_map.iter().all(|p| p.human_capital == 0.0));
    }

    #[test]
    fn no_goals_counts_as_full_success() {
        let orchestrator = Orchestrator::new(test_config()).expect("valid config");
        let mut state = sample_state(20_000.0);
        state.goals.clear();
        let eval = orchestrator.evaluate(&state, MarketParameters::default(), &[], None);
        assert!(eval.prescriptions.is_empty());
        assert_eq!(eval.average_goal_success, 100.0);
        assert_eq!(eval.quality_score, factor::NEUTRAL_QUALITY_SCORE);
        let expected = fitness_score(
            eval.merton.merton_fraction,
            100.0,
            factor::NEUTRAL_QUALITY_SCORE,
            &FitnessWeights::default(),
        );
        assert_eq!(eval.fitness_score, expected);
    }

    #[test]
    fn fixed_seed_sessions_agree() {
        let a = Orchestrator::new(test_config()).expect("valid config");
        let b = Orchestrator::new(test_config()).expect("valid config");
        let state = sample_state(20_000.0);
        let x = a.evaluate(&state, MarketParameters::default(), &[], None);
        let y = b.evaluate(&state, MarketParameters::default(), &[], None);
        assert_eq!(*x, *y);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = test_config();
        config.cache_capacity = 0;
        assert!(Orchestrator::new(config).is_err());
    }
}
