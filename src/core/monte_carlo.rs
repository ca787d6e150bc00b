use std::collections::hash_map::RandomState;
use std::f64::consts::PI;
use std::hash::BuildHasher;
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use tracing::debug;

use super::config::{MAX_HORIZON_YEARS, MAX_SIMULATION_PATHS, MIN_SIMULATION_PATHS};
use super::types::MonthlyPercentiles;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRequest {
    pub initial_wealth: f64,
    pub years: u32,
    pub mu: f64,
    pub sigma: f64,
    pub monthly_contribution: f64,
    pub paths: u32,
    pub seed: Option<u64>,
}

/// Forward wealth simulation strategy used by the orchestrator.
pub trait WealthSimulator: Send + Sync {
    fn simulate(&self, request: &SimulationRequest) -> Vec<MonthlyPercentiles>;
}

/// Monthly geometric Brownian motion with a fixed contribution after each step.
#[derive(Debug, Clone, Copy, Default)]
pub struct GbmMonteCarlo;

impl WealthSimulator for GbmMonteCarlo {
    fn simulate(&self, request: &SimulationRequest) -> Vec<MonthlyPercentiles> {
        run_monte_carlo(request)
    }
}

/// Runs independent paths in parallel and returns p10/p50/p90 wealth for months `0..=years*12`.
///
/// Each path draws from its own generator seeded by `(seed, path_id)`, so a fixed seed
/// gives bit-identical output whatever the thread count. Horizons past
/// `MAX_HORIZON_YEARS` are truncated.
pub fn run_monte_carlo(request: &SimulationRequest) -> Vec<MonthlyPercentiles> {
    let months = request.years.min(MAX_HORIZON_YEARS) as usize * 12;
    let paths = request.paths.clamp(MIN_SIMULATION_PATHS, MAX_SIMULATION_PATHS);
    let seed = request.seed.unwrap_or_else(entropy_seed);
    let step = MonthlyStep::new(request.mu, request.sigma);
    let initial = non_negative(request.initial_wealth);
    let contribution = non_negative(request.monthly_contribution);

    debug!(paths, months, seed, "running monte carlo");

    let all_paths: Vec<Vec<f64>> = (0..paths)
        .into_par_iter()
        .map(|path_id| {
            let mut rng = PathRng::for_path(seed, path_id);
            simulate_path(initial, contribution, months, step, &mut rng)
        })
        .collect();

    let mut column = Vec::with_capacity(all_paths.len());
    let mut results = Vec::with_capacity(months + 1);
    for month in 0..=months {
        column.clear();
        column.extend(all_paths.iter().map(|path| path[month]));
        column.sort_unstable_by(f64::total_cmp);
        results.push(MonthlyPercentiles {
            month: month as u32,
            p10: percentile_sorted(&column, 10.0),
            p50: percentile_sorted(&column, 50.0),
            p90: percentile_sorted(&column, 90.0),
        });
    }
    results
}

#[derive(Debug, Clone, Copy)]
struct MonthlyStep {
    drift: f64,
    vol: f64,
}

impl MonthlyStep {
    fn new(mu: f64, sigma: f64) -> Self {
        let mu = if mu.is_finite() { mu } else { 0.0 };
        let sigma = non_negative(sigma);
        Self {
            drift: mu / 12.0 - sigma * sigma / 24.0,
            vol: sigma / 12.0_f64.sqrt(),
        }
    }
}

fn simulate_path(
    initial: f64,
    contribution: f64,
    months: usize,
    step: MonthlyStep,
    rng: &mut PathRng,
) -> Vec<f64> {
    let mut path = Vec::with_capacity(months + 1);
    let mut wealth = initial;
    path.push(wealth);
    for _ in 0..months {
        let log_return = step.drift + step.vol * rng.standard_normal();
        wealth = wealth * log_return.exp() + contribution;
        path.push(wealth);
    }
    path
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

pub(crate) fn entropy_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    splitmix64(RandomState::new().hash_one(nanos))
}

fn derive_seed(base_seed: u64, path_id: u32) -> u64 {
    let mixed = base_seed ^ ((path_id as u64) << 32) ^ path_id as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Xorshift generator owned by a single path, with the spare Box-Muller draw kept.
struct PathRng {
    state: u64,
    spare_normal: Option<f64>,
}

impl PathRng {
    fn for_path(base_seed: u64, path_id: u32) -> Self {
        Self::from_seed(derive_seed(base_seed, path_id))
    }

    fn from_seed(seed: u64) -> Self {
        // xorshift has an all-zero fixed point
        let state = if seed == 0 { 0xA5A5_A5A5_A5A5_A5A5 } else { seed };
        Self {
            state,
            spare_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }

        let radius = (-2.0 * self.next_f64().max(1e-12).ln()).sqrt();
        let (sin, cos) = (2.0 * PI * self.next_f64()).sin_cos();
        self.spare_normal = Some(radius * sin);
        radius * cos
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only,
        _ => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let w = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * w
        }
    }
}
