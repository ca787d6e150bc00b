use std::f64::consts::SQRT_2;

use statrs::function::erf::erf;
use tracing::warn;

use super::config::{AllocationPolicy, GoalSolverConfig};
use super::types::{FinancialGoal, Prescription};

/// Market assumptions and solver limits shared by every goal in one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalAssumptions {
    pub volatility: f64,
    pub solver: GoalSolverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ContributionGap {
    extra: f64,
    converged: bool,
    iterations: u32,
}

/// Target amount inflated to the goal date.
pub fn future_target(goal: &FinancialGoal) -> f64 {
    inflate(goal.target_amount, goal.inflation_rate, goal.years_away as f64)
}

fn inflate(amount: f64, inflation_rate: f64, years: f64) -> f64 {
    amount.max(0.0) * (1.0 + inflation_rate.max(-0.99)).powf(years)
}

/// Per-goal share of the household's recurring contribution.
pub fn allocate_contributions(
    total_monthly: f64,
    goal_count: usize,
    policy: AllocationPolicy,
) -> Vec<f64> {
    if goal_count == 0 {
        return Vec::new();
    }
    let total = total_monthly.max(0.0);
    match policy {
        AllocationPolicy::EqualSplit => vec![total / goal_count as f64; goal_count],
        AllocationPolicy::PriorityWeighted => {
            let weight_sum = (goal_count * (goal_count + 1) / 2) as f64;
            (0..goal_count)
                .map(|idx| total * (goal_count - idx) as f64 / weight_sum)
                .collect()
        }
    }
}

/// Mean success rate; an empty goal list counts as fully funded.
pub fn average_success(prescriptions: &[Prescription]) -> f64 {
    if prescriptions.is_empty() {
        return 100.0;
    }
    prescriptions.iter().map(|p| p.success_rate).sum::<f64>() / prescriptions.len() as f64
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Median wealth from `months` end-of-month contributions compounding at the median log growth.
fn median_terminal_wealth(monthly_contribution: f64, months: u32, mu: f64, sigma: f64) -> f64 {
    if months == 0 || monthly_contribution <= 0.0 {
        return 0.0;
    }
    let growth = (mu / 12.0 - sigma * sigma / 24.0).exp();
    if (growth - 1.0).abs() < 1e-12 {
        return monthly_contribution * months as f64;
    }
    monthly_contribution * (growth.powf(months as f64) - 1.0) / (growth - 1.0)
}

/// Lognormal approximation of P(terminal wealth >= target), in percent.
///
/// Dispersion is `sigma * sqrt(T)` regardless of contribution size, which keeps the
/// probability non-decreasing in the contribution.
pub fn success_probability(
    monthly_contribution: f64,
    months: u32,
    target: f64,
    mu: f64,
    sigma: f64,
) -> f64 {
    if target <= 0.0 {
        return 100.0;
    }
    let sigma = if sigma.is_finite() { sigma.max(0.0) } else { 0.0 };
    let median = median_terminal_wealth(monthly_contribution.max(0.0), months, mu, sigma);
    if !median.is_finite() || median <= 0.0 {
        return 0.0;
    }

    let spread = sigma * (months as f64 / 12.0).sqrt();
    if spread <= 1e-12 {
        return if median >= target { 100.0 } else { 0.0 };
    }
    let z = (median.ln() - target.ln()) / spread;
    let p = 100.0 * normal_cdf(z);
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) }
}

pub fn calculate_goal_gap(
    goal: &FinancialGoal,
    allocated_monthly_sip: f64,
    expected_return: f64,
    assumptions: &GoalAssumptions,
) -> Prescription {
    let sip = if allocated_monthly_sip.is_finite() {
        allocated_monthly_sip.max(0.0)
    } else {
        0.0
    };
    let target = future_target(goal);
    let months = goal.years_away.saturating_mul(12);
    let sigma = assumptions.volatility;
    let threshold = assumptions.solver.confidence_threshold;
    let success_rate = success_probability(sip, months, target, expected_return, sigma);

    if success_rate + 1e-12 >= threshold {
        return Prescription {
            goal_id: goal.id.clone(),
            success_rate,
            increase_monthly_contribution: 0.0,
            adjust_timeline_months: Some(0),
            future_target: target,
            converged: true,
        };
    }

    let gap = solve_additional_contribution(
        sip,
        months,
        target,
        expected_return,
        sigma,
        &assumptions.solver,
    );
    if !gap.converged {
        warn!(
            goal_id = %goal.id,
            iterations = gap.iterations,
            extra = gap.extra,
            "contribution gap did not converge; returning best estimate"
        );
    }

    Prescription {
        goal_id: goal.id.clone(),
        success_rate,
        increase_monthly_contribution: gap.extra,
        adjust_timeline_months: timeline_extension(goal, sip, expected_return, assumptions),
        future_target: target,
        converged: gap.converged,
    }
}

/// Bisection for the smallest extra monthly amount that lifts success to the threshold.
fn solve_additional_contribution(
    sip: f64,
    months: u32,
    target: f64,
    mu: f64,
    sigma: f64,
    config: &GoalSolverConfig,
) -> ContributionGap {
    let meets = |extra: f64| {
        success_probability(sip + extra, months, target, mu, sigma) + 1e-12
            >= config.confidence_threshold
    };

    if months == 0 {
        return ContributionGap {
            extra: 0.0,
            converged: false,
            iterations: 0,
        };
    }

    let mut hi = (target / months as f64).max(1.0);
    let mut doublings = 0;
    while !meets(hi) {
        if doublings >= config.max_bracket_doublings {
            return ContributionGap {
                extra: hi.ceil(),
                converged: false,
                iterations: 0,
            };
        }
        hi *= 2.0;
        doublings += 1;
    }

    let mut lo = 0.0;
    let mut it = 0;
    let mut converged = false;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        if meets(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
        if (hi - lo).abs() <= config.tolerance {
            converged = true;
            break;
        }
    }

    ContributionGap {
        extra: hi.ceil(),
        converged,
        iterations: it,
    }
}

/// Fewest extra months at the current contribution that reach the threshold, with the
/// target inflated over the longer horizon.
fn timeline_extension(
    goal: &FinancialGoal,
    sip: f64,
    mu: f64,
    assumptions: &GoalAssumptions,
) -> Option<u32> {
    if sip <= 0.0 {
        return None;
    }
    let base_months = goal.years_away.saturating_mul(12);
    (0..=assumptions.solver.max_timeline_extension_months).find(|&extra| {
        let months = base_months.saturating_add(extra);
        let target = inflate(
            goal.target_amount,
            goal.inflation_rate,
            months as f64 / 12.0,
        );
        success_probability(sip, months, target, mu, assumptions.volatility) + 1e-12
            >= assumptions.solver.confidence_threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GoalCategory;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_goal() -> FinancialGoal {
        FinancialGoal {
            id: "home".to_string(),
            label: "Dream Home".to_string(),
            category: GoalCategory::Housing,
            target_amount: 5_000_000.0,
            years_away: 15,
            inflation_rate: 0.07,
        }
    }

    fn assumptions() -> GoalAssumptions {
        GoalAssumptions {
            volatility: 0.18,
            solver: GoalSolverConfig::default(),
        }
    }

    #[test]
    fn future_target_compounds_goal_inflation() {
        assert_approx(future_target(&sample_goal()), 5_000_000.0 * 1.07_f64.powi(15));
    }

    #[test]
    fn zero_contribution_has_zero_success() {
        let p = calculate_goal_gap(&sample_goal(), 0.0, 0.10, &assumptions());
        assert_eq!(p.success_rate, 0.0);
        assert!(p.increase_monthly_contribution > 0.0);
        assert_eq!(p.adjust_timeline_months, None);
    }

    #[test]
    fn larger_sip_strictly_improves_odds() {
        let none = calculate_goal_gap(&sample_goal(), 0.0, 0.10, &assumptions());
        let some = calculate_goal_gap(&sample_goal(), 20_000.0, 0.10, &assumptions());
        assert!(none.success_rate < some.success_rate);
    }

    #[test]
    fn solved_increase_reaches_threshold() {
        let a = assumptions();
        let p = calculate_goal_gap(&sample_goal(), 20_000.0, 0.10, &a);
        assert!(p.converged);
        assert!(p.success_rate < a.solver.confidence_threshold);

        let months = sample_goal().years_away * 12;
        let with_increase = success_probability(
            20_000.0 + p.increase_monthly_contribution,
            months,
            p.future_target,
            0.10,
            0.18,
        );
        assert!(with_increase >= a.solver.confidence_threshold - 1e-9);

        let just_below = success_probability(
            20_000.0 + p.increase_monthly_contribution - 2.0 * a.solver.tolerance - 1.0,
            months,
            p.future_target,
            0.10,
            0.18,
        );
        assert!(just_below < a.solver.confidence_threshold);
    }

    #[test]
    fn comfortable_goal_needs_no_increase() {
        let mut goal = sample_goal();
        goal.target_amount = 100_000.0;
        let p = calculate_goal_gap(&goal, 50_000.0, 0.10, &assumptions());
        assert!(p.success_rate >= 90.0);
        assert_eq!(p.increase_monthly_contribution, 0.0);
        assert_eq!(p.adjust_timeline_months, Some(0));
        assert!(p.converged);
    }

    #[test]
    fn timeline_extension_is_found_for_partially_funded_goal() {
        let p = calculate_goal_gap(&sample_goal(), 60_000.0, 0.12, &assumptions());
        let months = p.adjust_timeline_months.expect("reachable with more time");
        assert!(months > 0 && months <= 360);
    }

    #[test]
    fn timeline_extension_is_none_when_dispersion_outgrows_drift() {
        let p = calculate_goal_gap(&sample_goal(), 40_000.0, 0.10, &assumptions());
        assert_eq!(p.adjust_timeline_months, None);
    }

    #[test]
    fn due_goal_cannot_be_solved_by_contributions() {
        let mut goal = sample_goal();
        goal.years_away = 0;
        let p = calculate_goal_gap(&goal, 10_000.0, 0.10, &assumptions());
        assert_eq!(p.success_rate, 0.0);
        assert!(!p.converged);
        assert_approx(p.future_target, 5_000_000.0);
    }

    #[test]
    fn iteration_cap_returns_best_estimate() {
        let mut a = assumptions();
        a.solver.max_iterations = 1;
        a.solver.tolerance = 1e-9;
        let p = calculate_goal_gap(&sample_goal(), 1_000.0, 0.10, &a);
        assert!(!p.converged);
        assert!(p.increase_monthly_contribution > 0.0);
    }

    #[test]
    fn absurd_horizon_does_not_overflow() {
        let mut goal = sample_goal();
        goal.years_away = 400_000_000;
        let p = calculate_goal_gap(&goal, 20_000.0, 0.10, &assumptions());
        assert_eq!(p.success_rate, 0.0);
        assert!(!p.converged);
        assert_eq!(p.adjust_timeline_months, None);
    }

    #[test]
    fn zero_volatility_is_a_step_function() {
        let target = 1_000.0;
        assert_eq!(success_probability(100.0, 12, target, 0.0, 0.0), 100.0);
        assert_eq!(success_probability(50.0, 12, target, 0.0, 0.0), 0.0);
    }

    #[test]
    fn equal_split_divides_evenly() {
        let shares = allocate_contributions(30_000.0, 3, AllocationPolicy::EqualSplit);
        assert_eq!(shares, vec![10_000.0; 3]);
        assert!(allocate_contributions(30_000.0, 0, AllocationPolicy::EqualSplit).is_empty());
    }

    #[test]
    fn priority_split_favours_earlier_goals() {
        let shares = allocate_contributions(60_000.0, 3, AllocationPolicy::PriorityWeighted);
        assert_approx(shares[0], 30_000.0);
        assert_approx(shares[1], 20_000.0);
        assert_approx(shares[2], 10_000.0);
    }

    #[test]
    fn average_success_defaults_to_full_with_no_goals() {
        assert_eq!(average_success(&[]), 100.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_success_is_non_decreasing_in_contribution(
            low in 0u32..200_000,
            bump in 0u32..200_000,
            years in 0u32..40,
            target in 1u32..100_000_000,
            mu_bp in 500u32..2_500,
            sigma_bp in 1_000u32..4_000
        ) {
            let months = years * 12;
            let mu = mu_bp as f64 / 10_000.0;
            let sigma = sigma_bp as f64 / 10_000.0;
            let a = success_probability(low as f64, months, target as f64, mu, sigma);
            let b = success_probability((low + bump) as f64, months, target as f64, mu, sigma);
            prop_assert!((0.0..=100.0).contains(&a));
            prop_assert!(a <= b + 1e-9);
        }

        #[test]
        fn prop_prescription_is_well_formed(
            sip in 0u32..100_000,
            years in 0u32..30,
            target in 1u32..50_000_000,
            inflation_bp in 0u32..1_200
        ) {
            let goal = FinancialGoal {
                years_away: years,
                target_amount: target as f64,
                inflation_rate: inflation_bp as f64 / 10_000.0,
                ..sample_goal()
            };
            let p = calculate_goal_gap(&goal, sip as f64, 0.10, &assumptions());
            prop_assert!((0.0..=100.0).contains(&p.success_rate));
            prop_assert!(p.increase_monthly_contribution >= 0.0);
            prop_assert!(p.future_target >= goal.target_amount - 1e-6);
        }
    }
}
