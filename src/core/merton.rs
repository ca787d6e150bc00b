use super::config::EngineConfig;
use super::tax::TaxModel;
use super::types::{
    AllocationSlice, AllocationSplit, HouseholdState, MarketParameters, MertonOutput, Persona,
    RiskAnswers,
};

pub const GAMMA_MIN: f64 = 1.0;
pub const GAMMA_MAX: f64 = 10.0;

const NEUTRAL_TOLERANCE: f64 = 0.5;
const DRAWDOWN_WEIGHT: f64 = 0.35;
const GROWTH_WEIGHT: f64 = 0.30;
const RUNWAY_WEIGHT: f64 = 0.15;
const HORIZON_WEIGHT: f64 = 0.20;

/// Relative risk aversion from the questionnaire, in `[GAMMA_MIN, GAMMA_MAX]`.
pub fn risk_aversion(answers: &RiskAnswers) -> f64 {
    let tolerance = DRAWDOWN_WEIGHT
        * answers
            .drawdown_reaction
            .map_or(NEUTRAL_TOLERANCE, |a| a.tolerance())
        + GROWTH_WEIGHT
            * answers
                .growth_preference
                .map_or(NEUTRAL_TOLERANCE, |a| a.tolerance())
        + RUNWAY_WEIGHT
            * answers
                .emergency_runway
                .map_or(NEUTRAL_TOLERANCE, |a| a.tolerance())
        + HORIZON_WEIGHT
            * answers
                .savings_horizon
                .map_or(NEUTRAL_TOLERANCE, |a| a.tolerance());

    (GAMMA_MAX - (GAMMA_MAX - GAMMA_MIN) * tolerance).clamp(GAMMA_MIN, GAMMA_MAX)
}

/// Bins cover the whole real line; NaN lands in the most conservative bin.
pub fn persona(gamma: f64) -> Persona {
    if gamma < 2.0 {
        Persona::AggressiveGrowthSeeker
    } else if gamma < 4.0 {
        Persona::GrowthBuilder
    } else if gamma < 6.0 {
        Persona::BalancedGuardian
    } else if gamma < 8.0 {
        Persona::ConservativeSteward
    } else {
        Persona::CapitalPreserver
    }
}

/// Optimal risky share `(mu - r) / (gamma * sigma^2)`, clamped to `[0, 1]`.
pub fn merton_fraction(mu: f64, sigma: f64, risk_free_rate: f64, gamma: f64) -> f64 {
    let gamma = if gamma.is_finite() && gamma > 0.0 {
        gamma
    } else {
        GAMMA_MIN
    };
    let variance = if sigma.is_finite() {
        (sigma * sigma).max(1e-12)
    } else {
        1e-12
    };
    let raw = (mu - risk_free_rate) / (gamma * variance);
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

/// Present value of `years` annual payments of 1 at `rate`.
pub fn annuity_factor(rate: f64, years: u32) -> f64 {
    if years == 0 {
        return 0.0;
    }
    if rate.abs() < 1e-12 {
        return years as f64;
    }
    (1.0 - (1.0 + rate).powf(-(years as f64))) / rate
}

pub fn human_capital(annual_net_income: f64, years_remaining: u32, discount_rate: f64) -> f64 {
    if !annual_net_income.is_finite() || annual_net_income <= 0.0 {
        return 0.0;
    }
    annual_net_income * annuity_factor(discount_rate, years_remaining)
}

/// Monthly sinking-fund payment closing the gap between the retirement corpus and
/// current savings grown at the portfolio rate. Capped at net income.
fn savings_requirement(
    net_monthly: f64,
    savings: f64,
    years: u32,
    portfolio_return: f64,
    config: &EngineConfig,
) -> f64 {
    let net_monthly = net_monthly.max(0.0);
    let annual_need = config.replacement_ratio * net_monthly * 12.0;
    let corpus = annual_need * annuity_factor(config.discount_rate, config.retirement_years);
    let grown = savings.max(0.0) * (1.0 + portfolio_return).powf(years as f64);
    let shortfall = corpus - grown;
    if !shortfall.is_finite() || shortfall <= 0.0 {
        return 0.0;
    }

    let months = years.saturating_mul(12);
    let payment = if months == 0 {
        shortfall
    } else {
        let i = portfolio_return / 12.0;
        if i.abs() < 1e-12 {
            shortfall / months as f64
        } else {
            shortfall * i / ((1.0 + i).powf(months as f64) - 1.0)
        }
    };
    payment.clamp(0.0, net_monthly)
}

pub fn calculate<T: TaxModel + ?Sized>(
    state: &HouseholdState,
    market: MarketParameters,
    tax: &T,
    config: &EngineConfig,
) -> MertonOutput {
    let market = config.market_bounds.clamp(market);
    let tax = tax.compute(state.monthly_salary);
    let gamma = risk_aversion(&state.risk_answers);
    let fraction = merton_fraction(market.mu, market.sigma, config.risk_free_rate, gamma);
    let years = state.years_to_target();

    let portfolio_return = config.risk_free_rate + fraction * (market.mu - config.risk_free_rate);
    let savings_requirement = savings_requirement(
        tax.net_monthly,
        state.savings,
        years,
        portfolio_return,
        config,
    );

    MertonOutput {
        risk_aversion: gamma,
        merton_fraction: fraction,
        human_capital: human_capital(tax.net_monthly * 12.0, years, config.discount_rate),
        safe_monthly_consumption: (tax.net_monthly - savings_requirement).max(0.0),
        savings_requirement,
        persona: persona(gamma),
        net_monthly_income: tax.net_monthly,
        tax_leakage: tax.tax_monthly,
    }
}

/// Splits net income into consumption and a surplus divided between investing
/// (at most `invest_cap` of the surplus) and saving.
pub fn allocation_split(
    merton: &MertonOutput,
    monthly_expenses: f64,
    invest_cap: f64,
) -> AllocationSplit {
    let net = merton.net_monthly_income;
    let consume = merton.safe_monthly_consumption;
    let surplus = (net - consume).max(0.0);
    let fraction = merton.merton_fraction.min(invest_cap).max(0.0);
    let invest = surplus * fraction;
    let save = surplus - invest;

    let slice = |amount: f64| AllocationSlice {
        amount,
        pct: if net > 0.0 { amount / net * 100.0 } else { 0.0 },
    };

    AllocationSplit {
        consume: slice(consume),
        invest: slice(invest),
        save: slice(save),
        is_overspending: monthly_expenses > consume,
    }
}
