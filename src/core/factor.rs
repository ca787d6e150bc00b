use serde::Serialize;

use super::types::{BreakdownSource, Persona, PortfolioAsset, PortfolioBreakdown};

/// Score returned when there is nothing to compare against.
pub const NEUTRAL_QUALITY_SCORE: f64 = 85.0;

const EQUITY_WEIGHT: f64 = 1.0;
const DEBT_WEIGHT: f64 = 0.6;
const CASH_WEIGHT: f64 = 0.4;

/// Equity / debt / cash proportions summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMix {
    pub equity: f64,
    pub debt: f64,
    pub cash: f64,
}

impl CategoryMix {
    pub fn from_breakdown(breakdown: &PortfolioBreakdown) -> Option<Self> {
        let equity = breakdown.equity.max(0.0);
        let debt = breakdown.debt.max(0.0);
        let cash = breakdown.cash.max(0.0);
        let total = equity + debt + cash;
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        Some(Self {
            equity: equity / total,
            debt: debt / total,
            cash: cash / total,
        })
    }
}

pub fn target_mix(persona: Persona) -> CategoryMix {
    let (equity, debt, cash) = match persona {
        Persona::AggressiveGrowthSeeker => (0.85, 0.10, 0.05),
        Persona::GrowthBuilder => (0.70, 0.22, 0.08),
        Persona::BalancedGuardian => (0.55, 0.35, 0.10),
        Persona::ConservativeSteward => (0.35, 0.50, 0.15),
        Persona::CapitalPreserver => (0.20, 0.55, 0.25),
    };
    CategoryMix { equity, debt, cash }
}

pub fn score_mix(persona: Persona, actual: CategoryMix) -> f64 {
    let target = target_mix(persona);
    let deviation = EQUITY_WEIGHT * (actual.equity - target.equity).abs()
        + DEBT_WEIGHT * (actual.debt - target.debt).abs()
        + CASH_WEIGHT * (actual.cash - target.cash).abs();
    (100.0 - 100.0 * deviation).clamp(0.0, 100.0)
}

pub fn score_breakdown(persona: Persona, breakdown: &PortfolioBreakdown) -> f64 {
    CategoryMix::from_breakdown(breakdown)
        .map_or(NEUTRAL_QUALITY_SCORE, |mix| score_mix(persona, mix))
}

/// Alignment of held assets with the persona's target mix, in `[0, 100]`.
pub fn score(persona: Persona, held_assets: Option<&[PortfolioAsset]>) -> f64 {
    match held_assets {
        Some(assets) if !assets.is_empty() => score_breakdown(
            persona,
            &PortfolioBreakdown::from_assets(assets, BreakdownSource::Manual),
        ),
        _ => NEUTRAL_QUALITY_SCORE,
    }
}
