use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub net_monthly: f64,
    pub tax_monthly: f64,
}

pub trait TaxModel {
    fn compute(&self, gross_monthly: f64) -> TaxBreakdown;
}

/// Single effective rate applied to all gross income.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatRateTax {
    rate: f64,
}

impl FlatRateTax {
    pub fn new(rate: f64) -> Self {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        Self { rate }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl TaxModel for FlatRateTax {
    fn compute(&self, gross_monthly: f64) -> TaxBreakdown {
        let gross = gross_monthly.max(0.0);
        let tax_monthly = gross * self.rate;
        TaxBreakdown {
            net_monthly: gross - tax_monthly,
            tax_monthly,
        }
    }
}
