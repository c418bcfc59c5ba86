//! Two-proportion z-test for comparing conversion rates.

use serde::{Deserialize, Serialize};

/// Outcome of comparing a variant against the control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub is_significant: bool,
    /// `(1 - p_value) * 100`.
    pub confidence: f64,
    pub p_value: f64,
    pub z_score: f64,
    pub control_rate: f64,
    pub variant_rate: f64,
    /// Relative lift of the variant over the control; 0 when the control rate is 0.
    pub relative_lift: f64,
}

impl SignificanceResult {
    fn inconclusive(control_rate: f64, variant_rate: f64) -> Self {
        Self {
            is_significant: false,
            confidence: 0.0,
            p_value: 1.0,
            z_score: 0.0,
            control_rate,
            variant_rate,
            relative_lift: 0.0,
        }
    }
}

/// Evaluate whether the variant's conversion rate differs from the control's.
///
/// `confidence_level` is a percentage, typically 95. Zero standard error
/// (no visitors, or identical all-or-nothing rates) is reported as
/// inconclusive instead of dividing by zero.
pub fn evaluate(
    control_conversions: u64,
    control_visitors: u64,
    variant_conversions: u64,
    variant_visitors: u64,
    confidence_level: f64,
) -> SignificanceResult {
    let rate = |conversions: u64, visitors: u64| {
        if visitors == 0 {
            0.0
        } else {
            conversions as f64 / visitors as f64
        }
    };
    let control_rate = rate(control_conversions, control_visitors);
    let variant_rate = rate(variant_conversions, variant_visitors);

    if control_visitors == 0 || variant_visitors == 0 {
        return SignificanceResult::inconclusive(control_rate, variant_rate);
    }

    let pooled = (control_conversions + variant_conversions) as f64
        / (control_visitors + variant_visitors) as f64;
    let standard_error = (pooled
        * (1.0 - pooled)
        * (1.0 / control_visitors as f64 + 1.0 / variant_visitors as f64))
        .sqrt();
    if standard_error == 0.0 || !standard_error.is_finite() {
        return SignificanceResult::inconclusive(control_rate, variant_rate);
    }

    let z_score = (variant_rate - control_rate) / standard_error;
    let p_value = (2.0 * (1.0 - normal_cdf(z_score.abs()))).clamp(0.0, 1.0);
    let relative_lift = if control_rate > 0.0 {
        (variant_rate - control_rate) / control_rate
    } else {
        0.0
    };

    SignificanceResult {
        is_significant: p_value < 1.0 - confidence_level / 100.0,
        confidence: (1.0 - p_value) * 100.0,
        p_value,
        z_score,
        control_rate,
        variant_rate,
        relative_lift,
    }
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26, max absolute error 1.5e-7.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
