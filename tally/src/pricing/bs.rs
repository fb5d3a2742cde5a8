//! Zero-rate Black-Scholes price and delta with time measured in trading days
//! (252 days/year), the minimum surface the delta-hedge contract needs.
//!
//! Internals are `f64`: model outputs feed trade sizing, not balances, and balances are
//! rounded to unit precision on every write.

use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// Standard normal CDF via the Abramowitz-Stegun rational approximation of erf
/// (7.1.26, absolute error < 1.5e-7).
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

fn erf(x: f64) -> f64 {
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

fn d1(spot: f64, strike: f64, t_in_days: f64, volatility: f64) -> f64 {
    let tau = t_in_days / TRADING_DAYS_PER_YEAR;
    let vol_sqrt_tau = volatility * tau.sqrt();
    ((spot / strike).ln() + 0.5 * volatility * volatility * tau) / vol_sqrt_tau
}

/// Call delta. Expired options collapse to their intrinsic indicator.
pub fn call_delta(spot: f64, strike: f64, t_in_days: f64, volatility: f64) -> f64 {
    if t_in_days <= 0.0 {
        return if spot > strike { 1.0 } else { 0.0 };
    }
    norm_cdf(d1(spot, strike, t_in_days, volatility))
}

/// Call price under zero rates.
pub fn call(spot: f64, strike: f64, t_in_days: f64, volatility: f64) -> f64 {
    if t_in_days <= 0.0 {
        return (spot - strike).max(0.0);
    }
    let tau = t_in_days / TRADING_DAYS_PER_YEAR;
    let d1 = d1(spot, strike, t_in_days, volatility);
    let d2 = d1 - volatility * tau.sqrt();
    spot * norm_cdf(d1) - strike * norm_cdf(d2)
}

/// Put price under zero rates, via put-call parity.
pub fn put(spot: f64, strike: f64, t_in_days: f64, volatility: f64) -> f64 {
    if t_in_days <= 0.0 {
        return (strike - spot).max(0.0);
    }
    call(spot, strike, t_in_days, volatility) - spot + strike
}

/// Call delta over `Decimal` inputs; returns `None` on unrepresentable values.
pub fn call_delta_decimal(
    spot: Decimal,
    strike: Decimal,
    t_in_days: Decimal,
    volatility: Decimal,
) -> Option<Decimal> {
    let delta = call_delta(
        spot.to_f64()?,
        strike.to_f64()?,
        t_in_days.to_f64()?,
        volatility.to_f64()?,
    );
    Decimal::from_f64(delta)
}
