use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ChaletError;
use crate::types::{Money, Rate};
use crate::ChaletResult;

/// Net Present Value of a series of cash flows, the first at t = 0.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> ChaletResult<Money> {
    if rate <= dec!(-1) {
        return Err(ChaletError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            return Err(ChaletError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Floating-point NPV used inside root-finding, where Decimal would
/// overflow for rates close to -100% over long horizons.
pub(crate) fn npv_f64(rate: f64, cash_flows: &[f64]) -> f64 {
    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0_f64;
    let mut total = 0.0_f64;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        total += cf / discount;
    }
    total
}

/// Compounding factor series: entry k (0-based) is the factor for year k+1.
///
/// Year 1 is always 1.0. Later years multiply the previous factor by
/// `1 + rate`, where the rate comes from `series[k - 1]` when supplied and
/// from the constant `rate` otherwise.
pub fn compounding_factors(rate: Rate, series: Option<&[Rate]>, years: u32) -> Vec<Decimal> {
    let mut factors = Vec::with_capacity(years as usize);
    let mut factor = Decimal::ONE;
    for k in 0..years as usize {
        if k > 0 {
            let r = series
                .and_then(|s| s.get(k - 1).copied())
                .unwrap_or(rate);
            factor *= Decimal::ONE + r;
        }
        factors.push(factor);
    }
    factors
}
