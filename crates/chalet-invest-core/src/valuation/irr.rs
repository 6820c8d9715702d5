use serde::{Deserialize, Serialize};

use crate::time_value::npv_f64;
use crate::types::{from_f64, to_f64, Money, Rate};

const LOWER_BOUND: f64 = -0.99;
const UPPER_BOUND: f64 = 9.99;
const MAX_ITERATIONS: u32 = 200;
const TOLERANCE: f64 = 1e-8;
const CANDIDATE_RATES: [f64; 10] = [-0.5, -0.2, -0.1, 0.0, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0];

/// How an IRR figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrMethod {
    Bisection,
    CandidateScan,
    /// No root found; the rate is reported as zero
    NoSolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrSolution {
    pub rate: Rate,
    pub converged: bool,
    pub method: IrrMethod,
}

impl IrrSolution {
    fn no_solution() -> Self {
        IrrSolution {
            rate: Rate::ZERO,
            converged: false,
            method: IrrMethod::NoSolution,
        }
    }
}

/// IRR of `-initial_investment` at t = 0 followed by `cash_flows` at
/// t = 1..n, with positive `sale_proceeds` added to the last period.
///
/// Bisection over (-0.99, 9.99). Without a sign change a fixed set of
/// candidate rates is scanned; when nothing lands within 1% of the
/// investment the result is zero with `converged = false`.
pub fn calculate_irr(
    cash_flows: &[Money],
    initial_investment: Money,
    sale_proceeds: Money,
) -> IrrSolution {
    let initial = to_f64(initial_investment);
    let mut flows: Vec<f64> = Vec::with_capacity(cash_flows.len() + 1);
    flows.push(-initial);
    flows.extend(cash_flows.iter().map(|cf| to_f64(*cf)));
    let sale = to_f64(sale_proceeds);
    if sale > 0.0 {
        if let Some(last) = flows.last_mut() {
            *last += sale;
        }
    }
    solve(&flows, initial.abs())
}

fn solve(flows: &[f64], scale: f64) -> IrrSolution {
    let npv = |r: f64| {
        let v = npv_f64(r, flows);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut low = LOWER_BOUND;
    let mut high = UPPER_BOUND;
    let npv_low = npv(low);
    let npv_high = npv(high);

    if npv_low.signum() == npv_high.signum() && npv_low != 0.0 && npv_high != 0.0 {
        for rate in CANDIDATE_RATES {
            if npv(rate).abs() < scale * 0.01 {
                return IrrSolution {
                    rate: from_f64(rate),
                    converged: true,
                    method: IrrMethod::CandidateScan,
                };
            }
        }
        return IrrSolution::no_solution();
    }

    let low_sign = npv_low.signum();
    for _ in 0..MAX_ITERATIONS {
        let mid = (low + high) / 2.0;
        let value = npv(mid);
        if value.abs() < TOLERANCE {
            return IrrSolution {
                rate: from_f64(mid),
                converged: true,
                method: IrrMethod::Bisection,
            };
        }
        if value.signum() == low_sign {
            low = mid;
        } else {
            high = mid;
        }
        if (high - low).abs() < TOLERANCE {
            break;
        }
    }

    let rate = (low + high) / 2.0;
    if npv(rate).abs() < scale * 0.1 {
        IrrSolution {
            rate: from_f64(rate),
            converged: true,
            method: IrrMethod::Bisection,
        }
    } else {
        IrrSolution::no_solution()
    }
}
