//! Per-trial stochastic overlays: growth paths, maintenance, shocks and
//! refinancing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal};

use super::distributions::Bounds;
use crate::error::ChaletError;
use crate::projection::{MaintenanceEvent, MarketShock, ProjectionEvents, RefinancingEvent};
use crate::types::{from_f64, Rate};
use crate::ChaletResult;

/// Mean-reverting AR(1):
/// `x[t] = base + reversion * (x[t-1] - base) + N(0, innovation_std)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ar1Process {
    pub reversion: f64,
    pub innovation_std: f64,
    pub bounds: Bounds,
}

/// Knobs for the per-trial overlays. Every block can be switched off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathModel {
    pub time_series: bool,
    pub inflation: Ar1Process,
    pub appreciation: Ar1Process,

    pub maintenance_events: bool,
    /// Expected events per year
    pub maintenance_lambda: f64,
    pub maintenance_median_cost: f64,
    pub maintenance_cost_sigma: f64,
    pub maintenance_cost_bounds: Bounds,

    pub market_shocks: bool,
    pub shock_probability: f64,

    pub refinancing: bool,
    pub refinancing_interval_years: u32,
    pub market_rate_std: f64,
    pub market_rate_floor: f64,
    /// Minimum drop below the current rate before refinancing is considered
    pub refinancing_threshold: f64,
    pub refinancing_acceptance: f64,
    /// Share of the outstanding balance
    pub refinancing_cost_rate: f64,
}

impl Default for PathModel {
    fn default() -> Self {
        PathModel {
            time_series: true,
            inflation: Ar1Process {
                reversion: 0.8,
                innovation_std: 0.005,
                bounds: Bounds { min: 0.0, max: 0.03 },
            },
            appreciation: Ar1Process {
                reversion: 0.75,
                innovation_std: 0.015,
                bounds: Bounds {
                    min: -0.02,
                    max: 0.09,
                },
            },
            maintenance_events: true,
            maintenance_lambda: 0.15,
            maintenance_median_cost: 15_000.0,
            maintenance_cost_sigma: 0.5,
            maintenance_cost_bounds: Bounds {
                min: 5_000.0,
                max: 50_000.0,
            },
            market_shocks: true,
            shock_probability: 0.03,
            refinancing: true,
            refinancing_interval_years: 3,
            market_rate_std: 0.005,
            market_rate_floor: 0.005,
            refinancing_threshold: 0.005,
            refinancing_acceptance: 0.7,
            refinancing_cost_rate: 0.015,
        }
    }
}

/// Inputs from the trial's deterministic config that the overlays need.
#[derive(Debug, Clone, Copy)]
pub struct PathContext {
    pub years: u32,
    pub inflation_rate: f64,
    pub appreciation_rate: f64,
    pub interest_rate: f64,
    pub initial_loan: f64,
    pub annual_amortization: f64,
}

/// One trial's realised overlays.
#[derive(Debug, Clone, Default)]
pub struct TrialPaths {
    pub inflation_series: Option<Vec<Rate>>,
    pub appreciation_series: Option<Vec<Rate>>,
    pub events: ProjectionEvents,
}

impl TrialPaths {
    pub fn shock_count(&self) -> usize {
        self.events.market_shocks.len()
    }

    pub fn maintenance_count(&self) -> usize {
        self.events.maintenance.len()
    }

    pub fn refinanced(&self) -> bool {
        !self.events.refinancings.is_empty()
    }
}

fn normal(mean: f64, std_dev: f64, what: &str) -> ChaletResult<Normal> {
    Normal::new(mean, std_dev).map_err(|e| ChaletError::InvalidDistribution {
        variable: what.into(),
        reason: e.to_string(),
    })
}

impl PathModel {
    pub fn validate(&self) -> ChaletResult<()> {
        let probability = |field: &str, p: f64| {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(ChaletError::invalid(
                    format!("paths.{field}"),
                    format!("Must be a probability (got {p})"),
                ))
            }
        };
        probability("shock_probability", self.shock_probability)?;
        probability("refinancing_acceptance", self.refinancing_acceptance)?;
        for (field, p) in [("inflation", self.inflation), ("appreciation", self.appreciation)] {
            if p.innovation_std <= 0.0 || p.bounds.min > p.bounds.max {
                return Err(ChaletError::invalid(
                    format!("paths.{field}"),
                    "Innovation std must be positive and bounds ordered",
                ));
            }
        }
        if self.maintenance_lambda < 0.0 || self.maintenance_cost_sigma <= 0.0 {
            return Err(ChaletError::invalid(
                "paths.maintenance",
                "Rate must be non-negative and cost sigma positive",
            ));
        }
        if self.refinancing && self.refinancing_interval_years == 0 {
            return Err(ChaletError::invalid(
                "paths.refinancing_interval_years",
                "Must be at least 1",
            ));
        }
        Ok(())
    }

    /// Realise every enabled overlay for one trial.
    pub fn realise<R: Rng + ?Sized>(
        &self,
        ctx: &PathContext,
        rng: &mut R,
    ) -> ChaletResult<TrialPaths> {
        let mut paths = TrialPaths::default();
        if self.time_series {
            paths.inflation_series = Some(to_rates(ar1_series(
                ctx.inflation_rate,
                &self.inflation,
                ctx.years,
                rng,
            )?));
            paths.appreciation_series = Some(to_rates(ar1_series(
                ctx.appreciation_rate,
                &self.appreciation,
                ctx.years,
                rng,
            )?));
        }
        if self.maintenance_events {
            paths.events.maintenance = self.maintenance_schedule(ctx.years, rng)?;
        }
        if self.market_shocks {
            paths.events.market_shocks = self.shock_schedule(ctx.years, rng);
        }
        if self.refinancing {
            paths.events.refinancings = self.refinancing_schedule(ctx, rng)?;
        }
        Ok(paths)
    }

    fn maintenance_schedule<R: Rng + ?Sized>(
        &self,
        years: u32,
        rng: &mut R,
    ) -> ChaletResult<Vec<MaintenanceEvent>> {
        let cost = LogNormal::new(self.maintenance_median_cost.ln(), self.maintenance_cost_sigma)
            .map_err(|e| ChaletError::InvalidDistribution {
                variable: "maintenance_cost".into(),
                reason: e.to_string(),
            })?;
        // P(at least one Poisson arrival in a year)
        let p_event = 1.0 - (-self.maintenance_lambda).exp();
        let b = self.maintenance_cost_bounds;
        let mut events = Vec::new();
        for year in 1..=years {
            if rng.gen::<f64>() < p_event {
                let c: f64 = rng.sample(cost);
                events.push(MaintenanceEvent {
                    year,
                    cost: from_f64(c.clamp(b.min, b.max)).round_dp(2),
                    description: Some("major maintenance".into()),
                });
            }
        }
        Ok(events)
    }

    fn shock_schedule<R: Rng + ?Sized>(&self, years: u32, rng: &mut R) -> Vec<MarketShock> {
        let mut shocks = Vec::new();
        for year in 1..=years {
            if rng.gen::<f64>() < self.shock_probability {
                shocks.push(MarketShock {
                    year,
                    occupancy_impact: from_f64(rng.gen_range(-0.50..-0.30)).round_dp(4),
                    rate_impact: from_f64(rng.gen_range(-0.30..-0.20)).round_dp(4),
                    value_impact: from_f64(rng.gen_range(-0.20..-0.10)).round_dp(4),
                    recovery_years: rng.gen_range(1..=3),
                });
            }
        }
        shocks
    }

    fn refinancing_schedule<R: Rng + ?Sized>(
        &self,
        ctx: &PathContext,
        rng: &mut R,
    ) -> ChaletResult<Vec<RefinancingEvent>> {
        let noise = normal(0.0, self.market_rate_std.max(f64::MIN_POSITIVE), "market_rate")?;
        let mut current = ctx.interest_rate;
        let mut events = Vec::new();
        let mut year = self.refinancing_interval_years;
        while year <= ctx.years {
            let market = (ctx.interest_rate + rng.sample(noise)).max(self.market_rate_floor);
            if current - market > self.refinancing_threshold
                && rng.gen::<f64>() < self.refinancing_acceptance
            {
                // balance at the start of `year`
                let repaid = f64::from(year - 1) * ctx.annual_amortization;
                let balance = (ctx.initial_loan - repaid).max(0.0);
                events.push(RefinancingEvent {
                    year,
                    new_rate: from_f64(market).round_dp(6),
                    cost: from_f64(balance * self.refinancing_cost_rate).round_dp(2),
                });
                current = market;
            }
            year += self.refinancing_interval_years;
        }
        Ok(events)
    }
}

/// AR(1) path of `years` values starting at `base`.
pub fn ar1_series<R: Rng + ?Sized>(
    base: f64,
    process: &Ar1Process,
    years: u32,
    rng: &mut R,
) -> ChaletResult<Vec<f64>> {
    let innovation = normal(0.0, process.innovation_std, "ar1_innovation")?;
    let mut series = Vec::with_capacity(years as usize);
    let mut prev = base;
    for t in 0..years {
        let value = if t == 0 {
            base
        } else {
            let next = base + process.reversion * (prev - base) + rng.sample(innovation);
            next.clamp(process.bounds.min, process.bounds.max)
        };
        series.push(value);
        prev = value;
    }
    Ok(series)
}

fn to_rates(series: Vec<f64>) -> Vec<Rate> {
    series.into_iter().map(|v| from_f64(v).round_dp(6)).collect()
}
