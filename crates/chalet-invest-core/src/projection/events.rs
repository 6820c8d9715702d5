//! Scheduled overlays for the multi-year projection.
//!
//! Years are 1-based projection indices (year 1 is the first projected
//! year), not calendar years.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ChaletError;
use crate::types::{from_f64, to_f64, Money, Rate};
use crate::ChaletResult;

/// A downturn hitting occupancy, nightly rates and property value at once.
///
/// Impacts are signed fractions, e.g. `-0.4` for a 40% drop. The full hit
/// lasts one year past the shock year before the multipliers move
/// linearly back to 1.0 over `recovery_years`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShock {
    pub year: u32,
    pub occupancy_impact: Rate,
    pub rate_impact: Rate,
    pub value_impact: Rate,
    pub recovery_years: u32,
}

/// Multipliers in effect for one year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShockMultipliers {
    pub occupancy: Decimal,
    pub rate: Decimal,
    pub value: Decimal,
}

impl ShockMultipliers {
    pub const NONE: ShockMultipliers = ShockMultipliers {
        occupancy: Decimal::ONE,
        rate: Decimal::ONE,
        value: Decimal::ONE,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NONE
    }
}

impl MarketShock {
    /// Multipliers this shock contributes in `year`.
    ///
    /// The full impact holds in the shock year and the first recovery year,
    /// then closes linearly: recovery year `j` carries `(j - 1) / recovery_years`
    /// of the way back to 1, and the year after the last is unaffected.
    pub fn multipliers(&self, year: u32) -> ShockMultipliers {
        if year < self.year {
            return ShockMultipliers::NONE;
        }
        let elapsed = year - self.year;
        if elapsed > self.recovery_years {
            return ShockMultipliers::NONE;
        }
        let recovered = elapsed.saturating_sub(1);
        let progress = if recovered == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(recovered) / Decimal::from(self.recovery_years)
        };
        let lerp = |impact: Rate| {
            let m = Decimal::ONE + impact;
            m + (Decimal::ONE - m) * progress
        };
        ShockMultipliers {
            occupancy: lerp(self.occupancy_impact),
            rate: lerp(self.rate_impact),
            value: lerp(self.value_impact),
        }
    }
}

/// Switch the whole loan to `new_rate` from `year` onward, paying `cost`
/// once in that year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinancingEvent {
    pub year: u32,
    pub new_rate: Rate,
    #[serde(default)]
    pub cost: Money,
}

/// One-off capital expense such as a roof or heating replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub year: u32,
    pub cost: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Sinusoidal path for the SARON reference rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaronCycle {
    pub min_rate: Rate,
    pub max_rate: Rate,
    pub cycle_years: u32,
}

impl SaronCycle {
    /// Fixing for projection year `year` (1-based).
    pub fn rate_for_year(&self, year: u32) -> Rate {
        let cycle = f64::from(self.cycle_years.max(1));
        let phase = 2.0 * std::f64::consts::PI * f64::from(year.saturating_sub(1)) / cycle;
        let position = from_f64((phase.sin() + 1.0) / 2.0);
        self.min_rate + (self.max_rate - self.min_rate) * position
    }
}

/// Everything that can be layered over the plain projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionEvents {
    #[serde(default)]
    pub market_shocks: Vec<MarketShock>,
    #[serde(default)]
    pub refinancings: Vec<RefinancingEvent>,
    #[serde(default)]
    pub maintenance: Vec<MaintenanceEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saron_cycle: Option<SaronCycle>,
}

impl ProjectionEvents {
    pub fn is_empty(&self) -> bool {
        self.market_shocks.is_empty()
            && self.refinancings.is_empty()
            && self.maintenance.is_empty()
            && self.saron_cycle.is_none()
    }

    /// Combined multipliers of all shocks touching `year`.
    pub fn shock_multipliers(&self, year: u32) -> ShockMultipliers {
        self.market_shocks
            .iter()
            .map(|s| s.multipliers(year))
            .fold(ShockMultipliers::NONE, |acc, m| ShockMultipliers {
                occupancy: acc.occupancy * m.occupancy,
                rate: acc.rate * m.rate,
                value: acc.value * m.value,
            })
    }

    pub fn refinancing_in(&self, year: u32) -> Option<&RefinancingEvent> {
        self.refinancings.iter().find(|r| r.year == year)
    }

    pub fn maintenance_cost(&self, year: u32) -> Money {
        self.maintenance
            .iter()
            .filter(|m| m.year == year)
            .map(|m| m.cost)
            .sum()
    }

    pub fn validate(&self) -> ChaletResult<()> {
        for s in &self.market_shocks {
            if s.year == 0 {
                return Err(ChaletError::invalid("market_shocks.year", "Years start at 1"));
            }
            for (field, impact) in [
                ("market_shocks.occupancy_impact", s.occupancy_impact),
                ("market_shocks.rate_impact", s.rate_impact),
                ("market_shocks.value_impact", s.value_impact),
            ] {
                if impact <= -Decimal::ONE || impact > Decimal::ZERO {
                    return Err(ChaletError::invalid(
                        field,
                        format!("Impact must be in (-1, 0] (got {impact})"),
                    ));
                }
            }
        }
        for r in &self.refinancings {
            if r.year == 0 || r.new_rate < Decimal::ZERO || r.cost < Decimal::ZERO {
                return Err(ChaletError::invalid(
                    "refinancings",
                    "Year must be at least 1, rate and cost non-negative",
                ));
            }
        }
        for m in &self.maintenance {
            if m.year == 0 || m.cost < Decimal::ZERO {
                return Err(ChaletError::invalid(
                    "maintenance",
                    "Year must be at least 1 and cost non-negative",
                ));
            }
        }
        if let Some(c) = &self.saron_cycle {
            if c.cycle_years == 0 || c.max_rate < c.min_rate {
                return Err(ChaletError::invalid(
                    "saron_cycle",
                    "Cycle length must be positive and max_rate >= min_rate",
                ));
            }
        }
        Ok(())
    }
}

/// Debug helper used in logs.
pub(crate) fn describe_multipliers(m: &ShockMultipliers) -> String {
    format!(
        "occ x{:.2} rate x{:.2} value x{:.2}",
        to_f64(m.occupancy),
        to_f64(m.rate),
        to_f64(m.value)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_shock() -> MarketShock {
        MarketShock {
            year: 3,
            occupancy_impact: dec!(-0.4),
            rate_impact: dec!(-0.2),
            value_impact: dec!(-0.1),
            recovery_years: 2,
        }
    }

    #[test]
    fn test_shock_year_and_recovery() {
        let s = sample_shock();
        assert!(s.multipliers(2).is_neutral());
        assert_eq!(s.multipliers(3).occupancy, dec!(0.6));
        // first recovery year still carries the full hit
        assert_eq!(s.multipliers(4).occupancy, dec!(0.6));
        assert_eq!(s.multipliers(4).value, dec!(0.9));
        assert_eq!(s.multipliers(5).occupancy, dec!(0.8));
        assert_eq!(s.multipliers(5).rate, dec!(0.9));
        assert!(s.multipliers(6).is_neutral());
        assert!(s.multipliers(7).is_neutral());
    }

    #[test]
    fn test_single_recovery_year_holds_then_clears() {
        let mut s = sample_shock();
        s.recovery_years = 1;
        assert_eq!(s.multipliers(4).occupancy, dec!(0.6));
        assert!(s.multipliers(5).is_neutral());
    }

    #[test]
    fn test_shock_without_recovery_lasts_one_year() {
        let mut s = sample_shock();
        s.recovery_years = 0;
        assert_eq!(s.multipliers(3).value, dec!(0.9));
        assert!(s.multipliers(4).is_neutral());
    }

    #[test]
    fn test_saron_cycle_bounds() {
        let c = SaronCycle {
            min_rate: dec!(0.005),
            max_rate: dec!(0.025),
            cycle_years: 8,
        };
        // Year 1 sits mid-cycle
        assert!((c.rate_for_year(1) - dec!(0.015)).abs() < dec!(0.000001));
        // Quarter cycle later reaches the top
        assert!((c.rate_for_year(3) - dec!(0.025)).abs() < dec!(0.000001));
        for y in 1..=16 {
            let r = c.rate_for_year(y);
            assert!(r >= dec!(0.005) - dec!(0.000001) && r <= dec!(0.025) + dec!(0.000001));
        }
    }

    #[test]
    fn test_event_lookup() {
        let events = ProjectionEvents {
            maintenance: vec![
                MaintenanceEvent { year: 5, cost: dec!(20000), description: Some("Roof".into()) },
                MaintenanceEvent { year: 5, cost: dec!(5000), description: None },
            ],
            refinancings: vec![RefinancingEvent {
                year: 6,
                new_rate: dec!(0.02),
                cost: dec!(1000),
            }],
            ..Default::default()
        };
        assert_eq!(events.maintenance_cost(5), dec!(25000));
        assert_eq!(events.maintenance_cost(4), Decimal::ZERO);
        assert!(events.refinancing_in(6).is_some());
        assert!(events.refinancing_in(7).is_none());
        events.validate().unwrap();
    }

    #[test]
    fn test_positive_impact_rejected() {
        let mut s = sample_shock();
        s.rate_impact = dec!(0.1);
        let events = ProjectionEvents {
            market_shocks: vec![s],
            ..Default::default()
        };
        assert!(events.validate().is_err());
    }
}
