use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ChaletError;
use crate::types::{Money, Nights, Rate};
use crate::ChaletResult;

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Days in the given calendar months (1 = January), non-leap year.
pub fn days_in_months(months: &[u32]) -> u32 {
    months
        .iter()
        .filter(|m| (1..=12).contains(*m))
        .map(|m| DAYS_IN_MONTH[(*m - 1) as usize])
        .sum()
}

/// A rental season with its own occupancy and nightly rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalParams {
    /// Identifier, e.g. "winter_peak"
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Calendar months (1-12)
    pub months: Vec<u32>,
    pub occupancy_rate: Rate,
    pub average_daily_rate: Money,
    /// Nights open to guests, already net of owner nights in the season
    pub nights_available: Nights,
    /// Owner nights reserved inside this season
    #[serde(default)]
    pub owner_nights: Nights,
}

impl SeasonalParams {
    /// Calendar length of the season in nights.
    pub fn season_nights(&self) -> Nights {
        self.nights_available + self.owner_nights
    }

    pub fn rented_nights(&self) -> Nights {
        self.nights_available * self.occupancy_rate
    }

    pub fn income(&self) -> Money {
        self.rented_nights() * self.average_daily_rate
    }
}

/// Per-season line of the annual result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalBreakdown {
    pub name: String,
    pub nights_available: Nights,
    pub occupancy_rate: Rate,
    pub average_daily_rate: Money,
    pub rented_nights: Nights,
    pub income: Money,
}

/// Rental capacity and pricing.
///
/// When `seasons` is non-empty it replaces the legacy single
/// occupancy/rate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalParams {
    pub owner_nights_per_person: Nights,
    pub num_owners: u32,
    pub days_per_year: u32,
    /// Legacy whole-year occupancy
    pub occupancy_rate: Rate,
    /// Legacy whole-year nightly rate
    pub average_daily_rate: Money,
    #[serde(default)]
    pub seasons: Vec<SeasonalParams>,
}

impl RentalParams {
    pub fn is_seasonal(&self) -> bool {
        !self.seasons.is_empty()
    }

    pub fn total_owner_nights(&self) -> Nights {
        self.owner_nights_per_person * Decimal::from(self.num_owners)
    }

    pub fn rentable_nights(&self) -> Nights {
        (Decimal::from(self.days_per_year) - self.total_owner_nights()).max(Decimal::ZERO)
    }

    pub fn rented_nights(&self) -> Nights {
        if self.is_seasonal() {
            self.seasons.iter().map(|s| s.rented_nights()).sum()
        } else {
            self.rentable_nights() * self.occupancy_rate
        }
    }

    pub fn gross_rental_income(&self) -> Money {
        if self.is_seasonal() {
            self.seasons.iter().map(|s| s.income()).sum()
        } else {
            self.rented_nights() * self.average_daily_rate
        }
    }

    /// Revenue-weighted nightly rate; falls back to the plain mean when
    /// nothing is rented.
    pub fn weighted_average_daily_rate(&self) -> Money {
        if !self.is_seasonal() {
            return self.average_daily_rate;
        }
        let nights = self.rented_nights();
        if nights > Decimal::ZERO {
            return self.gross_rental_income() / nights;
        }
        let sum: Money = self.seasons.iter().map(|s| s.average_daily_rate).sum();
        sum / Decimal::from(self.seasons.len() as u64)
    }

    pub fn seasonal_breakdown(&self) -> Vec<SeasonalBreakdown> {
        self.seasons
            .iter()
            .map(|s| SeasonalBreakdown {
                name: s.name.clone(),
                nights_available: s.nights_available,
                occupancy_rate: s.occupancy_rate,
                average_daily_rate: s.average_daily_rate,
                rented_nights: s.rented_nights(),
                income: s.income(),
            })
            .collect()
    }

    pub fn validate(&self) -> ChaletResult<()> {
        if self.num_owners < 1 {
            return Err(ChaletError::invalid(
                "rental.num_owners",
                "At least one owner is required",
            ));
        }
        if self.owner_nights_per_person < Decimal::ZERO {
            return Err(ChaletError::invalid(
                "rental.owner_nights_per_person",
                "Owner nights cannot be negative",
            ));
        }
        if self.days_per_year == 0 {
            return Err(ChaletError::invalid(
                "rental.days_per_year",
                "Days per year must be positive",
            ));
        }
        check_occupancy("rental.occupancy_rate", self.occupancy_rate)?;
        if self.average_daily_rate < Decimal::ZERO {
            return Err(ChaletError::invalid(
                "rental.average_daily_rate",
                "Daily rate cannot be negative",
            ));
        }
        for s in &self.seasons {
            check_occupancy(&format!("seasonal.{}.occupancy_rate", s.name), s.occupancy_rate)?;
            if s.average_daily_rate < Decimal::ZERO {
                return Err(ChaletError::invalid(
                    format!("seasonal.{}.average_daily_rate", s.name),
                    "Daily rate cannot be negative",
                ));
            }
            if s.nights_available < Decimal::ZERO {
                return Err(ChaletError::invalid(
                    format!("seasonal.{}.nights_available", s.name),
                    "Available nights cannot be negative",
                ));
            }
        }
        Ok(())
    }
}

fn check_occupancy(field: &str, value: Rate) -> ChaletResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ChaletError::invalid(
            field,
            format!("Occupancy must be between 0 and 1 (got {value})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn season(
        name: &str,
        months: Vec<u32>,
        occ: Rate,
        adr: Money,
        owner: Nights,
    ) -> SeasonalParams {
        let nights = Decimal::from(days_in_months(&months)) - owner;
        SeasonalParams {
            name: name.into(),
            label: None,
            months,
            occupancy_rate: occ,
            average_daily_rate: adr,
            nights_available: nights,
            owner_nights: owner,
        }
    }

    fn sample_rental() -> RentalParams {
        RentalParams {
            owner_nights_per_person: dec!(5),
            num_owners: 4,
            days_per_year: 365,
            occupancy_rate: dec!(0.63),
            average_daily_rate: dec!(200),
            seasons: vec![
                season("winter_peak", vec![12, 1, 2, 3], dec!(0.75), dec!(250), dec!(8)),
                season("summer_peak", vec![6, 7, 8, 9], dec!(0.65), dec!(200), dec!(7)),
                season("offpeak", vec![4, 5, 10, 11], dec!(0.50), dec!(150), dec!(5)),
            ],
        }
    }

    #[test]
    fn test_days_in_months() {
        assert_eq!(days_in_months(&[12, 1, 2, 3]), 121);
        assert_eq!(days_in_months(&[6, 7, 8, 9]), 122);
        assert_eq!(days_in_months(&[4, 5, 10, 11]), 122);
    }

    #[test]
    fn test_seasonal_aggregation() {
        let r = sample_rental();
        // 113 * 0.75 + 115 * 0.65 + 117 * 0.5
        assert_eq!(r.rented_nights(), dec!(218));
        // 84.75 * 250 + 74.75 * 200 + 58.5 * 150
        assert_eq!(r.gross_rental_income(), dec!(44912.5));
        assert_eq!(r.total_owner_nights(), dec!(20));
        assert_eq!(r.rentable_nights(), dec!(345));
    }

    #[test]
    fn test_legacy_mode() {
        let mut r = sample_rental();
        r.seasons.clear();
        assert_eq!(r.rented_nights(), dec!(345) * dec!(0.63));
        assert_eq!(r.gross_rental_income(), dec!(345) * dec!(0.63) * dec!(200));
        assert_eq!(r.weighted_average_daily_rate(), dec!(200));
    }

    #[test]
    fn test_weighted_rate_with_no_rentals_is_plain_mean() {
        let mut r = sample_rental();
        for s in &mut r.seasons {
            s.occupancy_rate = Decimal::ZERO;
        }
        assert_eq!(r.weighted_average_daily_rate(), dec!(200));
    }

    #[test]
    fn test_occupancy_out_of_range() {
        let mut r = sample_rental();
        r.seasons[1].occupancy_rate = dec!(1.2);
        let err = r.validate().unwrap_err().to_string();
        assert!(err.contains("seasonal.summer_peak.occupancy_rate"));
    }
}
