use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::base_case::BaseCaseConfig;
use super::financing::TrancheRate;
use crate::error::ChaletError;
use crate::types::{Money, Nights, Rate};
use crate::ChaletResult;

/// A sparse set of field overrides. Unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltv: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amortization_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_owners: Option<u32>,
    /// Applied to every season and to the legacy field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy_rate: Option<Rate>,
    /// Seasonal rates are rescaled so their weighted average hits this value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_daily_rate: Option<Money>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub season_occupancy: BTreeMap<String, Rate>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub season_rates: BTreeMap<String, Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_fee_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaning_cost_per_stay: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_length_of_stay: Option<Nights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_guests_per_night: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tourist_tax_per_person_per_night: Option<Money>,
    /// Insurance as a share of the (possibly overridden) purchase price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_costs_annual: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilities_annual: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_nights_per_person: Option<Nights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ota_booking_percentage: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ota_fee_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marginal_tax_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<Rate>,
    /// Combined share of SARON tranches; fixed tranches absorb the rest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saron_share: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saron_margin: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saron_reference_rate: Option<Rate>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ConfigOverrides::default()
    }
}

/// Build a new config from `base` with `o` applied, then validate it.
pub fn apply_overrides(base: &BaseCaseConfig, o: &ConfigOverrides) -> ChaletResult<BaseCaseConfig> {
    let mut config = base.clone();

    // Financing
    let f = &mut config.financing;
    if let Some(price) = o.purchase_price {
        f.purchase_price = price;
        config.expenses.property_value = price;
    }
    set(&mut f.ltv, o.ltv);
    set(&mut f.amortization_rate, o.amortization_rate);
    set(&mut f.saron_reference_rate, o.saron_reference_rate);
    if let Some(share) = o.saron_share {
        rebalance_saron_share(&mut config, share)?;
    }
    if let Some(margin) = o.saron_margin {
        set_saron_margin(&mut config, margin)?;
    }
    if let Some(rate) = o.interest_rate {
        set_blended_rate(&mut config, rate);
    }

    // Owners and owner nights
    let owners_before = config.rental.total_owner_nights();
    if let Some(n) = o.num_owners {
        config.financing.num_owners = n;
        config.rental.num_owners = n;
    }
    set(&mut config.rental.owner_nights_per_person, o.owner_nights_per_person);
    if o.num_owners.is_some() || o.owner_nights_per_person.is_some() {
        redistribute_owner_nights(&mut config, owners_before);
    }

    // Revenue
    if let Some(occ) = o.occupancy_rate {
        config.rental.occupancy_rate = occ;
        for s in &mut config.rental.seasons {
            s.occupancy_rate = occ;
        }
    }
    if let Some(adr) = o.average_daily_rate {
        let current = config.rental.weighted_average_daily_rate();
        config.rental.average_daily_rate = adr;
        for s in &mut config.rental.seasons {
            s.average_daily_rate = if current > Decimal::ZERO {
                s.average_daily_rate * adr / current
            } else {
                adr
            };
        }
    }
    for (name, occ) in &o.season_occupancy {
        season_mut(&mut config, name)?.occupancy_rate = *occ;
    }
    for (name, adr) in &o.season_rates {
        season_mut(&mut config, name)?.average_daily_rate = *adr;
    }

    // Expenses
    let price = config.financing.purchase_price;
    let e = &mut config.expenses;
    set(&mut e.property_management_fee_rate, o.management_fee_rate);
    set(&mut e.cleaning_cost_per_stay, o.cleaning_cost_per_stay);
    set(&mut e.average_length_of_stay, o.average_length_of_stay);
    set(&mut e.avg_guests_per_night, o.avg_guests_per_night);
    set(&mut e.tourist_tax_per_person_per_night, o.tourist_tax_per_person_per_night);
    if let Some(rate) = o.insurance_rate {
        e.insurance_annual = price * rate;
    }
    set(&mut e.shared_costs_annual, o.shared_costs_annual);
    set(&mut e.utilities_annual, o.utilities_annual);
    set(&mut e.maintenance_rate, o.maintenance_rate);
    set(&mut e.property_value, o.property_value);
    set(&mut e.ota_booking_percentage, o.ota_booking_percentage);
    set(&mut e.ota_fee_rate, o.ota_fee_rate);
    set(&mut e.marginal_tax_rate, o.marginal_tax_rate);
    if o.vat_rate.is_some() {
        e.vat_rate = o.vat_rate;
    }

    config.validate()?;
    Ok(config)
}

fn set<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn season_mut<'a>(
    config: &'a mut BaseCaseConfig,
    name: &str,
) -> ChaletResult<&'a mut super::rental::SeasonalParams> {
    config
        .rental
        .seasons
        .iter_mut()
        .find(|s| s.name == name)
        .ok_or_else(|| ChaletError::invalid(format!("seasonal.{name}"), "Unknown season"))
}

/// Spread the new owner-night total across seasons, keeping each
/// season's calendar length fixed.
fn redistribute_owner_nights(config: &mut BaseCaseConfig, previous_total: Nights) {
    let new_total = config.rental.total_owner_nights();
    let seasons = &mut config.rental.seasons;
    if seasons.is_empty() {
        return;
    }
    let calendar: Nights = seasons.iter().map(|s| s.season_nights()).sum();
    for s in seasons.iter_mut() {
        let days = s.season_nights();
        let owner = if previous_total > Decimal::ZERO {
            s.owner_nights * new_total / previous_total
        } else if calendar > Decimal::ZERO {
            new_total * days / calendar
        } else {
            Decimal::ZERO
        };
        let owner = owner.min(days).max(Decimal::ZERO);
        s.owner_nights = owner;
        s.nights_available = days - owner;
    }
}

/// Move the blended mortgage rate to `target`. With tranches, every coupon
/// component (fixed rates, SARON margins and fixing) is scaled by the same
/// factor so the tranche mix is preserved.
fn set_blended_rate(config: &mut BaseCaseConfig, target: Rate) {
    let f = &mut config.financing;
    f.interest_rate = target;
    if f.loan_tranches.is_empty() {
        return;
    }
    let current = f.effective_interest_rate();
    if current > Decimal::ZERO {
        let factor = target / current;
        f.saron_reference_rate *= factor;
        for t in &mut f.loan_tranches {
            match &mut t.rate {
                TrancheRate::Fixed { rate } => *rate *= factor,
                TrancheRate::Saron { margin } => *margin *= factor,
            }
        }
    } else {
        let fixing = f.saron_reference_rate.max(Decimal::ZERO);
        for t in &mut f.loan_tranches {
            t.rate = match t.rate {
                TrancheRate::Fixed { .. } => TrancheRate::Fixed { rate: target },
                TrancheRate::Saron { .. } => TrancheRate::Saron {
                    margin: target - fixing,
                },
            };
        }
    }
}

fn rebalance_saron_share(config: &mut BaseCaseConfig, target: Rate) -> ChaletResult<()> {
    let f = &mut config.financing;
    let saron = f.saron_share();
    let fixed = Decimal::ONE - saron;
    if f.loan_tranches.is_empty() || saron.is_zero() || fixed <= Decimal::ZERO {
        return Err(ChaletError::invalid(
            "financing.loan_tranches",
            "SARON share override needs both SARON and fixed tranches",
        ));
    }
    for t in &mut f.loan_tranches {
        t.share_of_loan = if t.is_saron() {
            t.share_of_loan * target / saron
        } else {
            t.share_of_loan * (Decimal::ONE - target) / fixed
        };
    }
    Ok(())
}

fn set_saron_margin(config: &mut BaseCaseConfig, margin: Rate) -> ChaletResult<()> {
    let mut found = false;
    for t in &mut config.financing.loan_tranches {
        if let TrancheRate::Saron { margin: m } = &mut t.rate {
            *m = margin;
            found = true;
        }
    }
    if !found {
        return Err(ChaletError::invalid(
            "financing.loan_tranches",
            "SARON margin override needs a SARON tranche",
        ));
    }
    Ok(())
}
