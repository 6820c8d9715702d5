use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ChaletError;
use crate::types::{Money, Nights, Rate};
use crate::ChaletResult;

pub const DEFAULT_OTA_BOOKING_PERCENTAGE: Rate = dec!(0.5);
pub const DEFAULT_OTA_FEE_RATE: Rate = dec!(0.3);
pub const DEFAULT_MARGINAL_TAX_RATE: Rate = dec!(0.30);

/// Operating cost assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseParams {
    /// Charged on revenue after platform fees and cleaning
    pub property_management_fee_rate: Rate,
    /// Zero means cleaning is bundled into the management fee
    pub cleaning_cost_per_stay: Money,
    pub average_length_of_stay: Nights,
    pub tourist_tax_per_person_per_night: Money,
    pub avg_guests_per_night: Decimal,
    pub insurance_annual: Money,
    /// Shared building charges (water, heating, common areas)
    pub shared_costs_annual: Money,
    /// Electricity and internet
    pub utilities_annual: Money,
    /// Share of property value set aside for maintenance each year
    pub maintenance_rate: Rate,
    /// Value used for the maintenance reserve; tracks the purchase price
    /// unless overridden
    pub property_value: Money,
    #[serde(default = "default_ota_booking_percentage")]
    pub ota_booking_percentage: Rate,
    #[serde(default = "default_ota_fee_rate")]
    pub ota_fee_rate: Rate,
    #[serde(default = "default_marginal_tax_rate")]
    pub marginal_tax_rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<Rate>,
}

fn default_ota_booking_percentage() -> Rate {
    DEFAULT_OTA_BOOKING_PERCENTAGE
}

fn default_ota_fee_rate() -> Rate {
    DEFAULT_OTA_FEE_RATE
}

fn default_marginal_tax_rate() -> Rate {
    DEFAULT_MARGINAL_TAX_RATE
}

impl ExpenseParams {
    pub fn maintenance_reserve(&self) -> Money {
        self.property_value * self.maintenance_rate
    }

    pub fn property_management_cost(&self, fee_base: Money) -> Money {
        fee_base * self.property_management_fee_rate
    }

    pub fn validate(&self) -> ChaletResult<()> {
        let unit_rates = [
            ("expenses.property_management_fee_rate", self.property_management_fee_rate),
            ("expenses.ota_booking_percentage", self.ota_booking_percentage),
            ("expenses.ota_fee_rate", self.ota_fee_rate),
            ("expenses.marginal_tax_rate", self.marginal_tax_rate),
        ];
        for (field, value) in unit_rates {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(ChaletError::invalid(
                    field,
                    format!("Must be between 0 and 1 (got {value})"),
                ));
            }
        }

        let non_negative = [
            ("expenses.cleaning_cost_per_stay", self.cleaning_cost_per_stay),
            ("expenses.tourist_tax_per_person_per_night", self.tourist_tax_per_person_per_night),
            ("expenses.avg_guests_per_night", self.avg_guests_per_night),
            ("expenses.insurance_annual", self.insurance_annual),
            ("expenses.shared_costs_annual", self.shared_costs_annual),
            ("expenses.utilities_annual", self.utilities_annual),
            ("expenses.maintenance_rate", self.maintenance_rate),
            ("expenses.property_value", self.property_value),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(ChaletError::invalid(field, "Cannot be negative"));
            }
        }

        if self.cleaning_cost_per_stay > Decimal::ZERO
            && self.average_length_of_stay <= Decimal::ZERO
        {
            return Err(ChaletError::invalid(
                "expenses.average_length_of_stay",
                "Must be positive when cleaning is charged per stay",
            ));
        }
        if let Some(vat) = self.vat_rate {
            if vat < Decimal::ZERO || vat > Decimal::ONE {
                return Err(ChaletError::invalid(
                    "expenses.vat_rate",
                    "VAT rate must be between 0 and 1",
                ));
            }
        }
        Ok(())
    }
}
