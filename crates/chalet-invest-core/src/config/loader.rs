//! Builds an [`InvestmentCase`] from a JSON document.
//!
//! A document has five required sections: `financing`, `rental`,
//! `expenses`, `seasonal` and `projection`. Scenario files usually carry
//! only the fields they change and are merged over a base document with
//! [`merge_documents`] before loading.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::base_case::{BaseCaseConfig, InvestmentCase, ProjectionAssumptions};
use super::expenses::{
    ExpenseParams, DEFAULT_MARGINAL_TAX_RATE, DEFAULT_OTA_BOOKING_PERCENTAGE, DEFAULT_OTA_FEE_RATE,
};
use super::financing::{FinancingParams, LoanTranche, DEFAULT_ACQUISITION_COST_RATE};
use super::rental::{days_in_months, RentalParams, SeasonalParams};
use crate::error::ChaletError;
use crate::ChaletResult;

pub const REQUIRED_SECTIONS: [&str; 5] = [
    "financing",
    "rental",
    "expenses",
    "seasonal",
    "projection",
];

const FINANCING_FIELDS: [&str; 5] = [
    "purchase_price",
    "ltv",
    "interest_rate",
    "amortization_rate",
    "num_owners",
];
const RENTAL_FIELDS: [&str; 2] = ["owner_nights_per_person", "days_per_year"];
const SEASON_FIELDS: [&str; 3] = ["months", "occupancy_rate", "average_daily_rate"];
const EXPENSE_FIELDS: [&str; 8] = [
    "property_management_fee_rate",
    "cleaning_cost_per_stay",
    "average_length_of_stay",
    "tourist_tax_per_person_per_night",
    "avg_guests_per_night",
    "shared_costs_annual",
    "utilities_annual",
    "maintenance_rate",
];
const PROJECTION_FIELDS: [&str; 2] = ["inflation_rate", "property_appreciation_rate"];

/// Merge `overlay` over `base`: objects merge recursively, every other
/// value in the overlay replaces the base value. Keys starting with `_`
/// are comments and are dropped from the result.
pub fn merge_documents(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut merged = Map::new();
            for (k, v) in b {
                if !k.starts_with('_') {
                    merged.insert(k.clone(), strip_comments(v));
                }
            }
            for (k, v) in o {
                if k.starts_with('_') {
                    continue;
                }
                let value = match merged.get(k) {
                    Some(existing) => merge_documents(existing, v),
                    None => strip_comments(v),
                };
                merged.insert(k.clone(), value);
            }
            Value::Object(merged)
        }
        (_, other) => strip_comments(other),
    }
}

fn strip_comments(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), strip_comments(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_comments).collect()),
        other => other.clone(),
    }
}

/// Parse and load a JSON string.
pub fn load_case_from_str(json: &str) -> ChaletResult<InvestmentCase> {
    let doc: Value = serde_json::from_str(json)?;
    load_case(&doc)
}

/// Merge an override document over a base document, then load.
pub fn load_case_with_overrides(base: &Value, overlay: &Value) -> ChaletResult<InvestmentCase> {
    debug!("merging override document over base document");
    load_case(&merge_documents(base, overlay))
}

/// Load and validate a complete document.
pub fn load_case(doc: &Value) -> ChaletResult<InvestmentCase> {
    let doc = strip_comments(doc);
    let root = doc.as_object().ok_or_else(|| {
        ChaletError::invalid("document", "Top level must be a JSON object")
    })?;
    for name in REQUIRED_SECTIONS {
        if !root.contains_key(name) {
            return Err(ChaletError::MissingField {
                section: "document".into(),
                field: name.into(),
            });
        }
    }

    let financing = load_financing(section(root, "financing")?)?;
    let rental_section = section(root, "rental")?;
    let seasonal_section = section(root, "seasonal")?;
    let rental = load_rental(rental_section, seasonal_section, financing.num_owners)?;
    let expenses = load_expenses(section(root, "expenses")?, &financing)?;
    let projection = load_projection(section(root, "projection")?)?;

    let case = InvestmentCase {
        config: BaseCaseConfig {
            financing,
            rental,
            expenses,
        },
        projection,
    };
    case.validate()?;
    debug!(
        seasons = case.config.rental.seasons.len(),
        horizon = case.projection.projection_years,
        "loaded investment case"
    );
    Ok(case)
}

fn section<'a>(root: &'a Map<String, Value>, name: &str) -> ChaletResult<&'a Map<String, Value>> {
    root.get(name)
        .and_then(Value::as_object)
        .ok_or_else(|| ChaletError::invalid(name, "Section must be a JSON object"))
}

fn require_all(map: &Map<String, Value>, section: &str, fields: &[&str]) -> ChaletResult<()> {
    for field in fields {
        if map.get(*field).map_or(true, Value::is_null) {
            return Err(ChaletError::MissingField {
                section: section.into(),
                field: (*field).into(),
            });
        }
    }
    Ok(())
}

fn decimal(map: &Map<String, Value>, section: &str, field: &str) -> ChaletResult<Decimal> {
    let value = map.get(field).ok_or_else(|| ChaletError::MissingField {
        section: section.into(),
        field: field.into(),
    })?;
    parse_decimal(value).ok_or_else(|| {
        ChaletError::invalid(
            format!("{section}.{field}"),
            format!("Expected a number, got {value}"),
        )
    })
}

fn optional_decimal(
    map: &Map<String, Value>,
    section: &str,
    field: &str,
) -> ChaletResult<Option<Decimal>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => decimal(map, section, field).map(Some),
    }
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn unsigned(map: &Map<String, Value>, section: &str, field: &str) -> ChaletResult<u32> {
    let value = decimal(map, section, field)?;
    if value.fract() != Decimal::ZERO {
        return Err(ChaletError::invalid(
            format!("{section}.{field}"),
            "Expected a whole number",
        ));
    }
    value.to_u32().ok_or_else(|| {
        ChaletError::invalid(format!("{section}.{field}"), "Expected a non-negative whole number")
    })
}

fn load_financing(map: &Map<String, Value>) -> ChaletResult<FinancingParams> {
    require_all(map, "financing", &FINANCING_FIELDS)?;
    let loan_tranches: Vec<LoanTranche> = match map.get("loan_tranches") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone()).map_err(|e| {
            ChaletError::invalid("financing.loan_tranches", e.to_string())
        })?,
        _ => Vec::new(),
    };
    Ok(FinancingParams {
        purchase_price: decimal(map, "financing", "purchase_price")?,
        ltv: decimal(map, "financing", "ltv")?,
        interest_rate: decimal(map, "financing", "interest_rate")?,
        amortization_rate: decimal(map, "financing", "amortization_rate")?,
        num_owners: unsigned(map, "financing", "num_owners")?,
        acquisition_cost_rate: optional_decimal(map, "financing", "acquisition_cost_rate")?
            .unwrap_or(DEFAULT_ACQUISITION_COST_RATE),
        loan_tranches,
        saron_reference_rate: optional_decimal(map, "financing", "saron_reference_rate")?
            .unwrap_or(Decimal::ZERO),
    })
}

fn load_rental(
    map: &Map<String, Value>,
    seasonal: &Map<String, Value>,
    num_owners: u32,
) -> ChaletResult<RentalParams> {
    require_all(map, "rental", &RENTAL_FIELDS)?;
    let owner_nights_per_person = decimal(map, "rental", "owner_nights_per_person")?;
    let days_per_year = unsigned(map, "rental", "days_per_year")?;
    let total_owner_nights = owner_nights_per_person * Decimal::from(num_owners);

    if seasonal.is_empty() {
        return Err(ChaletError::invalid("seasonal", "At least one season is required"));
    }
    let calendar_days: u32 = seasonal
        .values()
        .filter_map(|s| s.get("months"))
        .filter_map(|m| serde_json::from_value::<Vec<u32>>(m.clone()).ok())
        .map(|m| days_in_months(&m))
        .sum();

    let mut seasons = Vec::with_capacity(seasonal.len());
    for (key, value) in seasonal {
        let path = format!("seasonal.{key}");
        let s = value
            .as_object()
            .ok_or_else(|| ChaletError::invalid(&path, "Season must be a JSON object"))?;
        require_all(s, &path, &SEASON_FIELDS)?;
        let months: Vec<u32> = serde_json::from_value(s["months"].clone())
            .map_err(|_| {
                ChaletError::invalid(format!("{path}.months"), "Expected a list of months")
            })?;
        if months.is_empty() || months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(ChaletError::invalid(
                format!("{path}.months"),
                "Months must be between 1 and 12",
            ));
        }
        let days = Decimal::from(days_in_months(&months));
        let owner_nights = match optional_decimal(s, &path, "owner_nights")? {
            Some(n) => n,
            None if calendar_days > 0 => total_owner_nights * days / Decimal::from(calendar_days),
            None => Decimal::ZERO,
        };
        let nights_available = optional_decimal(s, &path, "nights_available")?
            .unwrap_or((days - owner_nights).max(Decimal::ZERO));
        seasons.push(SeasonalParams {
            name: key.clone(),
            label: s.get("name").and_then(Value::as_str).map(str::to_string),
            months,
            occupancy_rate: decimal(s, &path, "occupancy_rate")?,
            average_daily_rate: decimal(s, &path, "average_daily_rate")?,
            nights_available,
            owner_nights,
        });
    }

    let mut rental = RentalParams {
        owner_nights_per_person,
        num_owners,
        days_per_year,
        occupancy_rate: Decimal::ZERO,
        average_daily_rate: Decimal::ZERO,
        seasons,
    };
    // Legacy single-rate fields default to the season aggregate
    let rentable = rental.rentable_nights();
    let derived_occupancy = if rentable > Decimal::ZERO {
        (rental.rented_nights() / rentable).min(Decimal::ONE)
    } else {
        Decimal::ZERO
    };
    rental.occupancy_rate =
        optional_decimal(map, "rental", "occupancy_rate")?.unwrap_or(derived_occupancy);
    rental.average_daily_rate = optional_decimal(map, "rental", "average_daily_rate")?
        .unwrap_or_else(|| rental.weighted_average_daily_rate());
    Ok(rental)
}

fn load_expenses(
    map: &Map<String, Value>,
    financing: &FinancingParams,
) -> ChaletResult<ExpenseParams> {
    require_all(map, "expenses", &EXPENSE_FIELDS)?;
    let insurance_annual = match (
        optional_decimal(map, "expenses", "insurance_annual")?,
        optional_decimal(map, "expenses", "insurance_rate")?,
    ) {
        (Some(amount), _) => amount,
        (None, Some(rate)) => financing.purchase_price * rate,
        (None, None) => {
            return Err(ChaletError::MissingField {
                section: "expenses".into(),
                field: "insurance_rate".into(),
            })
        }
    };
    Ok(ExpenseParams {
        property_management_fee_rate: decimal(map, "expenses", "property_management_fee_rate")?,
        cleaning_cost_per_stay: decimal(map, "expenses", "cleaning_cost_per_stay")?,
        average_length_of_stay: decimal(map, "expenses", "average_length_of_stay")?,
        tourist_tax_per_person_per_night: decimal(
            map,
            "expenses",
            "tourist_tax_per_person_per_night",
        )?,
        avg_guests_per_night: decimal(map, "expenses", "avg_guests_per_night")?,
        insurance_annual,
        shared_costs_annual: decimal(map, "expenses", "shared_costs_annual")?,
        utilities_annual: decimal(map, "expenses", "utilities_annual")?,
        maintenance_rate: decimal(map, "expenses", "maintenance_rate")?,
        property_value: optional_decimal(map, "expenses", "property_value")?
            .unwrap_or(financing.purchase_price),
        ota_booking_percentage: optional_decimal(map, "expenses", "ota_booking_percentage")?
            .unwrap_or(DEFAULT_OTA_BOOKING_PERCENTAGE),
        ota_fee_rate: optional_decimal(map, "expenses", "ota_fee_rate")?
            .unwrap_or(DEFAULT_OTA_FEE_RATE),
        marginal_tax_rate: optional_decimal(map, "expenses", "marginal_tax_rate")?
            .unwrap_or(DEFAULT_MARGINAL_TAX_RATE),
        vat_rate: optional_decimal(map, "expenses", "vat_rate")?,
    })
}

fn load_projection(map: &Map<String, Value>) -> ChaletResult<ProjectionAssumptions> {
    require_all(map, "projection", &PROJECTION_FIELDS)?;
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| ChaletError::invalid("projection", e.to_string()))
}

/// Render a case back into document form, e.g. to seed a new scenario file.
pub fn to_document(case: &InvestmentCase) -> Value {
    let c = &case.config;
    let seasonal: Map<String, Value> = c
        .rental
        .seasons
        .iter()
        .map(|s| {
            (
                s.name.clone(),
                json!({
                    "name": s.label.clone().unwrap_or_else(|| s.name.clone()),
                    "months": s.months,
                    "occupancy_rate": s.occupancy_rate,
                    "average_daily_rate": s.average_daily_rate,
                    "owner_nights": s.owner_nights,
                    "nights_available": s.nights_available,
                }),
            )
        })
        .collect();
    let mut expenses = serde_json::to_value(&c.expenses).unwrap_or_default();
    if let Value::Object(map) = &mut expenses {
        map.insert("insurance_annual".into(), json!(c.expenses.insurance_annual));
    }
    json!({
        "financing": c.financing,
        "rental": {
            "owner_nights_per_person": c.rental.owner_nights_per_person,
            "days_per_year": c.rental.days_per_year,
            "occupancy_rate": c.rental.occupancy_rate,
            "average_daily_rate": c.rental.average_daily_rate,
        },
        "seasonal": seasonal,
        "expenses": expenses,
        "projection": case.projection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn sample_document() -> Value {
        json!({
            "_comment": "base case",
            "financing": {
                "purchase_price": 1300000,
                "ltv": 0.75,
                "interest_rate": 0.013,
                "amortization_rate": 0.01,
                "num_owners": 4
            },
            "rental": { "owner_nights_per_person": 5, "days_per_year": 365 },
            "seasonal": {
                "winter_peak": {
                    "name": "Winter",
                    "months": [12, 1, 2, 3],
                    "occupancy_rate": 0.75,
                    "average_daily_rate": 250,
                    "owner_nights": 8
                },
                "summer_peak": {
                    "name": "Summer",
                    "months": [6, 7, 8, 9],
                    "occupancy_rate": 0.65,
                    "average_daily_rate": 200,
                    "owner_nights": 7
                },
                "offpeak": {
                    "name": "Off-peak",
                    "months": [4, 5, 10, 11],
                    "occupancy_rate": 0.5,
                    "average_daily_rate": 150,
                    "owner_nights": 5
                }
            },
            "expenses": {
                "property_management_fee_rate": 0.2,
                "cleaning_cost_per_stay": 80,
                "average_length_of_stay": 1.7,
                "tourist_tax_per_person_per_night": 3.0,
                "avg_guests_per_night": 2.0,
                "insurance_rate": 0.004,
                "shared_costs_annual": 2000,
                "utilities_annual": 1000,
                "maintenance_rate": 0.01
            },
            "projection": { "inflation_rate": 0.01, "property_appreciation_rate": 0.015 }
        })
    }

    #[test]
    fn test_load_matches_default_case_numbers() {
        let case = load_case(&sample_document()).unwrap();
        let default = BaseCaseConfig::default_case();
        assert_eq!(case.config.financing, default.financing);
        assert_eq!(case.config.expenses, default.expenses);
        assert_eq!(
            case.config.rental.gross_rental_income(),
            default.rental.gross_rental_income()
        );
        assert_eq!(case.projection, ProjectionAssumptions::default());
    }

    #[test]
    fn test_missing_section() {
        let mut doc = sample_document();
        doc.as_object_mut().unwrap().remove("projection");
        match load_case(&doc) {
            Err(ChaletError::MissingField { field, .. }) => assert_eq!(field, "projection"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut doc = sample_document();
        doc["financing"].as_object_mut().unwrap().remove("ltv");
        let err = load_case(&doc).unwrap_err().to_string();
        assert!(err.contains("ltv"), "{err}");
        assert!(err.contains("financing"), "{err}");
    }

    #[test]
    fn test_range_checks() {
        let mut doc = sample_document();
        doc["financing"]["ltv"] = json!(1.0);
        assert!(load_case(&doc).is_err());

        let mut doc = sample_document();
        doc["seasonal"]["offpeak"]["occupancy_rate"] = json!(1.5);
        assert!(load_case(&doc).is_err());

        let mut doc = sample_document();
        doc["expenses"]["property_management_fee_rate"] = json!(-0.1);
        assert!(load_case(&doc).is_err());
    }

    #[test]
    fn test_merge_override_wins_and_base_fills_gaps() {
        let overlay = json!({
            "_note": "higher rates",
            "financing": { "interest_rate": 0.025 },
            "seasonal": { "winter_peak": { "average_daily_rate": 300 } }
        });
        let case = load_case_with_overrides(&sample_document(), &overlay).unwrap();
        assert_eq!(case.config.financing.interest_rate, dec!(0.025));
        assert_eq!(case.config.financing.ltv, dec!(0.75));
        let winter = case
            .config
            .rental
            .seasons
            .iter()
            .find(|s| s.name == "winter_peak")
            .unwrap();
        assert_eq!(winter.average_daily_rate, dec!(300));
        assert_eq!(winter.occupancy_rate, dec!(0.75));
    }

    #[test]
    fn test_merge_drops_comment_keys() {
        let merged = merge_documents(
            &json!({"a": 1, "_x": 2}),
            &json!({"_y": 3, "b": {"_z": 1, "c": 2}}),
        );
        assert_eq!(merged, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_document_round_trip() {
        let case = InvestmentCase::default_case();
        let reloaded = load_case(&to_document(&case)).unwrap();
        assert_eq!(reloaded.config.financing, case.config.financing);
        assert_eq!(reloaded.config.expenses, case.config.expenses);
        assert_eq!(reloaded.projection, case.projection);
    }

    #[test]
    fn test_owner_nights_default_to_calendar_share() {
        let mut doc = sample_document();
        for s in ["winter_peak", "summer_peak", "offpeak"] {
            doc["seasonal"][s].as_object_mut().unwrap().remove("owner_nights");
        }
        let case = load_case(&doc).unwrap();
        let total: Decimal = case.config.rental.seasons.iter().map(|s| s.owner_nights).sum();
        assert!((total - dec!(20)).abs() < dec!(0.000001));
    }
}
