use serde::{Deserialize, Serialize};
use std::fmt;

// ============ Valuation Input ============

/// Declared condition of the vehicle.
///
/// Carried through the valuation request but not weighted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Registration status of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarStatus {
    /// Unregistered, never sold to an end user.
    New,
    Used,
}

impl fmt::Display for CarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarStatus::New => write!(f, "New"),
            CarStatus::Used => write!(f, "Used"),
        }
    }
}

impl std::str::FromStr for CarStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(CarStatus::New),
            "used" => Ok(CarStatus::Used),
            other => Err(format!("unknown car status '{}', expected New or Used", other)),
        }
    }
}

/// Vehicle description submitted by a seller asking for a valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationInput {
    /// Manufacturer, e.g. "Toyota".
    pub make: String,
    /// Model name, e.g. "Hilux".
    pub model: String,
    /// Model year.
    pub year: i32,
    /// Odometer reading in kilometers.
    pub mileage: i64,
    pub condition: CarCondition,
    /// Refines the base price lookup; empty means unknown.
    #[serde(default, alias = "fuelType")]
    pub fuel_type: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    pub car_status: CarStatus,
    #[serde(default)]
    pub city: Option<String>,
}

// ============ Base Price ============

/// Vehicle type discriminator sent with every valuation lookup.
pub const VEHICLE_TYPE_CAR: &str = "car";

/// Parameters of a single `get_base_price` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasePriceQuery {
    #[serde(rename = "p_make")]
    pub make: String,
    #[serde(rename = "p_model")]
    pub model: String,
    #[serde(rename = "p_year")]
    pub year: i32,
    #[serde(rename = "p_vehicle_type")]
    pub vehicle_type: String,
    #[serde(rename = "p_fuel_type")]
    pub fuel_type: Option<String>,
}

impl BasePriceQuery {
    /// Builds the lookup for a car valuation. Blank fuel types are sent as null.
    pub fn for_car(input: &ValuationInput) -> Self {
        Self {
            make: input.make.clone(),
            model: input.model.clone(),
            year: input.year,
            vehicle_type: VEHICLE_TYPE_CAR.to_string(),
            fuel_type: input
                .fuel_type
                .as_ref()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        }
    }
}

/// Median market price for a make/model/year, as answered by the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasePriceStatistic {
    /// Median observed or estimated price, in the marketplace currency.
    pub base_price: f64,
    /// Number of real listings the median was derived from.
    pub comparables_count: u32,
    /// Confidence in the base price, 0-100.
    pub confidence: u8,
}

impl BasePriceStatistic {
    /// Conservative statistic used when the lookup has no data.
    pub const FALLBACK: BasePriceStatistic = BasePriceStatistic {
        base_price: 6000.0,
        comparables_count: 0,
        confidence: 20,
    };

    /// True when the price is usable as a median.
    pub fn is_usable(&self) -> bool {
        self.base_price.is_finite() && self.base_price > 0.0
    }
}

// ============ Valuation Output ============

/// Price estimate bundle returned to the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub estimated_market_value_min: i64,
    pub estimated_market_value_max: i64,
    /// Lower anchor for a seller who wants a quick sale.
    pub fast_sale_price: i64,
    /// Upper anchor for a patient, dealer-style listing.
    pub dealer_listing_price: i64,
    /// At most two labels for the strongest adjustments, in application order.
    pub key_influencers: Vec<String>,
    pub summary: String,
    pub confidence_score: u8,
}

// ============ Vehicle Catalog ============

/// Row of `vehicle_models` projected to the make.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct VehicleMakeRow {
    pub make_name: String,
}

/// Row of `vehicle_models` projected to the model name.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct VehicleModelRow {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(fuel: Option<&str>) -> ValuationInput {
        ValuationInput {
            make: "Mazda".to_string(),
            model: "Demio".to_string(),
            year: 2015,
            mileage: 120_000,
            condition: CarCondition::Fair,
            fuel_type: fuel.map(str::to_string),
            transmission: None,
            car_status: CarStatus::Used,
            city: None,
        }
    }

    #[test]
    fn test_blank_fuel_type_is_sent_as_null() {
        assert_eq!(BasePriceQuery::for_car(&input(Some("  "))).fuel_type, None);
        assert_eq!(BasePriceQuery::for_car(&input(None)).fuel_type, None);
        assert_eq!(
            BasePriceQuery::for_car(&input(Some("Diesel"))).fuel_type,
            Some("Diesel".to_string())
        );
    }

    #[test]
    fn test_query_serializes_as_rpc_arguments() {
        let body = serde_json::to_value(BasePriceQuery::for_car(&input(None))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "p_make": "Mazda",
                "p_model": "Demio",
                "p_year": 2015,
                "p_vehicle_type": "car",
                "p_fuel_type": null
            })
        );
    }

    #[test]
    fn test_input_accepts_storefront_field_names() {
        let parsed: ValuationInput = serde_json::from_value(serde_json::json!({
            "make": "Toyota",
            "model": "Hilux",
            "year": 2020,
            "mileage": 50000,
            "condition": "Good",
            "fuelType": "Petrol",
            "transmission": "Auto",
            "car_status": "Used",
            "city": "Harare"
        }))
        .unwrap();

        assert_eq!(parsed.fuel_type.as_deref(), Some("Petrol"));
        assert_eq!(parsed.car_status, CarStatus::Used);
        assert_eq!(parsed.condition, CarCondition::Good);
    }

    #[test]
    fn test_car_status_parsing() {
        assert_eq!("new".parse::<CarStatus>(), Ok(CarStatus::New));
        assert_eq!(" Used ".parse::<CarStatus>(), Ok(CarStatus::Used));
        assert!("demo".parse::<CarStatus>().is_err());
    }

    #[test]
    fn test_fallback_is_usable() {
        assert!(BasePriceStatistic::FALLBACK.is_usable());
        let zero = BasePriceStatistic {
            base_price: 0.0,
            ..BasePriceStatistic::FALLBACK
        };
        assert!(!zero.is_usable());
    }
}
