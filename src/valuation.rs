//! Car valuation engine.
//!
//! Turns a vehicle description plus a market base price into a bounded price
//! band. The pipeline is deterministic: one lookup, then a fixed sequence of
//! multiplicative adjustments, a hard clamp and final rounding.

use crate::errors::{AppError, LookupError};
use crate::models::{
    BasePriceQuery, BasePriceStatistic, CarStatus, ValuationInput, ValuationResult,
};
use chrono::Datelike;
use std::future::Future;

/// Multiplier the pipeline starts from, 10% under the raw median.
const BASE_MULTIPLIER: f64 = 0.90;
/// Assumed yearly usage, in kilometers.
const ANNUAL_MILEAGE_KM: f64 = 17_500.0;
/// Multiplier shift per 10,000 km of distance from the expected mileage.
const MILEAGE_STEP: f64 = 0.005;
/// Mileage shifts beyond this are reported as an influencer.
const MILEAGE_INFLUENCER_THRESHOLD: f64 = 0.02;
const NEW_PREMIUM: f64 = 1.08;
const USED_DISCOUNT: f64 = 0.93;
const BRAND_PREMIUM: f64 = 1.02;
/// Makes with strong resale demand in the local market.
const HIGH_DEMAND_MAKES: [&str; 4] = ["Toyota", "Nissan", "Mazda", "Honda"];
const MIN_MULTIPLIER: f64 = 0.60;
const MAX_MULTIPLIER: f64 = 1.15;
const RANGE_LOW: f64 = 0.90;
const RANGE_HIGH: f64 = 1.03;
/// No estimate goes below this, whatever the inputs.
const PRICE_FLOOR: f64 = 2500.0;
const FAST_SALE_FACTOR: f64 = 0.90;
const MAX_INFLUENCERS: usize = 2;

/// Source of market base prices.
///
/// `Ok(None)` means the source answered with no matching rows.
pub trait BasePriceLookup {
    fn base_price(
        &self,
        query: BasePriceQuery,
    ) -> impl Future<Output = Result<Option<BasePriceStatistic>, LookupError>> + Send;
}

/// Adjustments applied to the median before the price band is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    /// Clamped multiplier applied to the median.
    pub multiplier: f64,
    /// Every influencer label, in application order.
    pub influencers: Vec<String>,
}

/// Runs the adjustment pipeline for a vehicle valued in `current_year`.
pub fn adjust(input: &ValuationInput, current_year: i32) -> Adjustment {
    let mut multiplier = BASE_MULTIPLIER;
    let mut influencers = Vec::new();

    let age = current_year.saturating_sub(input.year).max(1) as f64;
    let expected_mileage = age * ANNUAL_MILEAGE_KM;
    let mileage_variance = (expected_mileage - input.mileage as f64) / 10_000.0;
    let mileage_adj = mileage_variance * MILEAGE_STEP;
    multiplier += mileage_adj;

    if mileage_adj.abs() > MILEAGE_INFLUENCER_THRESHOLD {
        let label = if mileage_adj > 0.0 {
            "Below average mileage"
        } else {
            "Higher mileage for age"
        };
        influencers.push(label.to_string());
    }

    match input.car_status {
        CarStatus::New => {
            multiplier *= NEW_PREMIUM;
            influencers.push("Unregistered vehicle premium".to_string());
        }
        CarStatus::Used => {
            multiplier *= USED_DISCOUNT;
            influencers.push("Used vehicle pricing".to_string());
        }
    }

    if HIGH_DEMAND_MAKES.contains(&input.make.as_str()) {
        multiplier *= BRAND_PREMIUM;
        influencers.push(format!("{} strong local demand", input.make));
    }

    Adjustment {
        multiplier: multiplier.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER),
        influencers,
    }
}

/// Clamped multiplier the engine applies to the median price.
pub fn effective_multiplier(input: &ValuationInput, current_year: i32) -> f64 {
    adjust(input, current_year).multiplier
}

/// Rounds a price to the nearest 100.
fn round_to_hundred(value: f64) -> i64 {
    ((value / 100.0).round() * 100.0) as i64
}

/// Computes the valuation for `input` against an already resolved base price.
pub fn estimate(
    input: &ValuationInput,
    stat: &BasePriceStatistic,
    current_year: i32,
) -> ValuationResult {
    let Adjustment {
        multiplier,
        mut influencers,
    } = adjust(input, current_year);

    tracing::debug!(
        "Adjustment multiplier {:.4} for {} {} {}",
        multiplier,
        input.year,
        input.make,
        input.model
    );

    let adjusted_midpoint = stat.base_price * multiplier;

    let min = adjusted_midpoint * RANGE_LOW;
    let max = adjusted_midpoint * RANGE_HIGH;
    let safe_min = min.max(PRICE_FLOOR);
    // Cheap vehicles collapse onto the floor instead of inverting the band
    let safe_max = max.max(safe_min);
    let fast_sale = safe_min * FAST_SALE_FACTOR;

    influencers.truncate(MAX_INFLUENCERS);

    let summary = if stat.comparables_count > 0 {
        format!(
            "Estimate based on {} similar vehicles using local market data and feature-based matching.",
            stat.comparables_count
        )
    } else {
        "This is not an exact estimate. You know your car best, so feel free to set the price or value that reflects your vehicle accurately.".to_string()
    };

    ValuationResult {
        estimated_market_value_min: round_to_hundred(safe_min),
        estimated_market_value_max: round_to_hundred(safe_max),
        fast_sale_price: round_to_hundred(fast_sale),
        dealer_listing_price: round_to_hundred(safe_max),
        key_influencers: influencers,
        summary,
        confidence_score: stat.confidence,
    }
}

/// Valuation engine bound to a base price source.
#[derive(Debug, Clone)]
pub struct ValuationEngine<L> {
    lookup: L,
}

impl<L: BasePriceLookup> ValuationEngine<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Resolves the base price for `input`, absorbing "no data" into the fallback.
    ///
    /// Only a source that could not be asked at all is reported as an error.
    pub async fn resolve_base_price(
        &self,
        input: &ValuationInput,
    ) -> Result<BasePriceStatistic, AppError> {
        let query = BasePriceQuery::for_car(input);

        match self.lookup.base_price(query).await {
            Ok(Some(stat)) if stat.is_usable() => {
                tracing::debug!(
                    "Base price for {} {} {}: {} from {} comparables",
                    input.year,
                    input.make,
                    input.model,
                    stat.base_price,
                    stat.comparables_count
                );
                Ok(stat)
            }
            Ok(Some(stat)) => {
                tracing::warn!(
                    "Ignoring unusable base price {} for {} {}, using fallback",
                    stat.base_price,
                    input.make,
                    input.model
                );
                Ok(BasePriceStatistic::FALLBACK)
            }
            Ok(None) => {
                tracing::info!(
                    "No base price data for {} {} {}, using fallback",
                    input.year,
                    input.make,
                    input.model
                );
                Ok(BasePriceStatistic::FALLBACK)
            }
            Err(e) if e.is_answered() => {
                tracing::warn!("Valuation lookup warning: {}", e);
                Ok(BasePriceStatistic::FALLBACK)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Values `input` as of `current_year`.
    pub async fn value_in_year(
        &self,
        input: &ValuationInput,
        current_year: i32,
    ) -> Result<ValuationResult, AppError> {
        let stat = self.resolve_base_price(input).await?;
        let result = estimate(input, &stat, current_year);

        tracing::debug!(
            "Valued {} {} at {}-{} (confidence {})",
            input.make,
            input.model,
            result.estimated_market_value_min,
            result.estimated_market_value_max,
            result.confidence_score
        );

        Ok(result)
    }

    /// Values `input` as of the current UTC year.
    pub async fn value(&self, input: &ValuationInput) -> Result<ValuationResult, AppError> {
        self.value_in_year(input, chrono::Utc::now().year()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CarCondition;

    fn input(make: &str, year: i32, mileage: i64, status: CarStatus) -> ValuationInput {
        ValuationInput {
            make: make.to_string(),
            model: "Test".to_string(),
            year,
            mileage,
            condition: CarCondition::Good,
            fuel_type: None,
            transmission: None,
            car_status: status,
            city: None,
        }
    }

    #[test]
    fn test_small_mileage_shift_is_not_an_influencer() {
        let adj = adjust(&input("Toyota", 2021, 50_000, CarStatus::Used), 2026);
        assert_eq!(
            adj.influencers,
            vec!["Used vehicle pricing", "Toyota strong local demand"]
        );
        assert!((adj.multiplier - 0.918_75 * 0.93 * 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_mileage_influencer_comes_first() {
        let adj = adjust(&input("Honda", 2016, 300_000, CarStatus::Used), 2026);
        assert_eq!(
            adj.influencers,
            vec![
                "Higher mileage for age",
                "Used vehicle pricing",
                "Honda strong local demand"
            ]
        );

        let adj = adjust(&input("Ford", 2022, 5_000, CarStatus::New), 2026);
        assert_eq!(adj.influencers[0], "Below average mileage");
    }

    #[test]
    fn test_current_year_vehicle_counts_as_one_year_old() {
        let this_year = adjust(&input("Ford", 2026, 0, CarStatus::New), 2026);
        let future = adjust(&input("Ford", 2030, 0, CarStatus::New), 2026);
        assert_eq!(this_year.multiplier, future.multiplier);
        // 17,500 km below expectation => +0.00875
        assert!((this_year.multiplier - 0.908_75 * 1.08).abs() < 1e-12);
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let worn = adjust(&input("Ford", 2000, 5_000_000, CarStatus::Used), 2026);
        assert_eq!(worn.multiplier, MIN_MULTIPLIER);

        let pristine = adjust(&input("Toyota", 1980, 0, CarStatus::New), 2026);
        assert_eq!(pristine.multiplier, MAX_MULTIPLIER);
    }

    #[test]
    fn test_extreme_years_floor_age() {
        let ancient = adjust(&input("Ford", i32::MIN, 100_000, CarStatus::Used), 2026);
        assert_eq!(ancient.multiplier, MAX_MULTIPLIER);

        let far_future = adjust(&input("Ford", i32::MAX, 0, CarStatus::Used), 2026);
        let next_year = adjust(&input("Ford", 2027, 0, CarStatus::Used), 2026);
        assert_eq!(far_future.multiplier, next_year.multiplier);

        let stat = BasePriceStatistic::FALLBACK;
        let result = estimate(&input("Ford", i32::MIN, 100_000, CarStatus::Used), &stat, 2026);
        assert!(result.estimated_market_value_min >= 2_500);
    }

    #[test]
    fn test_brand_match_is_exact() {
        let adj = adjust(&input("toyota", 2021, 87_500, CarStatus::Used), 2026);
        assert_eq!(adj.influencers, vec!["Used vehicle pricing"]);
    }

    #[test]
    fn test_round_to_hundred() {
        assert_eq!(round_to_hundred(15_687.47), 15_700);
        assert_eq!(round_to_hundred(17_953.44), 18_000);
        assert_eq!(round_to_hundred(2_449.99), 2_400);
        assert_eq!(round_to_hundred(0.0), 0);
    }

    #[test]
    fn test_cheap_base_price_collapses_onto_floor() {
        let stat = BasePriceStatistic {
            base_price: 1_000.0,
            comparables_count: 3,
            confidence: 40,
        };
        let result = estimate(&input("Ford", 2010, 400_000, CarStatus::Used), &stat, 2026);
        assert_eq!(result.estimated_market_value_min, 2_500);
        assert_eq!(result.estimated_market_value_max, 2_500);
        assert_eq!(result.dealer_listing_price, 2_500);
        assert_eq!(result.fast_sale_price, 2_300);
    }

    #[test]
    fn test_summary_mentions_comparables() {
        let stat = BasePriceStatistic {
            base_price: 10_000.0,
            comparables_count: 12,
            confidence: 70,
        };
        let result = estimate(&input("Ford", 2020, 90_000, CarStatus::Used), &stat, 2026);
        assert!(result.summary.contains("12 similar vehicles"));
        assert_eq!(result.confidence_score, 70);
    }
}
