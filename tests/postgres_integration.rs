use std::env;

use autosource_valuation::db::Database;
use autosource_valuation::models::{BasePriceQuery, CarCondition, CarStatus, ValuationInput};
use autosource_valuation::services::MarketDataService;
use autosource_valuation::valuation::{BasePriceLookup, ValuationEngine};

async fn connect() -> anyhow::Result<MarketDataService> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    Ok(MarketDataService::new(db.pool))
}

/// Smoke test for the `get_base_price` SQL function and the catalog tables.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn base_price_lookup_smoke_test() -> anyhow::Result<()> {
    let service = connect().await?;

    let makes = service.fetch_makes().await?;
    let Some(make) = makes.first() else {
        return Ok(());
    };
    let models = service.fetch_models(make).await?;
    let Some(model) = models.first() else {
        return Ok(());
    };

    let input = ValuationInput {
        make: make.clone(),
        model: model.clone(),
        year: 2018,
        mileage: 120_000,
        condition: CarCondition::Good,
        fuel_type: None,
        transmission: None,
        car_status: CarStatus::Used,
        city: None,
    };

    // Either a usable row or no data; both are valid answers
    if let Some(stat) = service.base_price(BasePriceQuery::for_car(&input)).await? {
        assert!(stat.confidence <= 100);
    }

    let result = ValuationEngine::new(service).value(&input).await?;
    assert!(result.estimated_market_value_min >= 2_500);
    assert!(result.key_influencers.len() <= 2);
    Ok(())
}
