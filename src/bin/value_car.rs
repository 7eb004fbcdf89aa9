//! One-shot valuation against the configured market data backend.
//!
//! Usage: `value_car <make> <model> <year> <mileage> [New|Used] [fuel]`

use anyhow::Context;
use autosource_valuation::config::Config;
use autosource_valuation::models::{CarCondition, CarStatus, ValuationInput};
use autosource_valuation::services::MarketDataSource;
use autosource_valuation::valuation::ValuationEngine;
use std::env;

const USAGE: &str = "usage: value_car <make> <model> <year> <mileage> [New|Used] [fuel]";

fn parse_args(args: &[String]) -> anyhow::Result<ValuationInput> {
    if args.len() < 4 {
        anyhow::bail!(USAGE);
    }

    let car_status = match args.get(4) {
        Some(status) => status.parse::<CarStatus>().map_err(|e| anyhow::anyhow!(e))?,
        None => CarStatus::Used,
    };

    Ok(ValuationInput {
        make: args[0].clone(),
        model: args[1].clone(),
        year: args[2].parse().context("year must be a whole number")?,
        mileage: args[3].parse().context("mileage must be a whole number of km")?,
        condition: CarCondition::Good,
        fuel_type: args.get(5).cloned(),
        transmission: None,
        car_status,
        city: None,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let input = parse_args(&args)?;

    let config = Config::from_env()?;
    let engine = ValuationEngine::new(MarketDataSource::from_config(&config).await?);

    let result = engine.value(&input).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
