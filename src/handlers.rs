use crate::config::Config;
use crate::errors::AppError;
use crate::models::{ValuationInput, ValuationResult};
use crate::services::MarketDataSource;
use crate::valuation::ValuationEngine;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Valuation engine bound to the configured market data backend.
    pub engine: ValuationEngine<MarketDataSource>,
}

impl AppState {
    pub fn market_data(&self) -> &MarketDataSource {
        self.engine.lookup()
    }
}

/// Health check endpoint.
///
/// Returns the service status, version and which market data backend is configured.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "autosource-valuation",
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.config.backend.name()
        })),
    )
}

/// POST /api/v1/valuations
///
/// Produces a price estimate for the described vehicle.
///
/// # Returns
///
/// * `Result<Json<ValuationResult>, AppError>` - The estimate, or 503 when the
///   base price source cannot be reached.
pub async fn create_valuation(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ValuationInput>,
) -> Result<Json<ValuationResult>, AppError> {
    tracing::info!(
        "POST /valuations - {} {} {} ({} km, {})",
        input.year,
        input.make,
        input.model,
        input.mileage,
        input.car_status
    );

    if input.make.trim().is_empty() || input.model.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Both make and model are required".to_string(),
        ));
    }

    let result = state.engine.value(&input).await?;

    Ok(Json(result))
}

/// GET /api/v1/vehicle-models/makes
///
/// Lists every make known to the catalog.
pub async fn list_makes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, AppError> {
    let makes = state.market_data().fetch_makes().await?;
    tracing::debug!("Returning {} makes", makes.len());
    Ok(Json(makes))
}

/// GET /api/v1/vehicle-models/makes/:make/models
///
/// Lists the models of one make.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Path(make): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    if make.trim().is_empty() {
        return Err(AppError::BadRequest("Make is required".to_string()));
    }

    let models = state.market_data().fetch_models(&make).await?;
    if models.is_empty() {
        return Err(AppError::NotFound(format!("No models found for make {}", make)));
    }

    Ok(Json(models))
}
