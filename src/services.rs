use crate::circuit_breaker::{create_lookup_circuit_breaker, LookupCircuitBreaker};
use crate::config::{Config, LookupBackend};
use crate::errors::{AppError, LookupError, ResultExt};
use crate::models::*;
use crate::valuation::BasePriceLookup;
use bigdecimal::{BigDecimal, ToPrimitive};
use failsafe::futures::CircuitBreaker;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

/// `get_base_price` row as returned over HTTP.
///
/// Numeric columns may be serialized as strings, so the price accepts both.
#[derive(Debug, Deserialize)]
struct BasePriceRow {
    #[serde(deserialize_with = "number_or_string")]
    base_price: f64,
    comparables_count: u32,
    confidence: u8,
}

impl TryFrom<BasePriceRow> for BasePriceStatistic {
    type Error = LookupError;

    fn try_from(row: BasePriceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            base_price: row.base_price,
            comparables_count: row.comparables_count,
            confidence: checked_confidence(i64::from(row.confidence))?,
        })
    }
}

/// Confidence scores are percentages.
fn checked_confidence(raw: i64) -> Result<u8, LookupError> {
    u8::try_from(raw)
        .ok()
        .filter(|c| *c <= 100)
        .ok_or_else(|| LookupError::Rejected(format!("confidence {} out of range", raw)))
}

/// Gateway statuses meaning the database behind it was never reached.
fn is_gateway_outage(status: reqwest::StatusCode) -> bool {
    matches!(
        status,
        reqwest::StatusCode::REQUEST_TIMEOUT
            | reqwest::StatusCode::TOO_MANY_REQUESTS
            | reqwest::StatusCode::BAD_GATEWAY
            | reqwest::StatusCode::SERVICE_UNAVAILABLE
            | reqwest::StatusCode::GATEWAY_TIMEOUT
    )
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(f64),
        Text(String),
    }

    match Numeric::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Client for the hosted backend's REST gateway (PostgREST).
#[derive(Clone)]
pub struct PostgrestService {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: LookupCircuitBreaker,
}

impl PostgrestService {
    /// Creates a new `PostgrestService`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Project URL, without the `/rest/v1` suffix.
    /// * `api_key` - Anonymous key, sent both as `apikey` and bearer token.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create REST client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            breaker: create_lookup_circuit_breaker(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn call_base_price(
        &self,
        query: &BasePriceQuery,
    ) -> Result<Option<BasePriceStatistic>, LookupError> {
        let url = format!("{}/rest/v1/rpc/get_base_price", self.base_url);
        tracing::debug!(
            "Calling get_base_price for {} {} {} ({:?})",
            query.year,
            query.make,
            query.model,
            query.fuel_type
        );

        let response = self
            .authorized(self.client.post(&url))
            .json(query)
            .send()
            .await
            .map_err(|e| LookupError::Transport(format!("get_base_price request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("get_base_price returned {}: {}", status, error_text);
            // 4xx and plain 500 come from the SQL function itself
            return Err(if is_gateway_outage(status) {
                LookupError::Transport(message)
            } else {
                LookupError::Rejected(message)
            });
        }

        let rows: Vec<BasePriceRow> = response.json().await.map_err(|e| {
            LookupError::Rejected(format!("Failed to parse get_base_price response: {}", e))
        })?;

        rows.into_iter()
            .next()
            .map(BasePriceStatistic::try_from)
            .transpose()
    }

    /// Distinct makes in `vehicle_models`, sorted.
    pub async fn fetch_makes(&self) -> Result<Vec<String>, AppError> {
        let url = format!("{}/rest/v1/vehicle_models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("select", "make_name")])
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<VehicleMakeRow> = response.json().await?;
        let mut makes: Vec<String> = rows.into_iter().map(|r| r.make_name).collect();
        makes.sort();
        makes.dedup();
        Ok(makes)
    }

    /// Model names for `make`, sorted.
    pub async fn fetch_models(&self, make: &str) -> Result<Vec<String>, AppError> {
        let url = format!("{}/rest/v1/vehicle_models", self.base_url);
        let make_filter = format!("eq.{}", make);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[
                ("select", "name"),
                ("make_name", make_filter.as_str()),
                ("order", "name"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<VehicleModelRow> = response.json().await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

impl BasePriceLookup for PostgrestService {
    fn base_price(
        &self,
        query: BasePriceQuery,
    ) -> impl Future<Output = Result<Option<BasePriceStatistic>, LookupError>> + Send {
        async move {
            // Answered errors mean the backend is healthy
            let is_failure = |e: &LookupError| !e.is_answered();
            match self
                .breaker
                .call_with(is_failure, self.call_base_price(&query))
                .await
            {
                Ok(stat) => Ok(stat),
                Err(failsafe::Error::Inner(e)) => Err(e),
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!("Base price lookup short-circuited, backend marked unavailable");
                    Err(LookupError::CircuitOpen)
                }
            }
        }
    }
}

/// `get_base_price` row as decoded from Postgres.
#[derive(Debug, sqlx::FromRow)]
struct PgBasePriceRow {
    base_price: BigDecimal,
    comparables_count: i64,
    confidence: i32,
}

impl TryFrom<PgBasePriceRow> for BasePriceStatistic {
    type Error = LookupError;

    fn try_from(row: PgBasePriceRow) -> Result<Self, Self::Error> {
        let base_price = row.base_price.to_f64().ok_or_else(|| {
            LookupError::Rejected(format!("base_price {} is not representable", row.base_price))
        })?;
        let comparables_count = u32::try_from(row.comparables_count).map_err(|_| {
            LookupError::Rejected(format!(
                "comparables_count {} out of range",
                row.comparables_count
            ))
        })?;
        let confidence = checked_confidence(i64::from(row.confidence))?;

        Ok(Self {
            base_price,
            comparables_count,
            confidence,
        })
    }
}

/// Direct Postgres access to the marketplace tables and `get_base_price`.
#[derive(Clone)]
pub struct MarketDataService {
    pool: PgPool,
}

impl MarketDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinct makes in `vehicle_models`, sorted.
    pub async fn fetch_makes(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query_as::<_, VehicleMakeRow>(
            "SELECT DISTINCT make_name FROM vehicle_models ORDER BY make_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load vehicle makes")?;

        Ok(rows.into_iter().map(|r| r.make_name).collect())
    }

    /// Model names for `make`, sorted.
    pub async fn fetch_models(&self, make: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query_as::<_, VehicleModelRow>(
            "SELECT name FROM vehicle_models WHERE make_name = $1 ORDER BY name",
        )
        .bind(make)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load models for {}", make))?;

        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

impl BasePriceLookup for MarketDataService {
    fn base_price(
        &self,
        query: BasePriceQuery,
    ) -> impl Future<Output = Result<Option<BasePriceStatistic>, LookupError>> + Send {
        async move {
            let row = sqlx::query_as::<_, PgBasePriceRow>(
                r#"
                SELECT base_price::numeric AS base_price,
                       comparables_count::bigint AS comparables_count,
                       confidence::integer AS confidence
                FROM get_base_price($1, $2, $3, $4, $5)
                LIMIT 1
                "#,
            )
            .bind(&query.make)
            .bind(&query.model)
            .bind(query.year)
            .bind(&query.vehicle_type)
            .bind(&query.fuel_type)
            .fetch_optional(&self.pool)
            .await?;

            row.map(BasePriceStatistic::try_from).transpose()
        }
    }
}

/// Market data backend selected by configuration.
#[derive(Clone)]
pub enum MarketDataSource {
    Postgrest(PostgrestService),
    Postgres(MarketDataService),
}

impl MarketDataSource {
    /// Builds the configured backend, connecting to Postgres if selected.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        match &config.backend {
            LookupBackend::Postgres { database_url } => {
                let db = crate::db::Database::new(database_url).await?;
                tracing::info!("Market data served from Postgres");
                Ok(Self::Postgres(MarketDataService::new(db.pool)))
            }
            LookupBackend::Postgrest { base_url, api_key } => {
                let service = PostgrestService::new(
                    base_url,
                    api_key,
                    Duration::from_secs(config.lookup_timeout_secs),
                )?;
                tracing::info!("Market data served from REST gateway: {}", base_url);
                Ok(Self::Postgrest(service))
            }
        }
    }

    pub async fn fetch_makes(&self) -> Result<Vec<String>, AppError> {
        match self {
            Self::Postgrest(s) => s.fetch_makes().await,
            Self::Postgres(s) => s.fetch_makes().await,
        }
    }

    pub async fn fetch_models(&self, make: &str) -> Result<Vec<String>, AppError> {
        match self {
            Self::Postgrest(s) => s.fetch_models(make).await,
            Self::Postgres(s) => s.fetch_models(make).await,
        }
    }
}

impl BasePriceLookup for MarketDataSource {
    fn base_price(
        &self,
        query: BasePriceQuery,
    ) -> impl Future<Output = Result<Option<BasePriceStatistic>, LookupError>> + Send {
        async move {
            match self {
                Self::Postgrest(s) => s.base_price(query).await,
                Self::Postgres(s) => s.base_price(query).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accepts_numeric_string_price() {
        let rows: Vec<BasePriceRow> = serde_json::from_str(
            r#"[{"base_price": "18500.50", "comparables_count": 7, "confidence": 64}]"#,
        )
        .unwrap();
        let stat = BasePriceStatistic::try_from(rows.into_iter().next().unwrap()).unwrap();
        assert_eq!(stat.base_price, 18_500.5);
        assert_eq!(stat.comparables_count, 7);
        assert_eq!(stat.confidence, 64);
    }

    #[test]
    fn test_row_rejects_confidence_above_hundred() {
        let rows: Vec<BasePriceRow> = serde_json::from_str(
            r#"[{"base_price": 9000, "comparables_count": 2, "confidence": 150}]"#,
        )
        .unwrap();
        assert!(matches!(
            BasePriceStatistic::try_from(rows.into_iter().next().unwrap()),
            Err(LookupError::Rejected(_))
        ));
    }

    #[test]
    fn test_gateway_outage_statuses() {
        assert!(is_gateway_outage(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_gateway_outage(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_gateway_outage(reqwest::StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_gateway_outage(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_gateway_outage(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_row_rejects_negative_count() {
        let parsed: Result<Vec<BasePriceRow>, _> = serde_json::from_str(
            r#"[{"base_price": 100, "comparables_count": -1, "confidence": 10}]"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_pg_row_conversion_checks_ranges() {
        use std::str::FromStr;

        let row = PgBasePriceRow {
            base_price: BigDecimal::from_str("12000.00").unwrap(),
            comparables_count: 5,
            confidence: 80,
        };
        let stat = BasePriceStatistic::try_from(row).unwrap();
        assert_eq!(stat.base_price, 12_000.0);

        let row = PgBasePriceRow {
            base_price: BigDecimal::from_str("12000").unwrap(),
            comparables_count: 5,
            confidence: 180,
        };
        assert!(matches!(
            BasePriceStatistic::try_from(row),
            Err(LookupError::Rejected(_))
        ));
    }
}
