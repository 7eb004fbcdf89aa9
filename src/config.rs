/// Where base prices and the vehicle catalog are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupBackend {
    /// Hosted backend's REST gateway.
    Postgrest { base_url: String, api_key: String },
    /// Direct connection to the marketplace database.
    Postgres { database_url: String },
}

impl LookupBackend {
    /// Short name reported by the health check.
    pub fn name(&self) -> &'static str {
        match self {
            LookupBackend::Postgrest { .. } => "postgrest",
            LookupBackend::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: LookupBackend,
    pub lookup_timeout_secs: u64,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = non_empty_var("DATABASE_URL")
            .or_else(|| non_empty_var("DB_URL"))
            .map(|url| {
                if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                    anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                }
                Ok(url)
            })
            .transpose()?;

        let supabase_url = non_empty_var("SUPABASE_URL")
            .map(|raw| {
                let parsed = url::Url::parse(&raw)
                    .map_err(|e| anyhow::anyhow!("SUPABASE_URL is not a valid URL: {}", e))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    anyhow::bail!("SUPABASE_URL must start with http:// or https://");
                }
                Ok(raw)
            })
            .transpose()?;

        let backend = match (database_url, supabase_url) {
            (Some(database_url), _) => LookupBackend::Postgres { database_url },
            (None, Some(base_url)) => LookupBackend::Postgrest {
                base_url,
                api_key: non_empty_var("SUPABASE_ANON_KEY").ok_or_else(|| {
                    anyhow::anyhow!("SUPABASE_ANON_KEY environment variable required with SUPABASE_URL")
                })?,
            },
            (None, None) => {
                anyhow::bail!("Either DATABASE_URL or SUPABASE_URL environment variable required")
            }
        };

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            backend,
            lookup_timeout_secs: std::env::var("LOOKUP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow::anyhow!("LOOKUP_TIMEOUT_SECS must be a positive number"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        match &config.backend {
            LookupBackend::Postgres { database_url } => tracing::debug!(
                "Database URL: {}...",
                &database_url[..20.min(database_url.len())]
            ),
            LookupBackend::Postgrest { base_url, .. } => {
                tracing::debug!("REST gateway URL: {}", base_url)
            }
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
