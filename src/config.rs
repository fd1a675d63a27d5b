use crate::errors::{EngineError, EngineResult};
use std::path::PathBuf;

/// Which rate source backs spot and history lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSourceKind {
    ExchangeRateApi,
    Ecb,
    Synthetic,
}

impl std::str::FromStr for RateSourceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exchangerate-api" | "exchangerate_api" => Ok(Self::ExchangeRateApi),
            "ecb" => Ok(Self::Ecb),
            "synthetic" | "offline" => Ok(Self::Synthetic),
            other => Err(EngineError::Config(format!("RATE_SOURCE: unknown source {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchangerate_api_key: Option<String>,
    pub exchangerate_api_url: String,
    pub ecb_api_url: String,
    pub rate_source: RateSourceKind,
    pub rate_source_fallback: bool,
    pub http_timeout_secs: u64,
    pub default_volatility: f64,
    pub default_protection_level: f64,
    pub historical_volatility_days: u32,
    pub monte_carlo_simulations: usize,
    pub data_dir: PathBuf,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let rate_source = env_var_or("RATE_SOURCE", "exchangerate-api").parse::<RateSourceKind>()?;

        let rate_source_fallback = env_var_or("RATE_SOURCE_FALLBACK", "true")
            .parse::<bool>()
            .map_err(|e| EngineError::Config(format!("RATE_SOURCE_FALLBACK: {e}")))?;

        let http_timeout_secs = env_var_or("HTTP_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("HTTP_TIMEOUT_SECS: {e}")))?;

        let default_volatility = env_var_or("DEFAULT_VOLATILITY", "0.20")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_VOLATILITY: {e}")))?;
        if default_volatility <= 0.0 || !default_volatility.is_finite() {
            return Err(EngineError::Config(format!(
                "DEFAULT_VOLATILITY must be positive, got {default_volatility}"
            )));
        }

        let default_protection_level = env_var_or("DEFAULT_PROTECTION_LEVEL", "0.05")
            .parse::<f64>()
            .map_err(|e| EngineError::Config(format!("DEFAULT_PROTECTION_LEVEL: {e}")))?;

        let historical_volatility_days = env_var_or("HISTORICAL_VOLATILITY_DAYS", "90")
            .parse::<u32>()
            .map_err(|e| EngineError::Config(format!("HISTORICAL_VOLATILITY_DAYS: {e}")))?;

        let monte_carlo_simulations = env_var_or("MONTE_CARLO_SIMULATIONS", "10000")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("MONTE_CARLO_SIMULATIONS: {e}")))?;

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| EngineError::Config(format!("SERVER_PORT: {e}")))?;

        Ok(Self {
            exchangerate_api_key: std::env::var("EXCHANGERATE_API_KEY").ok().filter(|k| !k.is_empty()),
            exchangerate_api_url: env_var_or(
                "EXCHANGERATE_API_URL",
                "https://v6.exchangerate-api.com/v6",
            ),
            ecb_api_url: env_var_or(
                "ECB_API_URL",
                "https://www.ecb.europa.eu/stats/eurofxref",
            ),
            rate_source,
            rate_source_fallback,
            http_timeout_secs,
            default_volatility,
            default_protection_level,
            historical_volatility_days,
            monte_carlo_simulations,
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            server_port,
        })
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
