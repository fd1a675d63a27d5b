use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::{EngineError, EngineResult};
use crate::services::{MarketDataService, VolatilityService};
use chrono::{DateTime, NaiveDate, Utc};
use portable_atomic::{AtomicU64, Ordering};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;

// ── Closed enumerations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Right to buy the foreign currency at the strike. Protects an importer.
    #[default]
    Call,
    /// Right to sell the foreign currency at the strike. Protects an exporter.
    Put,
}

impl OptionType {
    /// Payoff per unit of notional at a given spot.
    #[inline]
    pub fn intrinsic(self, spot: f64, strike: f64) -> f64 {
        match self {
            Self::Call => (spot - strike).max(0.0),
            Self::Put => (strike - spot).max(0.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a market quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteSource {
    ExchangeRateApi,
    Ecb,
    Synthetic,
}

impl QuoteSource {
    /// Made-up data: never a real market observation.
    #[inline]
    pub fn is_synthetic(self) -> bool {
        matches!(self, Self::Synthetic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExchangeRateApi => "exchangerate-api",
            Self::Ecb => "ecb",
            Self::Synthetic => "synthetic",
        }
    }
}

impl std::str::FromStr for QuoteSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exchangerate-api" => Ok(Self::ExchangeRateApi),
            "ecb" => Ok(Self::Ecb),
            "synthetic" => Ok(Self::Synthetic),
            other => Err(EngineError::Parse(format!("unknown quote source: {other}"))),
        }
    }
}

// ── Market data ──

/// Base/quote currency pair, e.g. USD/MXN. Codes are upper-case ISO 4217.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> EngineResult<Self> {
        let base = normalize_code(base)?;
        let quote = normalize_code(quote)?;
        if base == quote {
            return Err(EngineError::invalid_input(format!("base and quote are both {base}")));
        }
        Ok(Self { base, quote })
    }

    /// Parse a six-letter concatenated pair such as "USDMXN".
    pub fn parse(pair: &str) -> EngineResult<Self> {
        let pair = pair.trim();
        if pair.len() != 6 || !pair.is_ascii() {
            return Err(EngineError::invalid_input(format!(
                "currency pair must be 6 characters (e.g. USDMXN), got {pair:?}"
            )));
        }
        Self::new(&pair[..3], &pair[3..])
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

fn normalize_code(code: &str) -> EngineResult<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(EngineError::invalid_input(format!("invalid currency code: {code:?}")));
    }
    Ok(code.to_ascii_uppercase())
}

/// A single observed spot rate. Immutable once recorded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MarketQuote {
    pub base_currency: String,
    pub quote_currency: String,
    /// Quote-currency units per one unit of base currency.
    pub rate: f64,
    pub observed_at: DateTime<Utc>,
    pub source: QuoteSource,
}

/// One day of a historical rate series.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RatePoint {
    pub date: NaiveDate,
    pub rate: f64,
}

/// A daily series and where it came from. A series stitched together from
/// stored rows counts as synthetic if any of its days were.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RateHistory {
    pub points: Vec<RatePoint>,
    pub source: QuoteSource,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct VolatilityEstimate {
    pub currency_pair: String,
    pub annualized_volatility: f64,
    pub method_label: String,
    pub computed_at: DateTime<Utc>,
    /// True when the figure is a configured default or was estimated from
    /// synthetic history rather than market data.
    pub fallback: bool,
}

// ── Pricing input / output ──

fn default_protection_level() -> f64 {
    0.05
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PricingInput {
    pub spot_rate: f64,
    #[serde(default)]
    pub strike_price: Option<f64>,
    pub time_to_maturity_years: f64,
    pub volatility: f64,
    pub domestic_rate: f64,
    pub foreign_rate: f64,
    pub notional_amount: f64,
    #[serde(default)]
    pub option_type: OptionType,
    #[serde(default = "default_protection_level")]
    pub protection_level: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Greeks {
    /// dV/dS
    pub delta: f64,
    /// d²V/dS²
    pub gamma: f64,
    /// dV/dσ per one volatility point
    pub vega: f64,
    /// dV/dt per calendar day
    pub theta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScenarioPoint {
    pub future_spot_rate: f64,
    pub unhedged_cost: f64,
    pub option_payoff: f64,
    pub net_cost: f64,
    pub savings_vs_unhedged: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PayoffPoint {
    pub spot_rate: f64,
    pub unhedged_pnl: f64,
    pub option_payoff: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PricingResult {
    pub option_price_per_unit: f64,
    pub total_option_cost: f64,
    pub cost_percentage: f64,
    pub strike_price: f64,
    pub protection_level: f64,
    pub max_cost_to_firm: f64,
    pub d1: f64,
    pub d2: f64,
    pub greeks: Greeks,
    pub scenarios: SmallVec<[ScenarioPoint; 5]>,
    pub payoff_curve: Vec<PayoffPoint>,
    pub breakeven_rate: f64,
}

// ── Precomputed model parameters (stack, no alloc) ──

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ModelParams {
    pub spot: f64,
    pub strike: f64,
    pub ttl_years: f64,
    pub sigma: f64,
    pub domestic_rate: f64,
    pub foreign_rate: f64,
    // Precomputed
    pub sqrt_t: f64,
    pub sigma_sqrt_t: f64,
    /// e^(-r_d T)
    pub domestic_df: f64,
    /// e^(-r_f T)
    pub foreign_df: f64,
}

impl ModelParams {
    #[inline]
    pub fn new(
        spot: f64,
        strike: f64,
        ttl_years: f64,
        sigma: f64,
        domestic_rate: f64,
        foreign_rate: f64,
    ) -> Self {
        let t = ttl_years.max(0.0);
        let sqrt_t = t.sqrt();
        Self {
            spot,
            strike,
            ttl_years,
            sigma,
            domestic_rate,
            foreign_rate,
            sqrt_t,
            sigma_sqrt_t: sigma * sqrt_t,
            domestic_df: (-domestic_rate * t).exp(),
            foreign_df: (-foreign_rate * t).exp(),
        }
    }

    #[cfg(test)]
    pub fn with_spot(&self, spot: f64) -> Self {
        Self::new(spot, self.strike, self.ttl_years, self.sigma, self.domestic_rate, self.foreign_rate)
    }

    #[cfg(test)]
    pub fn with_sigma(&self, sigma: f64) -> Self {
        Self::new(self.spot, self.strike, self.ttl_years, sigma, self.domestic_rate, self.foreign_rate)
    }

    #[cfg(test)]
    pub fn with_ttl(&self, ttl_years: f64) -> Self {
        Self::new(self.spot, self.strike, ttl_years, self.sigma, self.domestic_rate, self.foreign_rate)
    }
}

// ── DB Commands (sent to writer task via bounded channel) ──

#[derive(Debug)]
pub enum DbCommand {
    InsertPricingQuote {
        id: String,
        input: PricingInput,
        option_price_per_unit: f64,
        total_option_cost: f64,
        strike_price: f64,
        currency_pair: Option<String>,
        created_at: String,
    },
}

// ── Performance Counters (lock-free) ──

pub struct PerfCounters {
    pub quotes_priced: AtomicU64,
    pub simulations_run: AtomicU64,
    pub volatility_computed: AtomicU64,
    pub volatility_fallbacks: AtomicU64,
    pub rate_fetches: AtomicU64,
    pub errors_returned: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            quotes_priced: AtomicU64::new(0),
            simulations_run: AtomicU64::new(0),
            volatility_computed: AtomicU64::new(0),
            volatility_fallbacks: AtomicU64::new(0),
            rate_fetches: AtomicU64::new(0),
            errors_returned: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub market: MarketDataService,
    pub volatility: VolatilityService,

    // Handlers -> DB Writer: bounded command channel
    pub db_tx: mpsc::Sender<DbCommand>,

    // Lock-free performance counters
    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        market: MarketDataService,
        db_tx: mpsc::Sender<DbCommand>,
    ) -> Arc<Self> {
        let volatility = VolatilityService::new(market.clone(), db.clone());
        Arc::new(Self {
            config,
            db,
            market,
            volatility,
            db_tx,
            counters: PerfCounters::new(),
        })
    }

    /// Queue a write for the DB writer task. Never blocks the request path.
    pub fn record(&self, cmd: DbCommand) {
        if let Err(e) = self.db_tx.try_send(cmd) {
            tracing::warn!(error = %e, "db command dropped");
        }
    }
}
