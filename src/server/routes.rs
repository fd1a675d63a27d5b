use crate::calendar::{self, MaturityBucket};
use crate::currency;
use crate::db;
use crate::errors::{EngineError, EngineResult};
use crate::models::garman_kohlhagen::GarmanKohlhagen;
use crate::models::monte_carlo::{MonteCarloGbm, SimulationResult};
use crate::models::PricingModel;
use crate::pricing;
use crate::state::{
    AppState, CurrencyPair, DbCommand, MarketQuote, ModelParams, OptionType, PerfCounters, PricingInput,
    PricingResult, QuoteSource, RatePoint, VolatilityEstimate,
};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

/// Upper bound on Monte Carlo paths per request.
const MAX_SIMULATIONS: usize = 1_000_000;

type ApiResult<T> = Result<Json<T>, EngineError>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

/// Count and log a failed request, then hand the error back for the response.
fn fail(state: &AppState, e: EngineError) -> EngineError {
    PerfCounters::bump(&state.counters.errors_returned);
    if e.status_code() >= 500 {
        tracing::error!(kind = e.kind(), "request failed: {e}");
    } else {
        tracing::warn!(kind = e.kind(), "request rejected: {e}");
    }
    e
}

fn record_quote(state: &AppState, input: &PricingInput, result: &PricingResult, currency_pair: Option<String>) {
    state.record(DbCommand::InsertPricingQuote {
        id: uuid::Uuid::new_v4().to_string(),
        input: *input,
        option_price_per_unit: result.option_price_per_unit,
        total_option_cost: result.total_option_cost,
        strike_price: result.strike_price,
        currency_pair,
        created_at: db::format_ts(Utc::now()),
    });
}

// ── Pricing ──

/// POST /api/pricing/calculate -- price with caller-supplied market inputs
pub async fn calculate(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<PricingInput>,
) -> ApiResult<PricingResult> {
    let Json(input) = payload.map_err(|e| fail(&state, e.into()))?;
    let result = pricing::price_with_analytics(&GarmanKohlhagen::new(), &input).map_err(|e| fail(&state, e))?;
    PerfCounters::bump(&state.counters.quotes_priced);
    record_quote(&state, &input, &result, None);
    Ok(Json(result))
}

#[derive(Debug, serde::Deserialize)]
pub struct AutoPricingQuery {
    pub base: String,
    pub quote: String,
    pub notional_amount: f64,
    pub time_to_maturity_years: Option<f64>,
    /// Alternative to `time_to_maturity_years`, counted from `invoice_date` (default today).
    pub payment_date: Option<NaiveDate>,
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub option_type: OptionType,
    pub protection_level: Option<f64>,
    pub strike_price: Option<f64>,
}

#[derive(Debug, serde::Serialize)]
pub struct MaturityInfo {
    pub years: f64,
    pub days: i64,
    pub business_days: usize,
    pub bucket: String,
}

#[derive(Debug, serde::Serialize)]
pub struct AutoPricingResponse {
    pub currency_pair: String,
    pub market: MarketQuote,
    pub volatility: VolatilityEstimate,
    pub domestic_rate: f64,
    pub foreign_rate: f64,
    pub maturity: MaturityInfo,
    pub pricing: PricingResult,
}

fn resolve_maturity(q: &AutoPricingQuery) -> EngineResult<MaturityInfo> {
    let invoice = q.invoice_date.unwrap_or_else(|| Utc::now().date_naive());
    let (years, days) = match (q.time_to_maturity_years, q.payment_date) {
        (Some(years), _) if !years.is_finite() || years < 0.0 => {
            return Err(EngineError::invalid_input(format!(
                "time_to_maturity_years must be non-negative, got {years}"
            )))
        }
        (Some(years), _) => (years, (years * 365.0).round() as i64),
        (None, Some(payment)) => (
            calendar::time_to_maturity(invoice, payment)?,
            calendar::days_to_maturity(invoice, payment)?,
        ),
        (None, None) => {
            return Err(EngineError::invalid_input(
                "either time_to_maturity_years or payment_date is required",
            ))
        }
    };
    let payment = Duration::try_days(days)
        .and_then(|d| invoice.checked_add_signed(d))
        .ok_or_else(|| {
            EngineError::invalid_input(format!("maturity of {days} days from {invoice} is past the calendar"))
        })?;
    Ok(MaturityInfo {
        years,
        days,
        business_days: calendar::trading_days(invoice, payment),
        bucket: MaturityBucket::from_days(days).label(),
    })
}

/// POST /api/pricing/calculate-auto -- spot, volatility and rates looked up for the pair
pub async fn calculate_auto(
    State(state): State<Arc<AppState>>,
    query: QueryParams<AutoPricingQuery>,
) -> ApiResult<AutoPricingResponse> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    auto_price(&state, &q).await.map(Json).map_err(|e| fail(&state, e))
}

async fn auto_price(state: &AppState, q: &AutoPricingQuery) -> EngineResult<AutoPricingResponse> {
    let pair = CurrencyPair::new(&q.base, &q.quote)?;
    let maturity = resolve_maturity(q)?;
    let (domestic_rate, foreign_rate) = currency::pair_rates(&pair.base, &pair.quote)?;

    let market = state.market.current_rate(&pair, false).await?;
    PerfCounters::bump(&state.counters.rate_fetches);

    let volatility = state
        .volatility
        .volatility_or_default(&pair, state.config.historical_volatility_days, state.config.default_volatility)
        .await;
    if volatility.fallback {
        PerfCounters::bump(&state.counters.volatility_fallbacks);
    } else {
        PerfCounters::bump(&state.counters.volatility_computed);
    }

    let input = PricingInput {
        spot_rate: market.rate,
        strike_price: q.strike_price,
        time_to_maturity_years: maturity.years,
        volatility: volatility.annualized_volatility,
        domestic_rate,
        foreign_rate,
        notional_amount: q.notional_amount,
        option_type: q.option_type,
        protection_level: q.protection_level.unwrap_or(state.config.default_protection_level),
    };
    let pricing = pricing::price_with_analytics(&GarmanKohlhagen::new(), &input)?;
    PerfCounters::bump(&state.counters.quotes_priced);
    record_quote(state, &input, &pricing, Some(pair.to_string()));

    tracing::info!(
        pair = %pair,
        spot = market.rate,
        vol = volatility.annualized_volatility,
        vol_fallback = volatility.fallback,
        premium = pricing.total_option_cost,
        "auto quote priced"
    );

    Ok(AutoPricingResponse {
        currency_pair: pair.to_string(),
        market,
        volatility,
        domestic_rate,
        foreign_rate,
        maturity,
        pricing,
    })
}

#[derive(serde::Deserialize)]
pub struct SimulateRequest {
    #[serde(flatten)]
    pub input: PricingInput,
    pub simulations: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, serde::Serialize)]
pub struct ModelPrice {
    pub model: &'static str,
    pub price: f64,
}

#[derive(Debug, serde::Serialize)]
pub struct SimulateResponse {
    pub strike_price: f64,
    pub seed: u64,
    pub monte_carlo: SimulationResult,
    pub closed_form_price: f64,
    pub difference: f64,
    pub models: [ModelPrice; 2],
}

/// POST /api/pricing/simulate -- Monte Carlo cross-check against the closed form
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    payload: JsonBody<SimulateRequest>,
) -> ApiResult<SimulateResponse> {
    let Json(req) = payload.map_err(|e| fail(&state, e.into()))?;
    run_simulation(&state, req).await.map(Json).map_err(|e| fail(&state, e))
}

async fn run_simulation(state: &AppState, req: SimulateRequest) -> EngineResult<SimulateResponse> {
    let input = req.input;
    pricing::validate(&input)?;

    let simulations = req.simulations.unwrap_or(state.config.monte_carlo_simulations);
    if simulations < 2 || simulations > MAX_SIMULATIONS {
        return Err(EngineError::invalid_input(format!(
            "simulations must be between 2 and {MAX_SIMULATIONS}, got {simulations}"
        )));
    }
    let seed = req.seed.unwrap_or_else(rand::random);

    let strike = input
        .strike_price
        .unwrap_or_else(|| pricing::strike_from_protection(input.spot_rate, input.protection_level, input.option_type));
    let params = ModelParams::new(
        input.spot_rate,
        strike,
        input.time_to_maturity_years,
        input.volatility,
        input.domestic_rate,
        input.foreign_rate,
    );

    let mc = MonteCarloGbm::new(simulations, seed);
    let mc_name = mc.name();
    let option_type = input.option_type;
    let monte_carlo = tokio::task::spawn_blocking(move || mc.simulate(&params, option_type))
        .await
        .map_err(|e| EngineError::ChannelClosed(format!("simulation task: {e}")))?;
    PerfCounters::bump(&state.counters.simulations_run);

    let gk = GarmanKohlhagen::new();
    let closed_form_price = gk.price(&params, option_type);

    Ok(SimulateResponse {
        strike_price: strike,
        seed,
        monte_carlo,
        closed_form_price,
        difference: monte_carlo.price - closed_form_price,
        models: [
            ModelPrice { model: gk.name(), price: closed_form_price },
            ModelPrice { model: mc_name, price: monte_carlo.price },
        ],
    })
}

#[derive(serde::Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/pricing/history -- recent audit trail from DB (cold path)
pub async fn get_pricing_history(
    State(state): State<Arc<AppState>>,
    query: QueryParams<LimitQuery>,
) -> ApiResult<serde_json::Value> {
    let Query(params) = query.map_err(|e| fail(&state, e.into()))?;
    let limit = params.limit.unwrap_or(50).min(500);
    let quotes = db::get_recent_pricing_quotes(&state.db, limit).map_err(|e| fail(&state, e))?;
    Ok(Json(serde_json::json!({ "quotes": quotes })))
}

// ── Rates ──

#[derive(Debug, serde::Deserialize)]
pub struct PairQuery {
    pub base: String,
    pub quote: String,
    #[serde(default)]
    pub force_refresh: bool,
}

/// GET /api/rates/current
pub async fn get_current_rate(
    State(state): State<Arc<AppState>>,
    query: QueryParams<PairQuery>,
) -> ApiResult<MarketQuote> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    let result = async {
        let pair = CurrencyPair::new(&q.base, &q.quote)?;
        state.market.current_rate(&pair, q.force_refresh).await
    }
    .await;
    PerfCounters::bump(&state.counters.rate_fetches);
    result.map(Json).map_err(|e| fail(&state, e))
}

/// POST /api/rates/refresh
pub async fn refresh_rate(
    State(state): State<Arc<AppState>>,
    query: QueryParams<PairQuery>,
) -> ApiResult<MarketQuote> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    let result = async {
        let pair = CurrencyPair::new(&q.base, &q.quote)?;
        state.market.refresh(&pair).await
    }
    .await;
    PerfCounters::bump(&state.counters.rate_fetches);
    result.map(Json).map_err(|e| fail(&state, e))
}

#[derive(serde::Deserialize)]
pub struct HistoricalQuery {
    pub base: String,
    pub quote: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, serde::Serialize)]
pub struct HistoricalResponse {
    pub currency_pair: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub count: usize,
    pub source: QuoteSource,
    pub rates: Vec<RatePoint>,
}

/// GET /api/rates/historical -- defaults to the volatility lookback ending today
pub async fn get_historical_rates(
    State(state): State<Arc<AppState>>,
    query: QueryParams<HistoricalQuery>,
) -> ApiResult<HistoricalResponse> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    let result = async {
        let pair = CurrencyPair::new(&q.base, &q.quote)?;
        let end = q.end_date.unwrap_or_else(|| Utc::now().date_naive());
        let start = match q.start_date {
            Some(start) => start,
            None => end
                .checked_sub_signed(Duration::days(state.config.historical_volatility_days as i64))
                .ok_or_else(|| EngineError::invalid_input(format!("end_date {end} is out of range")))?,
        };
        let history = state.market.historical_rates(&pair, start, end).await?;
        Ok::<_, EngineError>(HistoricalResponse {
            currency_pair: pair.to_string(),
            start_date: start,
            end_date: end,
            count: history.points.len(),
            source: history.source,
            rates: history.points,
        })
    }
    .await;
    result.map(Json).map_err(|e| fail(&state, e))
}

// ── Volatility ──

#[derive(serde::Deserialize)]
pub struct VolatilityQuery {
    #[serde(default)]
    pub force_recalculate: bool,
    pub lookback_days: Option<u32>,
}

fn lookback(state: &AppState, requested: Option<u32>) -> EngineResult<u32> {
    match requested {
        Some(0) => Err(EngineError::invalid_input("lookback_days must be positive")),
        Some(days) => Ok(days),
        None => Ok(state.config.historical_volatility_days),
    }
}

/// GET /api/volatility/{pair} -- pair as six letters, e.g. USDMXN
pub async fn get_volatility(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
    query: QueryParams<VolatilityQuery>,
) -> ApiResult<VolatilityEstimate> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    let result = async {
        let pair = CurrencyPair::parse(&pair)?;
        let lookback_days = lookback(&state, q.lookback_days)?;
        state.volatility.volatility(&pair, lookback_days, q.force_recalculate).await
    }
    .await;
    if result.is_ok() {
        PerfCounters::bump(&state.counters.volatility_computed);
    }
    result.map(Json).map_err(|e| fail(&state, e))
}

#[derive(serde::Deserialize)]
pub struct VolatilityCalcQuery {
    pub base: String,
    pub quote: String,
    pub lookback_days: Option<u32>,
}

/// POST /api/volatility/calculate -- always recomputes
pub async fn calculate_volatility(
    State(state): State<Arc<AppState>>,
    query: QueryParams<VolatilityCalcQuery>,
) -> ApiResult<VolatilityEstimate> {
    let Query(q) = query.map_err(|e| fail(&state, e.into()))?;
    let result = async {
        let pair = CurrencyPair::new(&q.base, &q.quote)?;
        let lookback_days = lookback(&state, q.lookback_days)?;
        state.volatility.volatility(&pair, lookback_days, true).await
    }
    .await;
    if result.is_ok() {
        PerfCounters::bump(&state.counters.volatility_computed);
    }
    result.map(Json).map_err(|e| fail(&state, e))
}

// ── Ops ──

/// GET /api/health
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let source_ok = state.market.health_check().await;
    let db_ok = state
        .db
        .lock()
        .map(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
        .unwrap_or(false);
    Json(serde_json::json!({
        "status": if source_ok && db_ok { "ok" } else { "degraded" },
        "rate_source": state.market.source_name(),
        "rate_source_healthy": source_ok,
        "database_healthy": db_ok,
    }))
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(serde_json::json!({
        "quotes_priced": state.counters.quotes_priced.load(Relaxed),
        "simulations_run": state.counters.simulations_run.load(Relaxed),
        "volatility_computed": state.counters.volatility_computed.load(Relaxed),
        "volatility_fallbacks": state.counters.volatility_fallbacks.load(Relaxed),
        "rate_fetches": state.counters.rate_fetches.load(Relaxed),
        "errors_returned": state.counters.errors_returned.load(Relaxed),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, RateSourceKind};
    use crate::feeds::synthetic::SyntheticSource;
    use crate::services::MarketDataService;
    use portable_atomic::Ordering::Relaxed;
    use tokio::sync::mpsc;

    fn test_config() -> AppConfig {
        AppConfig {
            exchangerate_api_key: None,
            exchangerate_api_url: "http://localhost".into(),
            ecb_api_url: "http://localhost".into(),
            rate_source: RateSourceKind::Synthetic,
            rate_source_fallback: false,
            http_timeout_secs: 1,
            default_volatility: 0.20,
            default_protection_level: 0.05,
            historical_volatility_days: 90,
            monte_carlo_simulations: 10_000,
            data_dir: "data".into(),
            server_port: 0,
        }
    }

    fn test_state() -> (Arc<AppState>, mpsc::Receiver<DbCommand>) {
        let db = db::init_in_memory().unwrap();
        let market = MarketDataService::new(Arc::new(SyntheticSource::new()), db.clone());
        let (db_tx, db_rx) = mpsc::channel(16);
        (AppState::new(test_config(), db, market, db_tx), db_rx)
    }

    fn reference_input() -> PricingInput {
        PricingInput {
            spot_rate: 19.0,
            strike_price: None,
            time_to_maturity_years: 0.25,
            volatility: 0.20,
            domestic_rate: 0.04,
            foreign_rate: 0.07,
            notional_amount: 1_000_000.0,
            option_type: OptionType::Call,
            protection_level: 0.05,
        }
    }

    fn auto_query(base: &str, quote: &str) -> AutoPricingQuery {
        AutoPricingQuery {
            base: base.into(),
            quote: quote.into(),
            notional_amount: 500_000.0,
            time_to_maturity_years: Some(0.25),
            payment_date: None,
            invoice_date: None,
            option_type: OptionType::Call,
            protection_level: None,
            strike_price: None,
        }
    }

    #[tokio::test]
    async fn test_calculate_records_quote() {
        let (state, mut rx) = test_state();
        let Json(result) = calculate(State(state.clone()), Ok(Json(reference_input()))).await.unwrap();
        assert!((result.option_price_per_unit - 0.343).abs() < 0.01);
        assert_eq!(state.counters.quotes_priced.load(Relaxed), 1);

        match rx.try_recv().unwrap() {
            DbCommand::InsertPricingQuote { strike_price, currency_pair, .. } => {
                assert_eq!(strike_price, result.strike_price);
                assert_eq!(currency_pair, None);
            }
        }
    }

    #[tokio::test]
    async fn test_calculate_rejects_bad_notional() {
        let (state, mut rx) = test_state();
        let mut input = reference_input();
        input.notional_amount = 0.0;
        let err = calculate(State(state.clone()), Ok(Json(input))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(state.counters.errors_returned.load(Relaxed), 1);
        assert!(rx.try_recv().is_err(), "nothing is recorded for a rejected quote");
    }

    #[tokio::test]
    async fn test_calculate_auto_uses_market_and_rate_table() {
        let (state, _rx) = test_state();
        let Json(resp) = calculate_auto(State(state.clone()), Ok(Query(auto_query("USD", "MXN")))).await.unwrap();

        assert_eq!(resp.currency_pair, "USDMXN");
        assert_eq!(resp.market.rate, 19.0);
        assert_eq!(resp.domestic_rate, 0.09);
        assert_eq!(resp.foreign_rate, 0.045);
        assert_eq!(resp.maturity.bucket, "3M");
        assert_eq!(resp.pricing.strike_price, 19.0 * 1.05);
        assert_eq!(resp.pricing.scenarios.len(), 5);
        // Offline series: estimated, but flagged as not market data
        assert!(resp.volatility.fallback);
        assert_eq!(resp.volatility.method_label, "90-day synthetic");
        assert_eq!(state.counters.volatility_fallbacks.load(Relaxed), 1);
        assert_eq!(state.counters.volatility_computed.load(Relaxed), 0);
    }

    #[tokio::test]
    async fn test_calculate_auto_from_payment_date() {
        let (state, _rx) = test_state();
        let mut q = auto_query("USD", "MXN");
        q.time_to_maturity_years = None;
        q.invoice_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        q.payment_date = NaiveDate::from_ymd_opt(2024, 7, 19);
        q.option_type = OptionType::Put;

        let Json(resp) = calculate_auto(State(state), Ok(Query(q))).await.unwrap();
        assert_eq!(resp.maturity.days, 200);
        assert_eq!(resp.maturity.bucket, "1Y");
        assert_eq!(resp.maturity.business_days, 145);
        assert!((resp.maturity.years - 200.0 / 365.0).abs() < 1e-12);
        assert!(resp.pricing.greeks.delta < 0.0);
    }

    #[tokio::test]
    async fn test_calculate_auto_rejects_unrepresentable_maturity() {
        let (state, _rx) = test_state();
        for years in [1_000_000.0, 1e300, f64::INFINITY, f64::NAN, -1.0] {
            let mut q = auto_query("USD", "MXN");
            q.time_to_maturity_years = Some(years);
            let err = calculate_auto(State(state.clone()), Ok(Query(q))).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)), "years={years}: {err}");
        }
        assert_eq!(state.counters.errors_returned.load(Relaxed), 5);

        // Long but representable maturities still price
        let mut q = auto_query("USD", "MXN");
        q.time_to_maturity_years = Some(1_000.0);
        let Json(resp) = calculate_auto(State(state), Ok(Query(q))).await.unwrap();
        assert_eq!(resp.maturity.days, 365_000);
        assert!(resp.maturity.business_days > 260_000);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_input() {
        let (state, mut rx) = test_state();
        let rejection = Json::<PricingInput>::from_bytes(
            br#"{"spot_rate":19.0,"time_to_maturity_years":0.25,"volatility":0.2,
                "domestic_rate":0.04,"foreign_rate":0.07,"notional_amount":1000000.0,
                "option_type":"straddle"}"#,
        )
        .unwrap_err();
        let err = calculate(State(state.clone()), Err(rejection)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(state.counters.errors_returned.load(Relaxed), 1);
        assert!(rx.try_recv().is_err());

        let uri: axum::http::Uri = "/api/pricing/calculate-auto?base=USD&quote=MXN".parse().unwrap();
        let rejection = Query::<AutoPricingQuery>::try_from_uri(&uri).unwrap_err();
        let err = calculate_auto(State(state.clone()), Err(rejection)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)), "notional_amount is required");
        assert_eq!(state.counters.errors_returned.load(Relaxed), 2);
    }

    #[tokio::test]
    async fn test_calculate_auto_unknown_pair() {
        let (state, _rx) = test_state();
        let err = calculate_auto(State(state.clone()), Ok(Query(auto_query("USD", "COP")))).await.unwrap_err();
        assert!(matches!(err, EngineError::RateUnavailable(_)));
        assert_eq!(err.status_code(), 503);

        let err = calculate_auto(State(state), Ok(Query(auto_query("USD", "XYZ")))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)), "no risk-free rate for XYZ");
    }

    #[tokio::test]
    async fn test_simulate_agrees_with_closed_form() {
        let (state, _rx) = test_state();
        let req = SimulateRequest {
            input: reference_input(),
            simulations: Some(100_000),
            seed: Some(7),
        };
        let Json(resp) = simulate(State(state.clone()), Ok(Json(req))).await.unwrap();
        assert_eq!(resp.seed, 7);
        assert_eq!(resp.monte_carlo.simulations, 100_000);
        assert!(
            resp.difference.abs() < 4.0 * resp.monte_carlo.std_error,
            "mc={} gk={} se={}",
            resp.monte_carlo.price,
            resp.closed_form_price,
            resp.monte_carlo.std_error
        );
        assert_eq!(resp.models[0].price, resp.closed_form_price);
        assert_eq!(state.counters.simulations_run.load(Relaxed), 1);
    }

    #[tokio::test]
    async fn test_simulate_rejects_path_count() {
        let (state, _rx) = test_state();
        let req = SimulateRequest {
            input: reference_input(),
            simulations: Some(MAX_SIMULATIONS + 1),
            seed: None,
        };
        assert!(matches!(
            simulate(State(state), Ok(Json(req))).await.unwrap_err(),
            EngineError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_volatility_routes() {
        let (state, _rx) = test_state();
        let q = VolatilityQuery { force_recalculate: false, lookback_days: None };
        let Json(est) = get_volatility(State(state.clone()), Path("usdmxn".into()), Ok(Query(q))).await.unwrap();
        assert_eq!(est.currency_pair, "USDMXN");
        assert_eq!(est.method_label, "90-day synthetic");
        assert!(est.fallback);

        let q = VolatilityQuery { force_recalculate: false, lookback_days: Some(0) };
        let err = get_volatility(State(state.clone()), Path("USDMXN".into()), Ok(Query(q))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let q = VolatilityCalcQuery { base: "USD".into(), quote: "MXN".into(), lookback_days: Some(10) };
        let err = calculate_volatility(State(state), Ok(Query(q))).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[tokio::test]
    async fn test_historical_rates_range() {
        let (state, _rx) = test_state();
        let q = HistoricalQuery {
            base: "EUR".into(),
            quote: "USD".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31),
        };
        let Json(resp) = get_historical_rates(State(state), Ok(Query(q))).await.unwrap();
        assert_eq!(resp.currency_pair, "EURUSD");
        assert_eq!(resp.count, 31);
        assert_eq!(resp.source, QuoteSource::Synthetic);
        assert_eq!(resp.rates.first().map(|p| p.date), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[tokio::test]
    async fn test_historical_rates_range_too_wide() {
        let (state, _rx) = test_state();
        let q = HistoricalQuery {
            base: "EUR".into(),
            quote: "USD".into(),
            start_date: NaiveDate::from_ymd_opt(1, 1, 1),
            end_date: NaiveDate::from_ymd_opt(9999, 12, 31),
        };
        let err = get_historical_rates(State(state.clone()), Ok(Query(q))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let q = VolatilityCalcQuery { base: "USD".into(), quote: "MXN".into(), lookback_days: Some(u32::MAX) };
        let err = calculate_volatility(State(state), Ok(Query(q))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_health_and_counters() {
        let (state, _rx) = test_state();
        let Json(health) = get_health(State(state.clone())).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["rate_source"], "synthetic");

        let Json(counters) = get_counters(State(state)).await;
        assert_eq!(counters["quotes_priced"], 0);
    }
}
