use crate::db::{self, DbPool};
use crate::errors::{EngineError, EngineResult};
use crate::models::volatility::estimate_volatility;
use crate::services::market_data::{MarketDataService, MAX_HISTORY_DAYS};
use crate::state::{CurrencyPair, VolatilityEstimate};
use chrono::{Duration, Utc};

/// Extra calendar days fetched beyond the lookback to absorb weekends and gaps.
const HISTORY_PADDING_DAYS: i64 = 10;

/// Estimating workflow: cache, history, estimate, record.
#[derive(Clone)]
pub struct VolatilityService {
    market: MarketDataService,
    db: DbPool,
}

impl VolatilityService {
    pub fn new(market: MarketDataService, db: DbPool) -> Self {
        Self { market, db }
    }

    /// Historical volatility for the pair. An estimate computed within the
    /// last day is reused unless `force_recalculate`.
    pub async fn volatility(
        &self,
        pair: &CurrencyPair,
        lookback_days: u32,
        force_recalculate: bool,
    ) -> EngineResult<VolatilityEstimate> {
        let key = pair.to_string();
        if !force_recalculate {
            if let Some(cached) = db::latest_volatility_since(&self.db, &key, Utc::now() - Duration::days(1))? {
                tracing::debug!(pair = %pair, vol = cached.annualized_volatility, "volatility served from store");
                return Ok(cached);
            }
        }

        let window = lookback_days as i64 + HISTORY_PADDING_DAYS;
        if window >= MAX_HISTORY_DAYS {
            return Err(EngineError::invalid_input(format!(
                "lookback_days must be below {}",
                MAX_HISTORY_DAYS - HISTORY_PADDING_DAYS
            )));
        }
        let end = Utc::now().date_naive();
        let start = end - Duration::days(window);
        let history = self.market.historical_rates(pair, start, end).await?;

        let mut estimate = estimate_volatility(&key, &history.points, lookback_days)?;
        if history.source.is_synthetic() {
            // Not a market estimate; downstream must not mistake it for one
            estimate.fallback = true;
            estimate.method_label = format!("{lookback_days}-day synthetic");
            tracing::warn!(pair = %pair, "volatility estimated from synthetic history");
        }
        db::insert_volatility_estimate(&self.db, &estimate)?;
        tracing::info!(
            pair = %pair,
            vol = estimate.annualized_volatility,
            points = history.points.len(),
            source = history.source.as_str(),
            fallback = estimate.fallback,
            "volatility estimated"
        );
        Ok(estimate)
    }

    /// Like [`volatility`](Self::volatility), but any failure yields the
    /// configured default, flagged as a fallback.
    pub async fn volatility_or_default(
        &self,
        pair: &CurrencyPair,
        lookback_days: u32,
        default_volatility: f64,
    ) -> VolatilityEstimate {
        match self.volatility(pair, lookback_days, false).await {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, default_volatility, "volatility unavailable, using default");
                VolatilityEstimate {
                    currency_pair: pair.to_string(),
                    annualized_volatility: default_volatility,
                    method_label: "default".into(),
                    computed_at: Utc::now(),
                    fallback: true,
                }
            }
        }
    }
}
