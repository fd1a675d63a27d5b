use crate::db::{self, DbPool};
use crate::errors::{EngineError, EngineResult};
use crate::feeds::RateSource;
use crate::state::{CurrencyPair, MarketQuote, QuoteSource, RateHistory, RatePoint};
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

/// Spot quotes younger than this are served from the store.
const SPOT_CACHE_MINUTES: i64 = 60;

/// Stored history is used when it covers at least this share of the days asked for.
const HISTORY_COVERAGE: f64 = 0.8;

/// Longest history range served in one request, in calendar days.
pub const MAX_HISTORY_DAYS: i64 = 3660;

/// Rate source fronted by the local store.
#[derive(Clone)]
pub struct MarketDataService {
    source: Arc<dyn RateSource>,
    db: DbPool,
}

impl MarketDataService {
    pub fn new(source: Arc<dyn RateSource>, db: DbPool) -> Self {
        Self { source, db }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Latest spot for the pair. A recent stored quote is reused unless
    /// `force_refresh`; fresh quotes are recorded.
    pub async fn current_rate(&self, pair: &CurrencyPair, force_refresh: bool) -> EngineResult<MarketQuote> {
        if !force_refresh {
            let cutoff = Utc::now() - Duration::minutes(SPOT_CACHE_MINUTES);
            if let Some(cached) = db::latest_quote_since(&self.db, &pair.base, &pair.quote, cutoff)? {
                tracing::debug!(pair = %pair, rate = cached.rate, "spot served from store");
                return Ok(cached);
            }
        }

        let (rate, source) = self.source.fetch_spot(&pair.base, &pair.quote).await?;
        let quote = MarketQuote {
            base_currency: pair.base.clone(),
            quote_currency: pair.quote.clone(),
            rate,
            observed_at: Utc::now(),
            source,
        };
        db::insert_market_quote(&self.db, &quote)?;
        tracing::info!(pair = %pair, rate, source = source.as_str(), "spot fetched");
        Ok(quote)
    }

    pub async fn refresh(&self, pair: &CurrencyPair) -> EngineResult<MarketQuote> {
        self.current_rate(pair, true).await
    }

    /// Daily rates in [start, end], oldest first, tagged with where they came from.
    pub async fn historical_rates(
        &self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<RateHistory> {
        if end < start {
            return Err(EngineError::invalid_input(format!(
                "end_date {end} is before start_date {start}"
            )));
        }
        let requested_days = (end - start).num_days() + 1;
        if requested_days > MAX_HISTORY_DAYS {
            return Err(EngineError::invalid_input(format!(
                "history range of {requested_days} days exceeds {MAX_HISTORY_DAYS}"
            )));
        }

        let stored = db::history_between(&self.db, &pair.base, &pair.quote, start, end)?;
        if !stored.is_empty() && stored.len() as f64 >= requested_days as f64 * HISTORY_COVERAGE {
            tracing::debug!(pair = %pair, points = stored.len(), "history served from store");
            return Ok(stitch(stored));
        }

        let (mut points, source) = self.source.fetch_history(&pair.base, &pair.quote, start, end).await?;
        points.sort_by_key(|p| p.date);
        let written = db::insert_history(&self.db, &pair.base, &pair.quote, &points, source)?;
        tracing::info!(pair = %pair, %start, %end, written, source = source.as_str(), "history fetched");
        Ok(RateHistory { points, source })
    }

    pub async fn health_check(&self) -> bool {
        self.source.health_check().await
    }
}

/// Stored rows back into one series. Any synthetic day taints the whole series.
fn stitch(rows: Vec<(RatePoint, QuoteSource)>) -> RateHistory {
    let source = rows
        .iter()
        .map(|(_, s)| *s)
        .find(|s| s.is_synthetic())
        .or_else(|| rows.first().map(|(_, s)| *s))
        .unwrap_or(QuoteSource::Synthetic);
    RateHistory {
        points: rows.into_iter().map(|(p, _)| p).collect(),
        source,
    }
}
