use crate::errors::{EngineError, EngineResult};
use crate::state::{DbCommand, MarketQuote, QuoteSource, RatePoint, VolatilityEstimate};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

pub fn init_db(data_dir: &Path) -> EngineResult<DbPool> {
    std::fs::create_dir_all(data_dir).map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    let db_path = data_dir.join("fx_hedge.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA cache_size=-64000;")?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// Fresh schema in memory. Used by tests and by tooling that wants no file.
pub fn init_in_memory() -> EngineResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Timestamps are stored as fixed-width RFC 3339 so string order is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::Database(format!("bad timestamp {raw:?}: {e}")))
}

fn lock(db: &DbPool) -> EngineResult<std::sync::MutexGuard<'_, Connection>> {
    db.lock().map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))
}

/// Dedicated DB writer task for the pricing audit trail.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        if let Err(e) = execute_command(&db, cmd) {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn execute_command(db: &DbPool, cmd: DbCommand) -> EngineResult<()> {
    let conn = lock(db)?;

    match cmd {
        DbCommand::InsertPricingQuote {
            id, input, option_price_per_unit, total_option_cost,
            strike_price, currency_pair, created_at,
        } => {
            conn.execute(
                "INSERT INTO pricing_quotes (id, currency_pair, option_type, spot_rate, strike_price, time_to_maturity_years, volatility, domestic_rate, foreign_rate, notional_amount, protection_level, option_price_per_unit, total_option_cost, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    id, currency_pair, input.option_type.as_str(), input.spot_rate, strike_price,
                    input.time_to_maturity_years, input.volatility, input.domestic_rate, input.foreign_rate,
                    input.notional_amount, input.protection_level, option_price_per_unit, total_option_cost, created_at
                ],
            )?;
        }
    }
    Ok(())
}

// ── Market quotes ──

pub fn insert_market_quote(db: &DbPool, quote: &MarketQuote) -> EngineResult<()> {
    let conn = lock(db)?;
    conn.execute(
        "INSERT INTO market_quotes (base_currency, quote_currency, rate, observed_at, source) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            quote.base_currency, quote.quote_currency, quote.rate,
            format_ts(quote.observed_at), quote.source.as_str()
        ],
    )?;
    Ok(())
}

/// Most recent quote for the pair observed at or after `since`.
pub fn latest_quote_since(
    db: &DbPool,
    base: &str,
    quote: &str,
    since: DateTime<Utc>,
) -> EngineResult<Option<MarketQuote>> {
    let conn = lock(db)?;
    let row = conn
        .query_row(
            "SELECT base_currency, quote_currency, rate, observed_at, source FROM market_quotes
             WHERE base_currency = ?1 AND quote_currency = ?2 AND observed_at >= ?3
             ORDER BY observed_at DESC LIMIT 1",
            rusqlite::params![base, quote, format_ts(since)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(base_currency, quote_currency, rate, observed_at, source)| {
        Ok(MarketQuote {
            base_currency,
            quote_currency,
            rate,
            observed_at: parse_ts(&observed_at)?,
            source: source.parse::<QuoteSource>()?,
        })
    })
    .transpose()
}

// ── Historical rates ──

/// Upsert a daily series. Returns the number of rows written.
pub fn insert_history(
    db: &DbPool,
    base: &str,
    quote: &str,
    points: &[RatePoint],
    source: QuoteSource,
) -> EngineResult<usize> {
    let mut conn = lock(db)?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO historical_rates (base_currency, quote_currency, date, rate, source) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for p in points {
            stmt.execute(rusqlite::params![base, quote, p.date.to_string(), p.rate, source.as_str()])?;
        }
    }
    tx.commit()?;
    Ok(points.len())
}

/// Stored daily rates in [start, end], oldest first, each with its source.
pub fn history_between(
    db: &DbPool,
    base: &str,
    quote: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> EngineResult<Vec<(RatePoint, QuoteSource)>> {
    let conn = lock(db)?;
    let mut stmt = conn.prepare(
        "SELECT date, rate, source FROM historical_rates
         WHERE base_currency = ?1 AND quote_currency = ?2 AND date >= ?3 AND date <= ?4
         ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![base, quote, start.to_string(), end.to_string()],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, String>(2)?)),
    )?;

    let mut points = Vec::new();
    for row in rows {
        let (date, rate, source) = row?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| EngineError::Database(format!("bad date {date:?}: {e}")))?;
        points.push((RatePoint { date, rate }, source.parse::<QuoteSource>()?));
    }
    Ok(points)
}

// ── Volatility estimates ──

pub fn insert_volatility_estimate(db: &DbPool, est: &VolatilityEstimate) -> EngineResult<()> {
    let conn = lock(db)?;
    conn.execute(
        "INSERT INTO volatility_estimates (currency_pair, annualized_volatility, method_label, fallback, computed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            est.currency_pair, est.annualized_volatility, est.method_label, est.fallback, format_ts(est.computed_at)
        ],
    )?;
    Ok(())
}

pub fn latest_volatility_since(
    db: &DbPool,
    currency_pair: &str,
    since: DateTime<Utc>,
) -> EngineResult<Option<VolatilityEstimate>> {
    let conn = lock(db)?;
    let row = conn
        .query_row(
            "SELECT currency_pair, annualized_volatility, method_label, fallback, computed_at FROM volatility_estimates
             WHERE currency_pair = ?1 AND computed_at >= ?2
             ORDER BY computed_at DESC LIMIT 1",
            rusqlite::params![currency_pair, format_ts(since)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(currency_pair, annualized_volatility, method_label, fallback, computed_at)| {
        Ok(VolatilityEstimate {
            currency_pair,
            annualized_volatility,
            method_label,
            computed_at: parse_ts(&computed_at)?,
            fallback,
        })
    })
    .transpose()
}

// ── Pricing quotes (server REST reads) ──

pub fn get_recent_pricing_quotes(db: &DbPool, limit: usize) -> EngineResult<Vec<PricingQuoteRow>> {
    let conn = lock(db)?;
    let mut stmt = conn.prepare(
        "SELECT id, currency_pair, option_type, spot_rate, strike_price, time_to_maturity_years, volatility, notional_amount, option_price_per_unit, total_option_cost, created_at
         FROM pricing_quotes ORDER BY created_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
        Ok(PricingQuoteRow {
            id: row.get(0)?,
            currency_pair: row.get(1)?,
            option_type: row.get(2)?,
            spot_rate: row.get(3)?,
            strike_price: row.get(4)?,
            time_to_maturity_years: row.get(5)?,
            volatility: row.get(6)?,
            notional_amount: row.get(7)?,
            option_price_per_unit: row.get(8)?,
            total_option_cost: row.get(9)?,
            created_at: row.get(10)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Row types ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct PricingQuoteRow {
    pub id: String,
    pub currency_pair: Option<String>,
    pub option_type: String,
    pub spot_rate: f64,
    pub strike_price: f64,
    pub time_to_maturity_years: f64,
    pub volatility: f64,
    pub notional_amount: f64,
    pub option_price_per_unit: f64,
    pub total_option_cost: f64,
    pub created_at: String,
}
