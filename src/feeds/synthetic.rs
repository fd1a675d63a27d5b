use crate::errors::{EngineError, EngineResult};
use crate::feeds::RateSource;
use crate::state::{QuoteSource, RatePoint};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Typical FX daily volatility used for the synthetic random walk (~0.6%).
const DAILY_VOLATILITY: f64 = 0.006;

/// Reference rates for common pairs, base -> quote.
const FALLBACK_RATES: [(&str, &str, f64); 5] = [
    ("USD", "MXN", 19.0),
    ("USD", "EUR", 0.92),
    ("USD", "GBP", 0.79),
    ("USD", "JPY", 150.0),
    ("EUR", "GBP", 0.86),
];

/// Offline rate source. Spot comes from a static table (direct, inverse or
/// crossed through USD); history is a seeded Gaussian random walk from that
/// spot, so the same request always yields the same series.
pub struct SyntheticSource {
    daily_volatility: f64,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            daily_volatility: DAILY_VOLATILITY,
        }
    }

    /// Reference rate for a pair, if one can be derived from the table.
    pub fn reference_rate(base: &str, quote: &str) -> Option<f64> {
        let base = base.to_ascii_uppercase();
        let quote = quote.to_ascii_uppercase();
        if base == quote {
            return Some(1.0);
        }
        direct(&base, &quote).or_else(|| {
            let base_usd = direct(&base, "USD")?;
            let usd_quote = direct("USD", &quote)?;
            Some(base_usd * usd_quote)
        })
    }

    /// Random walk over every calendar day in [start, end].
    pub fn random_walk(&self, base: &str, quote: &str, start: NaiveDate, end: NaiveDate) -> EngineResult<Vec<RatePoint>> {
        let spot = Self::reference_rate(base, quote)
            .ok_or_else(|| EngineError::rate_unavailable(format!("no synthetic rate for {base}/{quote}")))?;
        let normal = Normal::new(0.0, self.daily_volatility)
            .map_err(|e| EngineError::invalid_input(format!("synthetic volatility: {e}")))?;
        let mut rng = StdRng::seed_from_u64(walk_seed(base, quote, start));

        let days = (end - start).num_days();
        let mut rate = spot;
        let mut points = Vec::with_capacity(days.max(0) as usize + 1);
        for offset in 0..=days {
            let change: f64 = normal.sample(&mut rng);
            // A -100% move would end the walk; keep the rate positive.
            rate *= (1.0 + change).max(0.5);
            points.push(RatePoint {
                date: start + Duration::days(offset),
                rate,
            });
        }
        Ok(points)
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

fn direct(base: &str, quote: &str) -> Option<f64> {
    FALLBACK_RATES.iter().find_map(|&(b, q, rate)| {
        if b == base && q == quote {
            Some(rate)
        } else if b == quote && q == base {
            Some(1.0 / rate)
        } else {
            None
        }
    })
}

fn walk_seed(base: &str, quote: &str, start: NaiveDate) -> u64 {
    // FNV-1a over the pair, mixed with the start day
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in base.bytes().chain(quote.bytes()) {
        hash ^= b.to_ascii_uppercase() as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash ^ start.num_days_from_ce() as u64
}

#[async_trait]
impl RateSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn source(&self) -> QuoteSource {
        QuoteSource::Synthetic
    }

    async fn get_spot(&self, base: &str, quote: &str) -> EngineResult<f64> {
        Self::reference_rate(base, quote)
            .ok_or_else(|| EngineError::rate_unavailable(format!("no synthetic rate for {base}/{quote}")))
    }

    async fn get_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<RatePoint>> {
        if end < start {
            return Err(EngineError::invalid_input(format!("history range ends ({end}) before it starts ({start})")));
        }
        self.random_walk(base, quote, start, end)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
