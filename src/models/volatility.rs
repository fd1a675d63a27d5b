use crate::errors::{EngineError, EngineResult};
use crate::state::{RatePoint, VolatilityEstimate};
use chrono::Utc;
use statrs::statistics::Statistics;

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Minimum number of log returns (after differencing) for a usable estimate.
pub const MIN_RETURNS: usize = 30;

/// Historical volatility estimate for a currency pair.
///
/// Sorts the series by date, takes log returns ln(S_t / S_{t-1}), computes
/// their sample standard deviation (n - 1) and annualizes by sqrt(252).
/// `lookback_days` only labels the estimate; the caller decides which
/// window of history to pass in.
pub fn estimate_volatility(
    currency_pair: &str,
    series: &[RatePoint],
    lookback_days: u32,
) -> EngineResult<VolatilityEstimate> {
    let annualized_volatility = annualized_volatility(series)?;
    Ok(VolatilityEstimate {
        currency_pair: currency_pair.to_string(),
        annualized_volatility,
        method_label: format!("{lookback_days}-day historical"),
        computed_at: Utc::now(),
        fallback: false,
    })
}

/// Annualized volatility of a rate series. Order of the input does not matter.
pub fn annualized_volatility(series: &[RatePoint]) -> EngineResult<f64> {
    if let Some(bad) = series.iter().find(|p| !(p.rate > 0.0) || !p.rate.is_finite()) {
        return Err(EngineError::invalid_input(format!(
            "rate on {} must be positive and finite, got {}",
            bad.date, bad.rate
        )));
    }

    let returns = log_returns(series);
    if returns.len() < MIN_RETURNS {
        return Err(EngineError::InsufficientData {
            available: returns.len(),
            required: MIN_RETURNS,
        });
    }

    let daily = returns.iter().std_dev();
    Ok(daily * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Log returns of consecutive observations after sorting by date.
pub fn log_returns(series: &[RatePoint]) -> Vec<f64> {
    let mut sorted = series.to_vec();
    sorted.sort_by_key(|p| p.date);
    sorted
        .windows(2)
        .map(|w| (w[1].rate / w[0].rate).ln())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series_from(rates: &[f64]) -> Vec<RatePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        rates
            .iter()
            .enumerate()
            .map(|(i, &rate)| RatePoint { date: start + Duration::days(i as i64), rate })
            .collect()
    }

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n).map(|i| 19.0 * (1.0 + 0.004 * ((i * 7 % 11) as f64 - 5.0) / 5.0)).collect()
    }

    #[test]
    fn test_insufficient_data() {
        // 30 points -> 29 returns
        let err = annualized_volatility(&series_from(&zigzag(30))).unwrap_err();
        assert!(
            matches!(err, EngineError::InsufficientData { available: 29, required: 30 }),
            "unexpected error: {err}"
        );
        assert!(annualized_volatility(&series_from(&zigzag(31))).is_ok());
        assert!(matches!(
            annualized_volatility(&[]).unwrap_err(),
            EngineError::InsufficientData { available: 0, .. }
        ));
    }

    #[test]
    fn test_constant_series_zero_vol() {
        let vol = annualized_volatility(&series_from(&[19.0; 60])).unwrap();
        assert_eq!(vol, 0.0);
    }

    #[test]
    fn test_scale_invariance() {
        let rates = zigzag(90);
        let scaled: Vec<f64> = rates.iter().map(|r| r * 37.5).collect();
        let a = annualized_volatility(&series_from(&rates)).unwrap();
        let b = annualized_volatility(&series_from(&scaled)).unwrap();
        assert!(a > 0.0);
        assert!((a - b).abs() < 1e-12, "scaling changed vol: {a} vs {b}");
    }

    #[test]
    fn test_order_independent() {
        let ordered = series_from(&zigzag(45));
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        shuffled.swap(3, 17);
        let a = annualized_volatility(&ordered).unwrap();
        let b = annualized_volatility(&shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_known_value() {
        // Alternating +1% / -1% moves: returns are +/- ln(1.01) with equal counts
        let mut rates = vec![100.0];
        for i in 0..40 {
            let last = *rates.last().unwrap();
            rates.push(if i % 2 == 0 { last * 1.01 } else { last / 1.01 });
        }
        let vol = annualized_volatility(&series_from(&rates)).unwrap();
        let r = 1.01f64.ln();
        // mean 0, sum of squares 40 r^2, n - 1 = 39
        let expected = (40.0 * r * r / 39.0).sqrt() * 252f64.sqrt();
        assert!((vol - expected).abs() < 1e-12, "vol={vol} expected={expected}");
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let mut rates = zigzag(40);
        rates[10] = 0.0;
        let err = annualized_volatility(&series_from(&rates)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_estimate_label() {
        let est = estimate_volatility("USDMXN", &series_from(&zigzag(60)), 90).unwrap();
        assert_eq!(est.method_label, "90-day historical");
        assert_eq!(est.currency_pair, "USDMXN");
        assert!(!est.fallback);
    }
}
