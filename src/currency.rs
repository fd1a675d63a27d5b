use crate::errors::{EngineError, EngineResult};

/// Default annual risk-free rates (10Y government benchmarks).
const RISK_FREE_RATES: [(&str, f64); 11] = [
    ("USD", 0.0450),
    ("EUR", 0.0300),
    ("GBP", 0.0420),
    ("JPY", 0.0080),
    ("MXN", 0.0900),
    ("COP", 0.1100),
    ("BRL", 0.1150),
    ("CLP", 0.0580),
    ("PEN", 0.0650),
    ("ARS", 0.1800),
    ("UYU", 0.0850),
];

/// Continuously compounded risk-free rate for a currency.
pub fn risk_free_rate(code: &str) -> EngineResult<f64> {
    RISK_FREE_RATES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|&(_, r)| r)
        .ok_or_else(|| EngineError::invalid_input(format!("no risk-free rate configured for {code}")))
}

/// (domestic, foreign) rates for a pair quoted as quote-per-base:
/// the quote currency is domestic, the base currency foreign.
pub fn pair_rates(base: &str, quote: &str) -> EngineResult<(f64, f64)> {
    Ok((risk_free_rate(quote)?, risk_free_rate(base)?))
}
