pub mod ecb;
pub mod exchangerate_api;
pub mod synthetic;

use crate::config::{AppConfig, RateSourceKind};
use crate::errors::EngineResult;
use crate::models::volatility::MIN_RETURNS;
use crate::state::{QuoteSource, RatePoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Anything that can supply spot and historical exchange rates.
/// Implementations own their own timeouts; nothing here retries.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Source tag recorded alongside quotes from this source.
    fn source(&self) -> QuoteSource;

    /// Quote-currency units per one base unit. Fails with `RateUnavailable`.
    async fn get_spot(&self, base: &str, quote: &str) -> EngineResult<f64>;

    /// Daily rates ascending by date. May have gaps.
    async fn get_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<RatePoint>>;

    /// Spot tagged with the source that actually produced it.
    async fn fetch_spot(&self, base: &str, quote: &str) -> EngineResult<(f64, QuoteSource)> {
        Ok((self.get_spot(base, quote).await?, self.source()))
    }

    /// History tagged with the source that actually produced it.
    async fn fetch_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<(Vec<RatePoint>, QuoteSource)> {
        Ok((self.get_history(base, quote, start, end).await?, self.source()))
    }

    async fn health_check(&self) -> bool {
        self.get_spot("USD", "EUR").await.is_ok()
    }
}

/// Primary source with a fallback used on failure, or when history comes
/// back too short to estimate volatility from.
pub struct FallbackSource {
    primary: Arc<dyn RateSource>,
    fallback: Arc<dyn RateSource>,
}

impl FallbackSource {
    pub fn new(primary: Arc<dyn RateSource>, fallback: Arc<dyn RateSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl RateSource for FallbackSource {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    /// The configured provider. Per-call provenance comes from the `fetch_*` methods.
    fn source(&self) -> QuoteSource {
        self.primary.source()
    }

    async fn get_spot(&self, base: &str, quote: &str) -> EngineResult<f64> {
        Ok(self.fetch_spot(base, quote).await?.0)
    }

    async fn get_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<RatePoint>> {
        Ok(self.fetch_history(base, quote, start, end).await?.0)
    }

    async fn fetch_spot(&self, base: &str, quote: &str) -> EngineResult<(f64, QuoteSource)> {
        match self.primary.fetch_spot(base, quote).await {
            Ok(tagged) => Ok(tagged),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    "{base}/{quote} spot fetch failed, using fallback"
                );
                self.fallback.fetch_spot(base, quote).await
            }
        }
    }

    /// Falls back when the primary fails or returns too few points for an
    /// estimate (MIN_RETURNS returns need MIN_RETURNS + 1 points).
    async fn fetch_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<(Vec<RatePoint>, QuoteSource)> {
        match self.primary.fetch_history(base, quote, start, end).await {
            Ok((points, source)) if points.len() > MIN_RETURNS => Ok((points, source)),
            Ok((points, _)) => {
                tracing::warn!(
                    count = points.len(),
                    fallback = self.fallback.name(),
                    "{base}/{quote} history too short, using fallback"
                );
                self.fallback.fetch_history(base, quote, start, end).await
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = self.fallback.name(),
                    "{base}/{quote} history fetch failed, using fallback"
                );
                self.fallback.fetch_history(base, quote, start, end).await
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.primary.health_check().await
    }
}

/// Build the configured rate source, wrapped with the synthetic fallback
/// unless that is disabled or already the primary.
pub fn build_rate_source(config: &AppConfig) -> EngineResult<Arc<dyn RateSource>> {
    let timeout = std::time::Duration::from_secs(config.http_timeout_secs);
    let primary: Arc<dyn RateSource> = match config.rate_source {
        RateSourceKind::ExchangeRateApi => Arc::new(exchangerate_api::ExchangeRateApi::new(
            &config.exchangerate_api_url,
            config.exchangerate_api_key.as_deref(),
            timeout,
        )?),
        RateSourceKind::Ecb => Arc::new(ecb::EcbSource::new(&config.ecb_api_url, timeout)?),
        RateSourceKind::Synthetic => return Ok(Arc::new(synthetic::SyntheticSource::new())),
    };

    tracing::info!(source = primary.name(), fallback = config.rate_source_fallback, "rate source configured");

    if config.rate_source_fallback {
        Ok(Arc::new(FallbackSource::new(primary, Arc::new(synthetic::SyntheticSource::new()))))
    } else {
        Ok(primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;

    struct Down;

    #[async_trait]
    impl RateSource for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        fn source(&self) -> QuoteSource {
            QuoteSource::ExchangeRateApi
        }

        async fn get_spot(&self, _base: &str, _quote: &str) -> EngineResult<f64> {
            Err(EngineError::Network("connection refused".into()))
        }

        async fn get_history(
            &self,
            _base: &str,
            _quote: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> EngineResult<Vec<RatePoint>> {
            Ok(vec![RatePoint { date: start, rate: 19.0 }])
        }
    }

    #[tokio::test]
    async fn test_fallback_on_spot_failure() {
        let source = FallbackSource::new(Arc::new(Down), Arc::new(synthetic::SyntheticSource::new()));
        let rate = source.get_spot("USD", "MXN").await.unwrap();
        assert_eq!(rate, 19.0);

        let (rate, tag) = source.fetch_spot("USD", "MXN").await.unwrap();
        assert_eq!(rate, 19.0);
        assert_eq!(tag, QuoteSource::Synthetic, "fallback answers are tagged synthetic");
    }

    #[tokio::test]
    async fn test_fallback_on_short_history() {
        let source = FallbackSource::new(Arc::new(Down), Arc::new(synthetic::SyntheticSource::new()));
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let (history, tag) = source.fetch_history("USD", "MXN", start, end).await.unwrap();
        assert_eq!(history.len(), 91);
        assert_eq!(tag, QuoteSource::Synthetic);
    }

    /// History of exactly `.0` days from an otherwise healthy provider.
    struct Sparse(usize);

    #[async_trait]
    impl RateSource for Sparse {
        fn name(&self) -> &'static str {
            "sparse"
        }

        fn source(&self) -> QuoteSource {
            QuoteSource::Ecb
        }

        async fn get_spot(&self, _base: &str, _quote: &str) -> EngineResult<f64> {
            Ok(19.0)
        }

        async fn get_history(
            &self,
            _base: &str,
            _quote: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> EngineResult<Vec<RatePoint>> {
            Ok(start.iter_days().take(self.0).map(|date| RatePoint { date, rate: 19.0 }).collect())
        }
    }

    #[tokio::test]
    async fn test_history_threshold_is_thirty_returns() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let synthetic = Arc::new(synthetic::SyntheticSource::new());

        // 31 points = 30 returns: enough, primary kept
        let source = FallbackSource::new(Arc::new(Sparse(MIN_RETURNS + 1)), synthetic.clone());
        let (history, tag) = source.fetch_history("USD", "MXN", start, end).await.unwrap();
        assert_eq!((history.len(), tag), (MIN_RETURNS + 1, QuoteSource::Ecb));

        // 30 points = 29 returns: falls back
        let source = FallbackSource::new(Arc::new(Sparse(MIN_RETURNS)), synthetic);
        let (history, tag) = source.fetch_history("USD", "MXN", start, end).await.unwrap();
        assert_eq!((history.len(), tag), (91, QuoteSource::Synthetic));
    }

    #[tokio::test]
    async fn test_no_fallback_surfaces_error() {
        let err = Down.get_spot("USD", "MXN").await.unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
        assert!(!Down.health_check().await);
    }
}
