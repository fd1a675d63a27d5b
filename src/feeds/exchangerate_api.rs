use crate::errors::{EngineError, EngineResult};
use crate::feeds::RateSource;
use crate::state::{QuoteSource, RatePoint};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use reqwest::Client;
use std::collections::HashMap;

/// ExchangeRate-API v6 REST client.
///
/// Spot:    GET {base_url}/{key}/pair/{base}/{quote}
/// History: GET {base_url}/{key}/history/{base}/{y}/{m}/{d}, one request per day.
pub struct ExchangeRateApi {
    client: Client,
    base_url: String,
    api_key: String,
}

// Actual response formats:
// pair:    { "result": "success", "conversion_rate": 19.0123, ... }
// history: { "result": "success", "conversion_rates": { "MXN": 17.05, ... }, ... }
// errors:  { "result": "error", "error-type": "invalid-key" }

#[derive(serde::Deserialize)]
struct PairResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rate: Option<f64>,
}

#[derive(serde::Deserialize)]
struct HistoryResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    conversion_rates: Option<HashMap<String, f64>>,
}

impl ExchangeRateApi {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: std::time::Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            // The public demo key works for low-volume requests.
            api_key: api_key.unwrap_or("YOUR_API_KEY").to_string(),
        })
    }

    fn pair_url(&self, base: &str, quote: &str) -> String {
        format!("{}/{}/pair/{}/{}", self.base_url, self.api_key, base, quote)
    }

    fn history_url(&self, base: &str, day: NaiveDate) -> String {
        format!(
            "{}/{}/history/{}/{}/{}/{}",
            self.base_url,
            self.api_key,
            base,
            day.year(),
            day.month(),
            day.day()
        )
    }

    async fn fetch_day(&self, base: &str, quote: &str, day: NaiveDate) -> EngineResult<Option<f64>> {
        let resp = self.client.get(self.history_url(base, day)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Network(format!("HTTP {status} for {base} history on {day}")));
        }
        let data: HistoryResponse = resp.json().await?;
        if data.result != "success" {
            return Err(EngineError::rate_unavailable(format!(
                "exchangerate-api: {}",
                data.error_type.unwrap_or_else(|| data.result.clone())
            )));
        }
        Ok(data
            .conversion_rates
            .and_then(|rates| rates.get(quote).copied())
            .filter(|r| *r > 0.0 && r.is_finite()))
    }
}

#[async_trait]
impl RateSource for ExchangeRateApi {
    fn name(&self) -> &'static str {
        "exchangerate-api"
    }

    fn source(&self) -> QuoteSource {
        QuoteSource::ExchangeRateApi
    }

    async fn get_spot(&self, base: &str, quote: &str) -> EngineResult<f64> {
        let resp = self.client.get(self.pair_url(base, quote)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Network(format!("HTTP {status}: {body}")));
        }

        let data: PairResponse = resp.json().await?;
        if data.result != "success" {
            return Err(EngineError::rate_unavailable(format!(
                "exchangerate-api: {}",
                data.error_type.unwrap_or(data.result)
            )));
        }

        let rate = data
            .conversion_rate
            .ok_or_else(|| EngineError::rate_unavailable(format!("no conversion_rate for {base}/{quote}")))?;
        if rate <= 0.0 || !rate.is_finite() {
            return Err(EngineError::rate_unavailable(format!("invalid rate: {rate}")));
        }
        Ok(rate)
    }

    /// Walks the range a day at a time and stops at the first failed request;
    /// whatever was collected up to then is returned.
    async fn get_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<RatePoint>> {
        let mut points = Vec::new();
        let mut day = start;
        while day <= end {
            match self.fetch_day(base, quote, day).await {
                Ok(Some(rate)) => points.push(RatePoint { date: day, rate }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, %day, "{base}/{quote} history fetch stopped");
                    if points.is_empty() {
                        return Err(e);
                    }
                    break;
                }
            }
            day += Duration::days(1);
        }
        Ok(points)
    }
}
