use crate::errors::{EngineError, EngineResult};
use crate::feeds::RateSource;
use crate::state::{QuoteSource, RatePoint};
use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::collections::HashMap;

/// European Central Bank reference rates. Free, no key.
///
/// Every ECB rate is quoted as units of currency per one EUR, so other
/// pairs are derived by inversion or by crossing through EUR. The free
/// history feed only covers the last 90 business days.
pub struct EcbSource {
    client: Client,
    daily_url: String,
    hist_90_url: String,
}

/// One reference-rate fixing: currency -> units per EUR.
#[derive(Debug, Clone, PartialEq)]
pub struct EcbFixing {
    pub date: NaiveDate,
    pub rates: HashMap<String, f64>,
}

impl EcbFixing {
    /// Quote-currency units per one base unit, if both legs are fixed.
    pub fn cross(&self, base: &str, quote: &str) -> Option<f64> {
        let per_eur = |code: &str| -> Option<f64> {
            if code == "EUR" {
                Some(1.0)
            } else {
                self.rates.get(code).copied()
            }
        };
        Some(per_eur(quote)? / per_eur(base)?)
    }
}

impl EcbSource {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        let base_url = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            daily_url: format!("{base_url}/eurofxref-daily.xml"),
            hist_90_url: format!("{base_url}/eurofxref-hist-90d.xml"),
        })
    }

    async fn fetch(&self, url: &str) -> EngineResult<Vec<EcbFixing>> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Network(format!("HTTP {status} from ECB")));
        }
        let body = resp.text().await?;
        parse_fixings(&body)
    }
}

/// Parse an ECB eurofxref document into fixings, in document order.
///
/// The layout is `<Cube><Cube time=".."><Cube currency=".." rate=".."/>..</Cube>..</Cube>`.
pub fn parse_fixings(xml: &str) -> EngineResult<Vec<EcbFixing>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fixings: Vec<EcbFixing> = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.name().local_name().as_ref() == b"Cube" => {
                let mut time = None;
                let mut currency = None;
                let mut rate = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| EngineError::Parse(format!("ECB attribute: {e}")))?;
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.local_name().as_ref() {
                        b"time" => time = Some(value),
                        b"currency" => currency = Some(value),
                        b"rate" => rate = Some(value),
                        _ => {}
                    }
                }

                if let Some(time) = time {
                    let date = NaiveDate::parse_from_str(&time, "%Y-%m-%d")
                        .map_err(|e| EngineError::Parse(format!("ECB date {time:?}: {e}")))?;
                    fixings.push(EcbFixing { date, rates: HashMap::new() });
                } else if let (Some(currency), Some(rate)) = (currency, rate) {
                    let rate: f64 = rate
                        .parse()
                        .map_err(|_| EngineError::Parse(format!("ECB rate {rate:?} for {currency}")))?;
                    let fixing = fixings
                        .last_mut()
                        .ok_or_else(|| EngineError::Parse(format!("ECB rate for {currency} outside a dated cube")))?;
                    fixing.rates.insert(currency, rate);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fixings)
}

#[async_trait]
impl RateSource for EcbSource {
    fn name(&self) -> &'static str {
        "ecb"
    }

    fn source(&self) -> QuoteSource {
        QuoteSource::Ecb
    }

    async fn get_spot(&self, base: &str, quote: &str) -> EngineResult<f64> {
        let fixings = self.fetch(&self.daily_url).await?;
        fixings
            .iter()
            .max_by_key(|f| f.date)
            .and_then(|f| f.cross(base, quote))
            .ok_or_else(|| EngineError::rate_unavailable(format!("cannot derive {base}/{quote} from ECB data")))
    }

    async fn get_history(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<RatePoint>> {
        let fixings = self.fetch(&self.hist_90_url).await?;
        let mut points: Vec<RatePoint> = fixings
            .iter()
            .filter(|f| f.date >= start && f.date <= end)
            .filter_map(|f| f.cross(base, quote).map(|rate| RatePoint { date: f.date, rate }))
            .collect();
        // The feed lists newest first.
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01" xmlns="http://www.ecb.int/vocabulary/2002-08-01/eurofxref">
  <gesmes:subject>Reference rates</gesmes:subject>
  <Cube>
    <Cube time="2024-03-08">
      <Cube currency="USD" rate="1.0939"/>
      <Cube currency="MXN" rate="18.4655"/>
    </Cube>
    <Cube time="2024-03-07">
      <Cube currency="USD" rate="1.0895"/>
      <Cube currency="MXN" rate="18.4401"/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

    #[test]
    fn test_parse_fixings() {
        let fixings = parse_fixings(SAMPLE).unwrap();
        assert_eq!(fixings.len(), 2);
        assert_eq!(fixings[0].date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
        assert_eq!(fixings[0].rates.get("USD"), Some(&1.0939));
        assert_eq!(fixings[1].rates.get("MXN"), Some(&18.4401));
    }

    #[test]
    fn test_cross_rates() {
        let fixing = &parse_fixings(SAMPLE).unwrap()[0];
        assert_eq!(fixing.cross("EUR", "USD"), Some(1.0939));
        assert_eq!(fixing.cross("USD", "EUR"), Some(1.0 / 1.0939));
        let usd_mxn = fixing.cross("USD", "MXN").unwrap();
        assert!((usd_mxn - 18.4655 / 1.0939).abs() < 1e-12);
        assert_eq!(fixing.cross("USD", "COP"), None);
    }

    #[test]
    fn test_bad_rate_is_parse_error() {
        let xml = r#"<Cube><Cube time="2024-03-08"><Cube currency="USD" rate="n/a"/></Cube></Cube>"#;
        assert!(matches!(parse_fixings(xml).unwrap_err(), EngineError::Parse(_)));
    }
}
