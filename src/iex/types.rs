//! Market data provider types and wire structures

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChartError, Result};
use crate::model::{Quote, Range, Source};

/// Range parameter understood by the provider's chart endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderRange {
    OneDay,
    TwoYears,
}

impl ProviderRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRange::OneDay => "1d",
            ProviderRange::TwoYears => "2y",
        }
    }

    /// Map a display range to the provider request. Yearly charts ask for two
    /// years so weekly stochastics have trailing history before the window.
    pub fn for_range(range: Range) -> Result<Self> {
        match range {
            Range::OneDay => Ok(ProviderRange::OneDay),
            Range::OneYear => Ok(ProviderRange::TwoYears),
            Range::Unspecified => Err(ChartError::Validation(format!("bad range: {}", range))),
        }
    }
}

impl fmt::Display for ProviderRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw OHLCV tick returned by the chart endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub change: f64,
    pub change_percent: f64,
}

/// Quote and chart points for one symbol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub quote: Option<Quote>,
    pub chart: Vec<ChartPoint>,
}

/// One entry of the batch endpoint's symbol-keyed response
#[derive(Debug, Deserialize)]
pub struct BatchEntry {
    pub quote: Option<WireQuote>,
    #[serde(default)]
    pub chart: Vec<WireChartPoint>,
}

/// Quote as sent by the provider
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQuote {
    pub symbol: String,
    #[serde(default)]
    pub company_name: String,
    pub latest_price: Option<f64>,
    #[serde(default)]
    pub latest_source: String,
    /// Epoch milliseconds
    pub latest_update: Option<i64>,
    pub latest_volume: Option<u64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

impl WireQuote {
    pub fn into_quote(self) -> Result<Quote> {
        let latest_source = Source::from_provider(&self.latest_source)?;
        let latest_update = self
            .latest_update
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_default();

        Ok(Quote {
            symbol: self.symbol,
            company_name: self.company_name,
            latest_price: self.latest_price.unwrap_or_default(),
            latest_source,
            latest_time: latest_update,
            latest_update,
            latest_volume: self.latest_volume.unwrap_or_default(),
            open: self.open.unwrap_or_default(),
            high: self.high.unwrap_or_default(),
            low: self.low.unwrap_or_default(),
            close: self.close.unwrap_or_default(),
            change: self.change.unwrap_or_default(),
            change_percent: self.change_percent.unwrap_or_default(),
        })
    }
}

/// Chart point as sent by the provider. Intraday points carry a `minute`
/// and may have null prices for minutes without trades.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChartPoint {
    pub date: String,
    pub minute: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

impl WireChartPoint {
    /// Convert to a chart point, returning `None` for empty intraday minutes
    pub fn into_chart_point(self) -> Result<Option<ChartPoint>> {
        let (Some(open), Some(high), Some(low), Some(close)) =
            (self.open, self.high, self.low, self.close)
        else {
            return Ok(None);
        };

        let day = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&self.date, "%Y%m%d"))
            .map_err(|e| ChartError::Validation(format!("bad chart date {}: {}", self.date, e)))?;

        let time = match &self.minute {
            Some(minute) => NaiveTime::parse_from_str(minute, "%H:%M").map_err(|e| {
                ChartError::Validation(format!("bad chart minute {}: {}", minute, e))
            })?,
            None => NaiveTime::default(),
        };

        Ok(Some(ChartPoint {
            date: day.and_time(time).and_utc(),
            open,
            high,
            low,
            close,
            volume: self.volume.unwrap_or_default(),
            change: self.change.unwrap_or_default(),
            change_percent: self.change_percent.unwrap_or_default(),
        }))
    }
}
