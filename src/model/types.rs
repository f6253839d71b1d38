//! Chart-ready data structures produced by the pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ChartError;

/// Display range requested for a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Range {
    #[default]
    Unspecified,
    /// Intraday ticks for the current session
    OneDay,
    /// Daily sessions with weekly aggregation and indicators
    OneYear,
}

impl Range {
    pub fn label(&self) -> &'static str {
        match self {
            Range::Unspecified => "unspecified",
            Range::OneDay => "one-day",
            Range::OneYear => "one-year",
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Range {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-day" | "1d" | "intraday" => Ok(Range::OneDay),
            "one-year" | "1y" | "daily" => Ok(Range::OneYear),
            other => Err(ChartError::Validation(format!("unsupported range: {}", other))),
        }
    }
}

/// One OHLCV record for a single day, week, or intraday tick
#[derive(Debug, Clone, PartialEq)]
pub struct TradingSession {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub change: f64,
    pub percent_change: f64,
}

impl TradingSession {
    /// Calendar day of the session, used for de-duplication and trimming
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// Origin of a quote's latest price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Source {
    #[default]
    Unspecified,
    RealTime,
    Delayed,
    Close,
    PreviousClose,
}

impl Source {
    /// Map the provider's `latestSource` string
    pub fn from_provider(value: &str) -> Result<Self, ChartError> {
        match value {
            "" => Ok(Source::Unspecified),
            "IEX real time price" => Ok(Source::RealTime),
            "15 minute delayed price" => Ok(Source::Delayed),
            "Close" => Ok(Source::Close),
            "Previous close" => Ok(Source::PreviousClose),
            other => Err(ChartError::Validation(format!(
                "unrecognized quote source: {}",
                other
            ))),
        }
    }
}

/// Latest price snapshot for a symbol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub company_name: String,
    pub latest_price: f64,
    pub latest_source: Source,
    pub latest_time: DateTime<Utc>,
    pub latest_update: DateTime<Utc>,
    pub latest_volume: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change: f64,
    pub change_percent: f64,
}

impl Quote {
    /// Real-time quotes arrive with OHLC unset
    pub fn has_ohlc(&self) -> bool {
        !(self.open == 0.0 && self.high == 0.0 && self.low == 0.0 && self.close == 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverage {
    pub date: DateTime<Utc>,
    /// Zero until the window is filled
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageSeries {
    pub window: usize,
    pub values: Vec<MovingAverage>,
}

/// Stochastic oscillator values aligned to a session date
#[derive(Debug, Clone, PartialEq)]
pub struct Stochastic {
    pub date: DateTime<Utc>,
    pub fast_k: f64,
    /// Slow %K
    pub k: f64,
    /// Slow %D
    pub d: f64,
}

/// Finished chart for one symbol and range
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chart {
    pub range: Range,
    pub quote: Option<Quote>,
    pub trading_sessions: Vec<TradingSession>,
    pub weekly_sessions: Vec<TradingSession>,
    pub moving_averages: Vec<MovingAverageSeries>,
    pub daily_stochastics: Vec<Stochastic>,
    pub weekly_stochastics: Vec<Stochastic>,
}

impl Chart {
    pub fn last_session(&self) -> Option<&TradingSession> {
        self.trading_sessions.last()
    }

    /// Most recent price, preferring the quote over the last session
    pub fn price(&self) -> f64 {
        match (&self.quote, self.last_session()) {
            (Some(quote), _) => quote.latest_price,
            (None, Some(session)) => session.close,
            (None, None) => 0.0,
        }
    }

    pub fn moving_average(&self, window: usize) -> Option<&MovingAverageSeries> {
        self.moving_averages.iter().find(|ma| ma.window == window)
    }
}

/// Display payload handed to a bound widget
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartData {
    pub symbol: String,
    pub quote: Option<Quote>,
    pub chart: Option<Chart>,
}
