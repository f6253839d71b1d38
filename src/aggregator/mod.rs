//! Session aggregation and indicator computation
//!
//! Turns raw provider ticks (plus an optional live quote) into chart-ready
//! series: ordered daily sessions, ISO-week buckets, simple moving averages
//! and stochastic oscillators, trimmed to a trailing retention window.
//!
//! Everything here is pure and deterministic. Inputs are assumed to be
//! validated by the caller.

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use crate::error::Result;
use crate::iex::{ChartPoint, ProviderRange, Stock};
use crate::model::{Chart, MovingAverage, MovingAverageSeries, Quote, Range, Stochastic, TradingSession};

/// Default number of weekly buckets retained in a one-year chart
pub const DEFAULT_RETENTION_WEEKS: usize = 12 * 4;

/// Default simple moving average windows, in sessions
pub const DEFAULT_MOVING_AVERAGE_WINDOWS: [usize; 3] = [25, 50, 200];

/// Default stochastic lookback
pub const DEFAULT_STOCHASTIC_K: usize = 10;

/// Default stochastic smoothing
pub const DEFAULT_STOCHASTIC_D: usize = 3;

/// Parameters for building charts, passed explicitly instead of read from globals
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSettings {
    pub retention_weeks: usize,
    pub moving_average_windows: Vec<usize>,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            retention_weeks: DEFAULT_RETENTION_WEEKS,
            moving_average_windows: DEFAULT_MOVING_AVERAGE_WINDOWS.to_vec(),
            stochastic_k: DEFAULT_STOCHASTIC_K,
            stochastic_d: DEFAULT_STOCHASTIC_D,
        }
    }
}

/// Values positioned on a session date, so they can be trimmed together
pub trait Dated {
    fn date(&self) -> DateTime<Utc>;
}

impl Dated for TradingSession {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

impl Dated for MovingAverage {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

impl Dated for Stochastic {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

/// Builds finished charts from provider stocks
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    settings: ChartSettings,
}

impl SessionAggregator {
    pub fn new(settings: ChartSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ChartSettings {
        &self.settings
    }

    /// Build the chart shape for the requested display range
    pub fn build_chart(&self, stock: &Stock, range: Range) -> Result<Chart> {
        ProviderRange::for_range(range)?;
        match range {
            Range::OneDay => Ok(self.one_day_chart(stock)),
            _ => Ok(self.one_year_chart(stock)),
        }
    }

    /// Intraday chart: sorted ticks only, no aggregation or indicators
    pub fn one_day_chart(&self, stock: &Stock) -> Chart {
        Chart {
            range: Range::OneDay,
            quote: stock.quote.clone(),
            trading_sessions: build_intraday_sessions(&stock.chart),
            ..Default::default()
        }
    }

    /// Daily + weekly sessions with moving averages and stochastics.
    ///
    /// Indicators are computed over the full history before trimming so the
    /// retained window starts with fully warmed-up values.
    pub fn one_year_chart(&self, stock: &Stock) -> Chart {
        let settings = &self.settings;

        let daily = build_daily_sessions(&stock.chart, stock.quote.as_ref());
        let mut weekly = weekly_resample(&daily);
        fill_change_values(&mut weekly);

        let mut moving_averages: Vec<MovingAverageSeries> = settings
            .moving_average_windows
            .iter()
            .map(|&window| MovingAverageSeries {
                window,
                values: moving_average(&daily, window),
            })
            .collect();

        let mut daily_stochastics = stochastic(&daily, settings.stochastic_k, settings.stochastic_d);
        let mut weekly_stochastics =
            stochastic(&weekly, settings.stochastic_k, settings.stochastic_d);

        let (daily, weekly) = trim(daily, weekly, settings.retention_weeks);
        if let Some(start) = daily.first().map(|s| s.date) {
            for series in &mut moving_averages {
                series.values = trim_to_date(std::mem::take(&mut series.values), start);
            }
            daily_stochastics = trim_to_date(daily_stochastics, start);
        }
        if let Some(start) = weekly.first().map(|s| s.date) {
            weekly_stochastics = trim_to_date(weekly_stochastics, start);
        }

        debug!(
            "Built one-year chart for {}: {} daily, {} weekly sessions",
            stock.symbol,
            daily.len(),
            weekly.len()
        );

        Chart {
            range: Range::OneYear,
            quote: stock.quote.clone(),
            trading_sessions: daily,
            weekly_sessions: weekly,
            moving_averages,
            daily_stochastics,
            weekly_stochastics,
        }
    }
}

fn session_from_point(p: &ChartPoint) -> TradingSession {
    TradingSession {
        date: p.date,
        open: p.open,
        high: p.high,
        low: p.low,
        close: p.close,
        volume: p.volume,
        change: p.change,
        percent_change: p.change_percent,
    }
}

/// Sort ticks ascending, keeping the last tick seen for any repeated key
fn sorted_unique<K: PartialEq>(
    points: &[ChartPoint],
    key: impl Fn(&TradingSession) -> K,
) -> Vec<TradingSession> {
    let mut sessions: Vec<TradingSession> = points.iter().map(session_from_point).collect();
    sessions.sort_by_key(|s| s.date);

    let mut unique: Vec<TradingSession> = Vec::with_capacity(sessions.len());
    for session in sessions {
        match unique.last_mut() {
            Some(last) if key(last) == key(&session) => *last = session,
            _ => unique.push(session),
        }
    }
    unique
}

/// Intraday ticks sorted by timestamp
pub fn build_intraday_sessions(points: &[ChartPoint]) -> Vec<TradingSession> {
    sorted_unique(points, |s| s.date)
}

/// Daily sessions sorted by date, one per calendar day.
///
/// If a live quote is dated after the last tick's day, a trailing session is
/// synthesized from it. Real-time quotes carry no OHLC, so open is derived
/// from the change and high/low collapse onto the open/close midpoint.
pub fn build_daily_sessions(points: &[ChartPoint], quote: Option<&Quote>) -> Vec<TradingSession> {
    let mut sessions = sorted_unique(points, |s| s.day());

    let Some(quote) = quote else {
        return sessions;
    };

    let session = synthesize_session(quote);
    let append = match sessions.last() {
        Some(last) => session.day() > last.day(),
        None => true,
    };
    if append {
        sessions.push(session);
    }
    sessions
}

/// Trailing session built from a live quote
pub fn synthesize_session(quote: &Quote) -> TradingSession {
    let (open, high, low, close) = if quote.has_ohlc() {
        (quote.open, quote.high, quote.low, quote.close)
    } else {
        let open = quote.latest_price - quote.change;
        let close = quote.latest_price;
        let mid = (open + close) / 2.0;
        (open, mid, mid, close)
    };

    TradingSession {
        date: quote.latest_time,
        open,
        high,
        low,
        close,
        volume: quote.latest_volume,
        change: quote.change,
        percent_change: quote.change_percent,
    }
}

/// Group daily sessions into ISO-week buckets.
///
/// A new bucket starts whenever the ISO week number differs from the previous
/// bucket's. The bucket keeps the date and open of its first session.
pub fn weekly_resample(daily: &[TradingSession]) -> Vec<TradingSession> {
    let mut weekly: Vec<TradingSession> = Vec::new();

    for s in daily {
        let same_week = weekly
            .last()
            .is_some_and(|w| w.date.iso_week().week() == s.date.iso_week().week());

        match weekly.last_mut() {
            Some(w) if same_week => {
                w.high = w.high.max(s.high);
                w.low = w.low.min(s.low);
                w.close = s.close;
                w.volume += s.volume;
            }
            _ => weekly.push(s.clone()),
        }
    }

    weekly
}

/// Recompute change and percent change from consecutive closes
pub fn fill_change_values(sessions: &mut [TradingSession]) {
    for i in 1..sessions.len() {
        let prev_close = sessions[i - 1].close;
        let change = sessions[i].close - prev_close;
        sessions[i].change = change;
        sessions[i].percent_change = change / prev_close;
    }
}

/// Simple moving average of closes; zero until `n` sessions are available
pub fn moving_average(sessions: &[TradingSession], n: usize) -> Vec<MovingAverage> {
    sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let value = if n > 0 && i + 1 >= n {
                let sum: f64 = sessions[i + 1 - n..=i].iter().map(|s| s.close).sum();
                sum / n as f64
            } else {
                0.0
            };
            MovingAverage {
                date: s.date,
                value,
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Stochastic oscillator with lookback `k` and smoothing `d`.
///
/// Fast %K is defined from index `k-1`, slow %K from `k+d-1` and slow %D from
/// `k+2d-1`; earlier values are zero. A flat high/low window is not special
/// cased and yields NaN (or an infinity for an out-of-range close).
pub fn stochastic(sessions: &[TradingSession], k: usize, d: usize) -> Vec<Stochastic> {
    let mut out: Vec<Stochastic> = sessions
        .iter()
        .map(|s| Stochastic {
            date: s.date,
            fast_k: 0.0,
            k: 0.0,
            d: 0.0,
        })
        .collect();

    if k == 0 || d == 0 {
        return out;
    }

    for i in 0..sessions.len() {
        if i + 1 < k {
            continue;
        }
        let window = &sessions[i + 1 - k..=i];
        let highest_high = window.iter().map(|s| s.high).fold(f64::MIN, f64::max);
        let lowest_low = window.iter().map(|s| s.low).fold(f64::MAX, f64::min);
        out[i].fast_k = (sessions[i].close - lowest_low) / (highest_high - lowest_low);
    }

    let fast_k: Vec<f64> = out.iter().map(|s| s.fast_k).collect();
    for i in 0..out.len() {
        if i + 1 < k + d {
            continue;
        }
        out[i].k = mean(&fast_k[i + 1 - d..=i]);
    }

    let slow_k: Vec<f64> = out.iter().map(|s| s.k).collect();
    for i in 0..out.len() {
        if i + 1 < k + 2 * d {
            continue;
        }
        out[i].d = mean(&slow_k[i + 1 - d..=i]);
    }

    out
}

/// Keep values from the first one dated `start`; unchanged if absent
pub fn trim_to_date<T: Dated>(mut values: Vec<T>, start: DateTime<Utc>) -> Vec<T> {
    match values.iter().position(|v| v.date() == start) {
        Some(idx) => values.split_off(idx),
        None => values,
    }
}

/// Keep the last `retention_weeks` weekly buckets and the daily sessions from
/// the first retained bucket's date onward
pub fn trim(
    daily: Vec<TradingSession>,
    mut weekly: Vec<TradingSession>,
    retention_weeks: usize,
) -> (Vec<TradingSession>, Vec<TradingSession>) {
    if weekly.len() <= retention_weeks {
        return (daily, weekly);
    }

    let weekly = weekly.split_off(weekly.len() - retention_weeks);
    match weekly.first().map(|w| w.date) {
        Some(start) => (trim_to_date(daily, start), weekly),
        None => (Vec::new(), weekly),
    }
}
