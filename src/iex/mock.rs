//! Mock market data client
//! Used for offline runs and for tests where real network access is restricted

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Weekday};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

use super::MarketDataClient;
use super::types::{ChartPoint, ProviderRange, Stock};
use crate::error::{ChartError, Result};
use crate::model::{Quote, Source};

/// Number of weekday sessions generated for a two-year request
const GENERATED_DAILY_SESSIONS: usize = 504;

/// Number of minutes generated for a one-day request
const GENERATED_INTRADAY_MINUTES: usize = 390;

/// In-memory client serving canned or generated stocks
#[derive(Default)]
pub struct MockMarketDataClient {
    stocks: HashMap<(String, ProviderRange), Stock>,
    failing: HashSet<String>,
    latency: Duration,
    stock_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl MockMarketDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate deterministic daily and intraday data for each symbol,
    /// ending on `last_day`
    pub fn generated(symbols: &[&str], last_day: NaiveDate) -> Self {
        let mut client = Self::new();
        for (i, symbol) in symbols.iter().enumerate() {
            let base = 50.0 + 25.0 * i as f64;
            let daily = generate_daily_points(last_day, GENERATED_DAILY_SESSIONS, base);
            let intraday = generate_intraday_points(last_day, GENERATED_INTRADAY_MINUTES, base);
            let quote = generate_quote(symbol, &daily, last_day);

            client = client
                .with_stock(
                    ProviderRange::TwoYears,
                    Stock {
                        symbol: symbol.to_string(),
                        quote: Some(quote.clone()),
                        chart: daily,
                    },
                )
                .with_stock(
                    ProviderRange::OneDay,
                    Stock {
                        symbol: symbol.to_string(),
                        quote: Some(quote),
                        chart: intraday,
                    },
                );
        }
        client
    }

    pub fn with_stock(mut self, range: ProviderRange, stock: Stock) -> Self {
        self.stocks.insert((stock.symbol.clone(), range), stock);
        self
    }

    /// Any batch containing this symbol fails as a whole
    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    /// Simulated network latency per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn stock_calls(&self) -> usize {
        self.stock_calls.load(Ordering::SeqCst)
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    /// Symbol batches requested so far, in call order
    pub fn requested_symbols(&self) -> Vec<Vec<String>> {
        self.requested.lock().clone()
    }

    async fn simulate_call(&self, symbols: &[String]) -> Result<()> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        self.requested.lock().push(symbols.to_vec());

        if let Some(symbol) = symbols.iter().find(|s| self.failing.contains(*s)) {
            return Err(ChartError::remote(
                symbols,
                format!("mock provider failure for {}", symbol),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataClient for MockMarketDataClient {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call(symbols).await?;

        let quotes = symbols
            .iter()
            .filter_map(|symbol| {
                [ProviderRange::TwoYears, ProviderRange::OneDay]
                    .iter()
                    .find_map(|range| self.stocks.get(&(symbol.clone(), *range)))
                    .and_then(|stock| stock.quote.clone())
            })
            .collect();

        Ok(quotes)
    }

    async fn get_stocks(&self, symbols: &[String], range: ProviderRange) -> Result<Vec<Stock>> {
        self.stock_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call(symbols).await?;

        let stocks = symbols
            .iter()
            .filter_map(|symbol| self.stocks.get(&(symbol.clone(), range)).cloned())
            .collect();

        Ok(stocks)
    }
}

fn is_weekday(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekday sessions ending on or before `last_day`, oldest first
pub fn generate_daily_points(last_day: NaiveDate, sessions: usize, base: f64) -> Vec<ChartPoint> {
    let mut days = Vec::with_capacity(sessions);
    let mut day = last_day;
    while days.len() < sessions {
        if is_weekday(day) {
            days.push(day);
        }
        day -= ChronoDuration::days(1);
    }
    days.reverse();

    let mut points = Vec::with_capacity(sessions);
    let mut prev_close = base;
    for (i, day) in days.into_iter().enumerate() {
        let t = i as f64;
        let close = base * (1.0 + 0.1 * (t / 9.0).sin()) + t * 0.05;
        let open = prev_close;
        let change = close - prev_close;
        points.push(ChartPoint {
            date: day.and_time(NaiveTime::default()).and_utc(),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume: 1_000_000 + (i as u64 % 7) * 10_000,
            change,
            change_percent: change / prev_close,
        });
        prev_close = close;
    }
    points
}

/// Minute ticks from the 09:30 open on `day`
pub fn generate_intraday_points(day: NaiveDate, minutes: usize, base: f64) -> Vec<ChartPoint> {
    let open_time = NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default();
    let start = day.and_time(open_time).and_utc();

    (0..minutes)
        .map(|i| {
            let t = i as f64;
            let close = base + (t / 17.0).cos();
            ChartPoint {
                date: start + ChronoDuration::minutes(i as i64),
                open: close - 0.05,
                high: close + 0.1,
                low: close - 0.1,
                close,
                volume: 1_000 + i as u64,
                change: 0.0,
                change_percent: 0.0,
            }
        })
        .collect()
}

/// Real-time quote for the weekday after the last generated session, with
/// OHLC unset as the provider sends for intraday prices
fn generate_quote(symbol: &str, daily: &[ChartPoint], last_day: NaiveDate) -> Quote {
    let prev_close = daily.last().map(|p| p.close).unwrap_or_default();
    let mut quote_day = last_day + ChronoDuration::days(1);
    while !is_weekday(quote_day) {
        quote_day += ChronoDuration::days(1);
    }
    let latest_time = quote_day
        .and_time(NaiveTime::from_hms_opt(15, 59, 0).unwrap_or_default())
        .and_utc();
    let latest_price = prev_close * 1.01;

    Quote {
        symbol: symbol.to_string(),
        company_name: format!("{} Corp.", symbol),
        latest_price,
        latest_source: Source::RealTime,
        latest_time,
        latest_update: latest_time,
        latest_volume: 250_000,
        change: latest_price - prev_close,
        change_percent: (latest_price - prev_close) / prev_close,
        ..Default::default()
    }
}
