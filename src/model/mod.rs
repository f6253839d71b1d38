//! Domain model of the symbols being tracked by the display

pub mod types;

pub use types::{
    Chart, ChartData, MovingAverage, MovingAverageSeries, Quote, Range, Source, Stochastic,
    TradingSession,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{ChartError, Result};

static SYMBOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-]{0,9}$").expect("valid symbol pattern"));

/// Check a symbol against the provider's accepted format
pub fn validate_symbol(symbol: &str) -> Result<()> {
    if SYMBOL_PATTERN.is_match(symbol) {
        Ok(())
    } else {
        Err(ChartError::Validation(format!(
            "bad symbol: got {:?}, want {}",
            symbol,
            SYMBOL_PATTERN.as_str()
        )))
    }
}

/// Normalize user input into the provider's symbol format
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// A single tracked stock and its most recent charts
#[derive(Debug, Clone, Default)]
pub struct Stock {
    pub symbol: String,
    /// At most one chart per range
    pub charts: Vec<Chart>,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl Stock {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn chart(&self, range: Range) -> Option<&Chart> {
        self.charts.iter().find(|ch| ch.range == range)
    }
}

/// Keeps track of the current chart symbol and the sidebar symbols
#[derive(Debug, Default)]
pub struct Model {
    current: Option<Stock>,
    sidebar: Vec<Stock>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_symbol(&self) -> Option<&str> {
        self.current.as_ref().map(|st| st.symbol.as_str())
    }

    pub fn sidebar_symbols(&self) -> Vec<String> {
        self.sidebar.iter().map(|st| st.symbol.clone()).collect()
    }

    /// Set the current symbol, returning true if it changed
    pub fn set_current_symbol(&mut self, symbol: &str) -> Result<bool> {
        validate_symbol(symbol)?;

        if self.current_symbol() == Some(symbol) {
            return Ok(false);
        }

        let stock = self.stock(symbol).cloned().unwrap_or_else(|| Stock::new(symbol));
        self.current = Some(stock);
        Ok(true)
    }

    /// Add a sidebar symbol, returning true if newly added
    pub fn add_sidebar_symbol(&mut self, symbol: &str) -> Result<bool> {
        validate_symbol(symbol)?;

        if self.sidebar.iter().any(|st| st.symbol == symbol) {
            return Ok(false);
        }

        let stock = self.stock(symbol).cloned().unwrap_or_else(|| Stock::new(symbol));
        self.sidebar.push(stock);
        Ok(true)
    }

    /// Remove a sidebar symbol, returning true if removed
    pub fn remove_sidebar_symbol(&mut self, symbol: &str) -> Result<bool> {
        validate_symbol(symbol)?;

        match self.sidebar.iter().position(|st| st.symbol == symbol) {
            Some(idx) => {
                self.sidebar.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.stock(symbol).is_some()
    }

    /// Replace the chart with the same range for every tracked copy of the
    /// symbol. Returns false if the symbol is not tracked.
    pub fn update_chart(&mut self, symbol: &str, chart: Chart) -> Result<bool> {
        validate_symbol(symbol)?;

        if chart.range == Range::Unspecified {
            return Err(ChartError::Validation("chart range not set".to_string()));
        }

        let now = Utc::now();
        let mut updated = false;

        let current = self.current.iter_mut().filter(|st| st.symbol == symbol);
        let sidebar = self.sidebar.iter_mut().filter(|st| st.symbol == symbol);
        for stock in current.chain(sidebar) {
            match stock.charts.iter_mut().find(|ch| ch.range == chart.range) {
                Some(existing) => *existing = chart.clone(),
                None => stock.charts.push(chart.clone()),
            }
            stock.last_update_time = Some(now);
            updated = true;
        }

        if !updated {
            debug!("Ignoring chart update for untracked symbol {}", symbol);
        }

        Ok(updated)
    }

    pub fn stock(&self, symbol: &str) -> Option<&Stock> {
        self.current
            .iter()
            .chain(self.sidebar.iter())
            .find(|st| st.symbol == symbol)
    }

    /// Build the display payload for a symbol and range
    pub fn chart_data(&self, symbol: &str, range: Range) -> Result<ChartData> {
        validate_symbol(symbol)?;

        let mut data = ChartData {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        if let Some(chart) = self.stock(symbol).and_then(|st| st.chart(range)) {
            data.quote = chart.quote.clone();
            data.chart = Some(chart.clone());
        }

        Ok(data)
    }
}
