//! Single-owner consumer applying fetch results to the model and widgets

use tracing::{debug, warn};

use super::coordinator::{RefreshRequest, RequestBuilder};
use super::pending::{PendingQueue, PendingUpdate};
use crate::error::{ChartError, Result};
use crate::model::{ChartData, Model, Range};

/// Loading state of a chart widget. Every refresh moves a widget back to
/// `Loading`; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Loading,
    Loaded,
    Errored,
}

/// A display slot bound to one symbol and range
#[derive(Debug, Clone)]
pub struct ChartWidget {
    pub symbol: String,
    pub range: Range,
    pub state: WidgetState,
    pub data: Option<ChartData>,
    pub error: Option<ChartError>,
}

impl ChartWidget {
    fn new(symbol: &str, range: Range) -> Self {
        Self {
            symbol: symbol.to_string(),
            range,
            state: WidgetState::Loading,
            data: None,
            error: None,
        }
    }

    fn start_loading(&mut self) {
        self.state = WidgetState::Loading;
        self.error = None;
    }

    fn loaded(&mut self, data: ChartData) {
        self.state = WidgetState::Loaded;
        self.data = Some(data);
        self.error = None;
    }

    fn errored(&mut self, error: ChartError) {
        self.state = WidgetState::Errored;
        self.error = Some(error);
    }
}

/// Outcome of one drain of the pending queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumeStats {
    pub taken: usize,
    pub applied: usize,
    pub errored: usize,
    pub ignored: usize,
}

impl std::ops::AddAssign for ConsumeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.taken += rhs.taken;
        self.applied += rhs.applied;
        self.errored += rhs.errored;
        self.ignored += rhs.ignored;
    }
}

/// Owns the model and widgets; only this side ever mutates them
pub struct UpdateConsumer {
    model: Model,
    queue: PendingQueue,
    chart_range: Range,
    thumb_range: Range,
    main: Option<ChartWidget>,
    thumbs: Vec<ChartWidget>,
}

impl UpdateConsumer {
    /// `chart_range` is used for the main chart, `thumb_range` for sidebar thumbnails
    pub fn new(queue: PendingQueue, chart_range: Range, thumb_range: Range) -> Self {
        Self {
            model: Model::new(),
            queue,
            chart_range,
            thumb_range,
            main: None,
            thumbs: Vec::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn main_widget(&self) -> Option<&ChartWidget> {
        self.main.as_ref()
    }

    pub fn thumbs(&self) -> &[ChartWidget] {
        &self.thumbs
    }

    pub fn thumb(&self, symbol: &str) -> Option<&ChartWidget> {
        self.thumbs.iter().find(|w| w.symbol == symbol)
    }

    fn widgets(&self) -> impl Iterator<Item = &ChartWidget> {
        self.main.iter().chain(self.thumbs.iter())
    }

    fn widgets_mut(&mut self) -> impl Iterator<Item = &mut ChartWidget> {
        self.main.iter_mut().chain(self.thumbs.iter_mut())
    }

    /// True once no widget is waiting on a fetch
    pub fn is_settled(&self) -> bool {
        self.widgets().all(|w| w.state != WidgetState::Loading)
    }

    /// Point the main chart at a symbol; returns true if it changed
    pub fn set_current(&mut self, symbol: &str) -> Result<bool> {
        if !self.model.set_current_symbol(symbol)? {
            return Ok(false);
        }
        let mut widget = ChartWidget::new(symbol, self.chart_range);
        if let Some(data) = self.cached_data(symbol, self.chart_range) {
            widget.data = Some(data);
        }
        self.main = Some(widget);
        Ok(true)
    }

    pub fn add_sidebar(&mut self, symbol: &str) -> Result<bool> {
        if !self.model.add_sidebar_symbol(symbol)? {
            return Ok(false);
        }
        let mut widget = ChartWidget::new(symbol, self.thumb_range);
        if let Some(data) = self.cached_data(symbol, self.thumb_range) {
            widget.data = Some(data);
        }
        self.thumbs.push(widget);
        Ok(true)
    }

    /// Stop tracking a sidebar symbol. Results still in flight for it are
    /// dropped when they arrive.
    pub fn remove_sidebar(&mut self, symbol: &str) -> Result<bool> {
        if !self.model.remove_sidebar_symbol(symbol)? {
            return Ok(false);
        }
        self.thumbs.retain(|w| w.symbol != symbol);
        Ok(true)
    }

    fn cached_data(&self, symbol: &str, range: Range) -> Option<ChartData> {
        self.model
            .chart_data(symbol, range)
            .ok()
            .filter(|data| data.chart.is_some())
    }

    /// Requests covering every widget bound to `symbol`
    pub fn refresh_one(&self, symbol: &str) -> Result<Vec<RefreshRequest>> {
        let mut builder = RequestBuilder::new();
        for widget in self.widgets().filter(|w| w.symbol == symbol) {
            builder.add(&[symbol], widget.range)?;
        }
        Ok(builder.build())
    }

    pub fn current_requests(&self) -> Result<Vec<RefreshRequest>> {
        let mut builder = RequestBuilder::new();
        if let Some(main) = &self.main {
            builder.add(&[main.symbol.as_str()], main.range)?;
        }
        Ok(builder.build())
    }

    pub fn sidebar_requests(&self) -> Result<Vec<RefreshRequest>> {
        let mut builder = RequestBuilder::new();
        let symbols: Vec<&str> = self.thumbs.iter().map(|w| w.symbol.as_str()).collect();
        builder.add(&symbols, self.thumb_range)?;
        Ok(builder.build())
    }

    /// Main chart and every thumbnail
    pub fn full_requests(&self) -> Result<Vec<RefreshRequest>> {
        let mut builder = RequestBuilder::new();
        for widget in self.widgets() {
            builder.add(&[widget.symbol.as_str()], widget.range)?;
        }
        Ok(builder.build())
    }

    /// Move every widget covered by the requests back to `Loading`
    pub fn mark_refresh_started(&mut self, requests: &[RefreshRequest]) {
        for widget in self.widgets_mut() {
            let covered = requests
                .iter()
                .any(|r| r.range == widget.range && r.symbols.contains(&widget.symbol));
            if covered {
                widget.start_loading();
            }
        }
    }

    /// Drain the queue once and apply every taken update
    pub fn process_pending(&mut self) -> ConsumeStats {
        let updates = self.queue.take();
        let mut stats = ConsumeStats {
            taken: updates.len(),
            ..Default::default()
        };

        for update in updates {
            self.apply(update, &mut stats);
        }

        if stats.taken > 0 {
            debug!(
                "Applied {} updates ({} errors, {} ignored)",
                stats.applied, stats.errored, stats.ignored
            );
        }
        stats
    }

    /// Wait for a producer to wake the consumer, then drain
    pub async fn next_batch(&mut self) -> ConsumeStats {
        self.queue.notified().await;
        self.process_pending()
    }

    /// Only widgets bound to both the update's symbol and its range change,
    /// so a failed thumbnail fetch never marks the main chart `Errored`.
    fn apply(&mut self, update: PendingUpdate, stats: &mut ConsumeStats) {
        let symbol = update.symbol.clone();
        let range = update.range;

        match update.result {
            Err(error) => {
                let mut matched = false;
                for widget in self.widgets_mut().filter(|w| w.symbol == symbol && w.range == range) {
                    widget.errored(error.clone());
                    matched = true;
                }
                if matched {
                    warn!("Refresh of {} ({}) failed: {}", symbol, range, error);
                    stats.errored += 1;
                } else {
                    stats.ignored += 1;
                }
            }
            Ok(chart) => {
                match self.model.update_chart(&symbol, chart) {
                    Ok(true) => {}
                    Ok(false) => {
                        stats.ignored += 1;
                        return;
                    }
                    Err(e) => {
                        warn!("Dropping update for {}: {}", symbol, e);
                        stats.ignored += 1;
                        return;
                    }
                }

                let data = match self.model.chart_data(&symbol, range) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("No display data for {}: {}", symbol, e);
                        stats.ignored += 1;
                        return;
                    }
                };

                for widget in self.widgets_mut().filter(|w| w.symbol == symbol && w.range == range) {
                    widget.loaded(data.clone());
                }
                stats.applied += 1;
            }
        }
    }
}
