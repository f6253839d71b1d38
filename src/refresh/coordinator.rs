//! Concurrent fetch coordination
//!
//! Every [`RefreshRequest`] becomes one independent task on the runtime. Tasks
//! never return errors: a failed fetch turns into one error update per symbol
//! in its group, and every outcome goes through the shared [`PendingQueue`].
//! There is no task limit, no retry and no cancellation of superseded fetches.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pending::{PendingQueue, PendingUpdate};
use crate::aggregator::{ChartSettings, SessionAggregator};
use crate::error::{ChartError, Result};
use crate::iex::{MarketDataClient, ProviderRange};
use crate::metrics::FetchLatency;
use crate::model::{Range, validate_symbol};

/// A group of symbols fetched together for one range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub symbols: BTreeSet<String>,
    pub range: Range,
}

impl RefreshRequest {
    pub fn new(range: Range) -> Self {
        Self {
            symbols: BTreeSet::new(),
            range,
        }
    }

    /// Symbols and range are well formed
    pub fn validate(&self) -> Result<()> {
        ProviderRange::for_range(self.range)?;
        for symbol in &self.symbols {
            validate_symbol(symbol)?;
        }
        Ok(())
    }
}

/// Groups symbols into one request per range
#[derive(Debug, Default)]
pub struct RequestBuilder {
    requests: Vec<RefreshRequest>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols for a range, rejecting bad symbols and an unset range
    pub fn add<S: AsRef<str>>(&mut self, symbols: &[S], range: Range) -> Result<&mut Self> {
        ProviderRange::for_range(range)?;
        for symbol in symbols {
            validate_symbol(symbol.as_ref())?;
        }

        let idx = match self.requests.iter().position(|r| r.range == range) {
            Some(idx) => idx,
            None => {
                self.requests.push(RefreshRequest::new(range));
                self.requests.len() - 1
            }
        };
        self.requests[idx]
            .symbols
            .extend(symbols.iter().map(|s| s.as_ref().to_string()));
        Ok(self)
    }

    /// Requests with at least one symbol
    pub fn build(self) -> Vec<RefreshRequest> {
        self.requests
            .into_iter()
            .filter(|r| !r.symbols.is_empty())
            .collect()
    }
}

/// Launches fetch tasks and routes their results to the pending queue
pub struct RefreshCoordinator {
    client: Arc<dyn MarketDataClient>,
    aggregator: SessionAggregator,
    queue: PendingQueue,
    latency: Arc<FetchLatency>,
    handle: Handle,
}

impl RefreshCoordinator {
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        settings: ChartSettings,
        queue: PendingQueue,
        handle: Handle,
    ) -> Self {
        Self {
            client,
            aggregator: SessionAggregator::new(settings),
            queue,
            latency: Arc::new(FetchLatency::default()),
            handle,
        }
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn latency(&self) -> &FetchLatency {
        &self.latency
    }

    /// Spawn one fetch task per request and return immediately.
    ///
    /// All requests are validated before anything is spawned.
    pub fn refresh(&self, requests: Vec<RefreshRequest>) -> Result<Vec<JoinHandle<()>>> {
        for request in &requests {
            request.validate()?;
        }

        let handles: Vec<JoinHandle<()>> = requests
            .into_iter()
            .filter(|r| !r.symbols.is_empty())
            .map(|request| {
                let task = FetchTask {
                    client: Arc::clone(&self.client),
                    aggregator: self.aggregator.clone(),
                    queue: self.queue.clone(),
                    latency: Arc::clone(&self.latency),
                };
                self.handle.spawn(task.run(request))
            })
            .collect();

        debug!("Spawned {} fetch tasks", handles.len());
        Ok(handles)
    }
}

/// Everything one spawned fetch needs, owned by the task
struct FetchTask {
    client: Arc<dyn MarketDataClient>,
    aggregator: SessionAggregator,
    queue: PendingQueue,
    latency: Arc<FetchLatency>,
}

impl FetchTask {
    async fn run(self, request: RefreshRequest) {
        let updates = self.fetch(&request).await;

        let errors = updates.iter().filter(|u| u.is_error()).count();
        ::metrics::counter!("chartfeed_pending_updates", updates.len() as u64);
        info!(
            "Fetched {} {} charts ({} errors)",
            updates.len(),
            request.range,
            errors
        );

        self.queue.push_all(updates);
    }

    async fn fetch(&self, request: &RefreshRequest) -> Vec<PendingUpdate> {
        let range = request.range;
        let symbols: Vec<String> = request.symbols.iter().cloned().collect();

        let provider_range = match ProviderRange::for_range(range) {
            Ok(r) => r,
            Err(e) => return fan_out(&symbols, range, &e),
        };

        let start = Instant::now();
        let result = self.client.get_stocks(&symbols, provider_range).await;
        self.latency.record(start.elapsed());

        let stocks = match result {
            Ok(stocks) => stocks,
            Err(e) => {
                warn!("Fetch failed for {}: {}", symbols.join(","), e);
                return fan_out(&symbols, range, &e);
            }
        };

        let mut by_symbol: HashMap<String, _> =
            stocks.into_iter().map(|s| (s.symbol.clone(), s)).collect();

        symbols
            .iter()
            .map(|symbol| match by_symbol.remove(symbol) {
                Some(stock) => match self.aggregator.build_chart(&stock, range) {
                    Ok(chart) => PendingUpdate::loaded(symbol, range, chart),
                    Err(e) => PendingUpdate::failed(symbol, range, e),
                },
                None => PendingUpdate::failed(symbol, range, ChartError::no_data(symbol)),
            })
            .collect()
    }
}

/// One error update per symbol, all carrying the same error
fn fan_out(symbols: &[String], range: Range, error: &ChartError) -> Vec<PendingUpdate> {
    symbols
        .iter()
        .map(|symbol| PendingUpdate::failed(symbol, range, error.clone()))
        .collect()
}
