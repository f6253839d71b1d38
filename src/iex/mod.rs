//! Market data provider integration
//!
//! Defines the client contract consumed by the refresh pipeline, the REST
//! implementation, and a mock for offline runs and tests.

pub mod mock;
pub mod rest;
pub mod types;

// Re-export commonly used types
pub use mock::MockMarketDataClient;
pub use rest::IexRestClient;
pub use types::{ChartPoint, ProviderRange, Stock};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Quote;

/// Remote market-data client contract.
///
/// Responses are whole-batch: a symbol missing from the result means the
/// provider has no data for it, not that the batch failed.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>>;

    async fn get_stocks(&self, symbols: &[String], range: ProviderRange) -> Result<Vec<Stock>>;
}
