//! Market data client that consults the cache before the network

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{CacheKey, CachedValue, QuoteChartCache};
use crate::error::Result;
use crate::iex::{MarketDataClient, ProviderRange, Stock};
use crate::model::Quote;

/// Wraps a client so only symbols missing from the cache hit the provider.
///
/// Fresh results are merged into the cache and persisted before being
/// returned. A persist failure is returned to the caller.
pub struct CachingClient<C> {
    inner: C,
    cache: Arc<QuoteChartCache>,
}

impl<C: MarketDataClient> CachingClient<C> {
    pub fn new(inner: C, cache: Arc<QuoteChartCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<QuoteChartCache> {
        &self.cache
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

/// Split requested symbols into cache hits and symbols to fetch
fn partition<T>(
    symbols: &[String],
    lookup: impl Fn(&str) -> Option<T>,
) -> (HashMap<String, T>, Vec<String>) {
    let mut found = HashMap::new();
    let mut missing = Vec::new();
    for symbol in symbols {
        match lookup(symbol) {
            Some(value) => {
                found.insert(symbol.clone(), value);
            }
            None => missing.push(symbol.clone()),
        }
    }
    (found, missing)
}

/// Requested symbols that have a value, in request order
fn in_request_order<T>(symbols: &[String], mut values: HashMap<String, T>) -> Vec<T> {
    symbols.iter().filter_map(|s| values.remove(s)).collect()
}

#[async_trait]
impl<C: MarketDataClient> MarketDataClient for CachingClient<C> {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let (mut found, missing) = partition(symbols, |s| self.cache.get_quote(s));

        if !missing.is_empty() {
            debug!("Fetching {} uncached quotes", missing.len());
            let fetched = self.inner.get_quotes(&missing).await?;
            for quote in fetched {
                self.cache.put(
                    CacheKey::quote(&quote.symbol),
                    &CachedValue::Quote(quote.clone()),
                )?;
                found.insert(quote.symbol.clone(), quote);
            }
            self.cache.persist()?;
        }

        Ok(in_request_order(symbols, found))
    }

    async fn get_stocks(&self, symbols: &[String], range: ProviderRange) -> Result<Vec<Stock>> {
        let (mut found, missing) = partition(symbols, |s| self.cache.get_stock(s, range));

        if !missing.is_empty() {
            debug!("Fetching {} uncached {} charts", missing.len(), range);
            let fetched = self.inner.get_stocks(&missing, range).await?;
            for stock in fetched {
                self.cache.put(
                    CacheKey::chart(&stock.symbol, range),
                    &CachedValue::Chart(stock.clone()),
                )?;
                found.insert(stock.symbol.clone(), stock);
            }
            self.cache.persist()?;
        }

        Ok(in_request_order(symbols, found))
    }
}
