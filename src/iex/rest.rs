//! IEX Cloud style REST API client implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::MarketDataClient;
use super::types::{BatchEntry, ProviderRange, Stock};
use crate::error::{ChartError, Result};
use crate::model::Quote;

/// REST client for the provider's batch endpoint
pub struct IexRestClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl IexRestClient {
    /// Create a client. A `None` timeout leaves calls unbounded.
    pub fn new(base_url: String, token: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: builder
                .build()
                .map_err(|e| ChartError::remote(&[], format!("failed to build HTTP client: {}", e)))?,
        })
    }

    /// Call the batch endpoint for the given data types
    async fn get_batch(
        &self,
        symbols: &[String],
        types: &str,
        range: Option<ProviderRange>,
    ) -> Result<HashMap<String, BatchEntry>> {
        let url = format!("{}/stock/market/batch", self.base_url);

        let mut query = vec![
            ("symbols", symbols.join(",")),
            ("types", types.to_string()),
        ];
        if let Some(range) = range {
            query.push(("range", range.as_str().to_string()));
        }
        if let Some(token) = &self.token {
            query.push(("token", token.clone()));
        }

        debug!("Fetching {} for {} symbols from: {}", types, symbols.len(), url);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ChartError::remote(symbols, format!("failed to send HTTP request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChartError::remote(
                symbols,
                format!("HTTP error {}: {}", status, body),
            ));
        }

        response
            .json::<HashMap<String, BatchEntry>>()
            .await
            .map_err(|e| ChartError::remote(symbols, format!("failed to parse batch response: {}", e)))
    }
}

#[async_trait]
impl MarketDataClient for IexRestClient {
    async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = self.get_batch(symbols, "quote", None).await?;

        let mut quotes = Vec::new();
        for symbol in symbols {
            if let Some(wire) = batch.remove(symbol).and_then(|entry| entry.quote) {
                quotes.push(wire.into_quote()?);
            }
        }

        info!("Fetched {} quotes for {} symbols", quotes.len(), symbols.len());
        Ok(quotes)
    }

    async fn get_stocks(&self, symbols: &[String], range: ProviderRange) -> Result<Vec<Stock>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = self.get_batch(symbols, "quote,chart", Some(range)).await?;

        let mut stocks = Vec::new();
        for symbol in symbols {
            let Some(entry) = batch.remove(symbol) else {
                warn!("Provider returned no data for {}", symbol);
                continue;
            };

            let quote = entry.quote.map(|q| q.into_quote()).transpose()?;

            let mut chart = Vec::with_capacity(entry.chart.len());
            for point in entry.chart {
                if let Some(point) = point.into_chart_point()? {
                    chart.push(point);
                }
            }

            stocks.push(Stock {
                symbol: symbol.clone(),
                quote,
                chart,
            });
        }

        info!(
            "Fetched {} stocks ({}) for {} symbols",
            stocks.len(),
            range,
            symbols.len()
        );
        Ok(stocks)
    }
}
