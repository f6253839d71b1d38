//! Error types shared by the refresh pipeline and the quote/chart cache

use thiserror::Error;

/// Tagged error kinds surfaced by the pipeline.
///
/// Every variant carries owned context so a single failure can be cloned
/// into one pending update per affected symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    /// Malformed symbol, unset or unsupported range/interval
    #[error("validation error: {0}")]
    Validation(String),

    /// Cache miss or a symbol missing from a provider response
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport or provider-side failure of a fetch call
    #[error("remote error{}: {message}", for_symbols(.symbols))]
    Remote { symbols: String, message: String },

    /// Durable store read/write failure
    #[error("persistence error ({key}): {message}")]
    Persistence { key: String, message: String },
}

impl ChartError {
    pub fn remote(symbols: &[String], message: impl Into<String>) -> Self {
        ChartError::Remote {
            symbols: symbols.join(","),
            message: message.into(),
        }
    }

    pub fn persistence(key: impl Into<String>, message: impl ToString) -> Self {
        ChartError::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn no_data(symbol: &str) -> Self {
        ChartError::NotFound(format!("no stock data for {:?}", symbol))
    }

    /// Short name of the error kind, used in logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            ChartError::Validation(_) => "validation",
            ChartError::NotFound(_) => "not_found",
            ChartError::Remote { .. } => "remote",
            ChartError::Persistence { .. } => "persistence",
        }
    }
}

fn for_symbols(symbols: &str) -> String {
    if symbols.is_empty() {
        String::new()
    } else {
        format!(" for {}", symbols)
    }
}

pub type Result<T> = std::result::Result<T, ChartError>;
