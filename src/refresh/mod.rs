//! Refresh pipeline
//!
//! Fetch tasks run concurrently on the tokio runtime and append their results
//! to a shared [`PendingQueue`]; a single [`UpdateConsumer`] drains the queue
//! and applies the results to the model and its widgets. Results are applied
//! in drain order with no staleness check, so a slow fetch completing after a
//! newer one for the same symbol overwrites it.

pub mod consumer;
pub mod coordinator;
pub mod pending;

pub use consumer::{ChartWidget, ConsumeStats, UpdateConsumer, WidgetState};
pub use coordinator::{RefreshCoordinator, RefreshRequest, RequestBuilder};
pub use pending::{PendingQueue, PendingUpdate};
