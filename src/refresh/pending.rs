//! Pending update queue shared by fetch tasks and the consumer

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::ChartError;
use crate::model::{Chart, Range};

/// A fetch result waiting to be applied
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub symbol: String,
    pub range: Range,
    pub result: Result<Chart, ChartError>,
}

impl PendingUpdate {
    pub fn loaded(symbol: impl Into<String>, range: Range, chart: Chart) -> Self {
        Self {
            symbol: symbol.into(),
            range,
            result: Ok(chart),
        }
    }

    pub fn failed(symbol: impl Into<String>, range: Range, error: ChartError) -> Self {
        Self {
            symbol: symbol.into(),
            range,
            result: Err(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

struct Inner {
    updates: Mutex<Vec<PendingUpdate>>,
    wake: Notify,
}

/// Lock-guarded append buffer. Producers append whole batches and wake the
/// consumer; the consumer swaps the buffer out in one step.
#[derive(Clone)]
pub struct PendingQueue {
    inner: Arc<Inner>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                updates: Mutex::new(Vec::new()),
                wake: Notify::new(),
            }),
        }
    }

    /// Append a batch and wake the consumer
    pub fn push_all(&self, updates: Vec<PendingUpdate>) {
        if updates.is_empty() {
            return;
        }
        self.inner.updates.lock().extend(updates);
        self.inner.wake.notify_one();
    }

    /// Take everything queued so far, leaving an empty buffer behind
    pub fn take(&self) -> Vec<PendingUpdate> {
        std::mem::take(&mut *self.inner.updates.lock())
    }

    /// Wait until a producer has appended since the last wake-up
    pub async fn notified(&self) {
        self.inner.wake.notified().await;
    }

    /// Wake the consumer without appending
    pub fn wake(&self) {
        self.inner.wake.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
