use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::common::{errors::ControlError, types::RequestId};

struct PendingEntry {
    request_type: String,
    tx: oneshot::Sender<Option<Value>>,
}

/// In-flight requests of one connection, keyed by request id.
#[derive(Default)]
pub struct PendingRequests {
    inner: DashMap<RequestId, PendingEntry>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request before it is sent. The returned guard owns the
    /// completion side and evicts the entry when dropped.
    pub fn register(self: &Arc<Self>, id: RequestId, request_type: &str) -> PendingGuard {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(
            id.clone(),
            PendingEntry {
                request_type: request_type.to_owned(),
                tx,
            },
        );
        PendingGuard {
            table: self.clone(),
            id,
            request_type: request_type.to_owned(),
            rx,
        }
    }

    /// Completes a request. Returns false when the id is not tracked.
    pub fn resolve(&self, id: &RequestId, result: Option<Value>) -> bool {
        match self.inner.remove(id) {
            Some((_, entry)) => {
                debug!("Resolved {} ({})", entry.request_type, id);
                let _ = entry.tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drops every completion handle; waiting callers resolve empty at once.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

/// Waiting side of one pending request.
pub struct PendingGuard {
    table: Arc<PendingRequests>,
    id: RequestId,
    request_type: String,
    rx: oneshot::Receiver<Option<Value>>,
}

impl PendingGuard {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Waits for the response. `None` on failure, timeout, or when the
    /// connection was torn down first.
    pub async fn wait(mut self, timeout: Duration) -> Option<Value> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                debug!("{} ({}) orphaned by disconnect", self.request_type, self.id);
                None
            }
            Err(_) => {
                let err = ControlError::Timeout {
                    request_type: self.request_type.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                debug!("{} ({})", err, self.id);
                None
            }
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.inner.remove(&self.id);
    }
}
