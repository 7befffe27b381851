use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use switchyard_core::{Destination, Exchange, RouteError};
use tracing::info;

/// Destination that writes each exchange's body to the log at `info`.
#[derive(Debug)]
pub struct LogDestination {
    uri: String,
    sent: AtomicU64,
}

impl LogDestination {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sent: AtomicU64::new(0),
        }
    }

    /// Number of exchanges logged so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Destination for LogDestination {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<(), RouteError> {
        let sequence = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            uri = %self.uri,
            exchange_id = %exchange.id(),
            sequence,
            body = %exchange.body(),
            "exchange logged"
        );
        Ok(())
    }
}
