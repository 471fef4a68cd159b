//! tests/common/harness.rs
use kestrel_governor::Config;
use kestrel_governor::connection::{ConnectionTable, GovernorEvent};
use kestrel_governor::types::Perspective;
use std::sync::Once;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "kestrel_governor=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// A test harness owning a connection table and the receiving end of its
/// event channel.
pub struct GovernorHarness {
    pub table: ConnectionTable,
    pub events: mpsc::Receiver<GovernorEvent>,
}

impl GovernorHarness {
    /// A server-side table with registry defaults.
    pub fn new() -> Self {
        Self::with_config(Config::default(), Perspective::Server)
    }

    pub fn with_config(config: Config, local: Perspective) -> Self {
        init_tracing();
        let (event_tx, events) = mpsc::channel(256);
        let table = ConnectionTable::new(config, local, event_tx).unwrap();
        Self { table, events }
    }

    /// Waits for the next event, failing the test after `limit`.
    pub async fn next_event(&mut self, limit: Duration) -> GovernorEvent {
        timeout(limit, self.events.recv())
            .await
            .expect("timed out waiting for a governor event")
            .expect("event channel closed")
    }

    /// Waits until the table has forgotten `cid`.
    pub async fn wait_forgotten(&self, cid: u32) {
        while self.table.is_recognized(cid) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}
