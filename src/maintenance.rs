use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::LedgerStore;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact one store when enough appends have piled up. Returns whether it did.
pub async fn compact_if_due(store: &LedgerStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold.max(1) {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// One maintenance pass: drop notification channels nobody listens to,
/// then compact the WAL if due.
pub async fn sweep(store: &LedgerStore, threshold: u64) {
    let pruned = store.notify.prune();
    if pruned > 0 {
        debug!("pruned {pruned} idle notification channels");
    }
    compact_if_due(store, threshold).await;
}

/// Background task: sweep the store periodically.
/// Ends once the store is dropped everywhere else.
pub async fn run_maintenance(store: Arc<LedgerStore>, threshold: u64) {
    let weak = Arc::downgrade(&store);
    drop(store);
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let Some(store) = weak.upgrade() else { return };
        sweep(&store, threshold).await;
    }
}
