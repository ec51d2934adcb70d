//! REST polling transport
//!
//! Each tick fetches the full book and feeds it through the engine like a
//! snapshot. A failed poll is logged and retried on the next tick; there is
//! no connection to reset.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, warn};

use super::{bootstrap, CycleOutcome, FeedConnector};
use crate::error::BootstrapError;

const IDLE_FLUSH: Duration = Duration::from_secs(3600);

pub(super) async fn run(connector: &mut FeedConnector) {
    let Some(url) = connector
        .settings
        .rest_url
        .as_deref()
        .and_then(|base| connector.codec.snapshot_url(base))
    else {
        error!(exchange = %connector.exchange, "Polling feed has no REST endpoint");
        return;
    };

    let mut ticker = tokio::time::interval(connector.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = connector.shutdown.clone();

    loop {
        let flush_at = connector.next_flush_at();
        let flush_deadline = flush_at.unwrap_or_else(|| Instant::now() + IDLE_FLUSH);

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = tokio::time::sleep_until(flush_deadline), if flush_at.is_some() => {
                connector.flush_pending().await;
            }
            _ = ticker.tick() => {
                if !connector.should_continue().await {
                    return;
                }
                poll_once(connector, &url).await;
            }
        }
    }
}

async fn poll_once(connector: &mut FeedConnector, url: &str) {
    let fetched = bootstrap::fetch_snapshot(&connector.http, connector.codec.as_ref(), url).await;
    match fetched {
        Ok(batch) => match connector.apply_batch(batch) {
            CycleOutcome::Processed => connector.complete_cycle().await,
            CycleOutcome::Resync => connector.resync().await,
            CycleOutcome::Rejected | CycleOutcome::SnapshotRejected => {}
        },
        Err(BootstrapError::Decode(e)) => {
            connector.metrics.record_decode_error();
            warn!(exchange = %connector.exchange, error = %e, "Poll response rejected");
        }
        Err(e) => warn!(exchange = %connector.exchange, error = %e, "Poll failed, retrying next tick"),
    }
}
