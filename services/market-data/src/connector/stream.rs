//! Websocket transport
//!
//! Every disconnect, exchange reconnect request or resync ends the session;
//! the book and protocol state are discarded and a new connection is opened
//! after a capped exponential delay. A session that connects resets the
//! delay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use super::{Backoff, CycleOutcome, FeedConnector};
use crate::error::{FeedError, FeedResult};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Stand-in deadline for the flush branch while nothing is pending.
const IDLE_FLUSH: Duration = Duration::from_secs(3600);

enum SessionEnd {
    /// Shutdown or control key cleared.
    Stop,
    /// Book discarded; reconnect from scratch.
    Restart,
}

pub(super) async fn run(connector: &mut FeedConnector) {
    let Some(url) = connector.settings.ws_url.clone() else {
        error!(exchange = %connector.exchange, "Streaming feed has no websocket URL");
        return;
    };
    let mut backoff = Backoff::new(
        connector.settings.reconnect_initial,
        connector.settings.reconnect_max,
    );

    loop {
        if !connector.should_continue().await {
            return;
        }

        match session(connector, &url, &mut backoff).await {
            Ok(SessionEnd::Stop) => return,
            Ok(SessionEnd::Restart) => {}
            Err(e) => warn!(exchange = %connector.exchange, error = %e, "Stream session ended"),
        }

        connector.resync().await;
        connector.metrics.record_reconnect();
        let delay = backoff.next_delay();
        info!(
            exchange = %connector.exchange,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting"
        );
        if connector.pause(delay).await {
            return;
        }
    }
}

async fn session(
    connector: &mut FeedConnector,
    url: &str,
    backoff: &mut Backoff,
) -> FeedResult<SessionEnd> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(exchange = %connector.exchange, url, "Stream connected");
    backoff.reset();

    let (mut write, mut read) = ws_stream.split();
    for message in connector.codec.subscribe_messages() {
        write.send(Message::Text(message)).await?;
    }

    let mut shutdown = connector.shutdown.clone();
    let mut control = tokio::time::interval(connector.settings.control_check_interval);
    control.set_missed_tick_behavior(MissedTickBehavior::Delay);
    control.tick().await;
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        let flush_at = connector.next_flush_at();
        let flush_deadline = flush_at.unwrap_or_else(|| Instant::now() + IDLE_FLUSH);

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(SessionEnd::Stop);
                }
            }
            _ = control.tick() => {
                if !connector.should_continue().await {
                    return Ok(SessionEnd::Stop);
                }
            }
            _ = ping.tick() => {
                write.send(Message::Ping(Vec::new())).await?;
            }
            _ = tokio::time::sleep_until(flush_deadline), if flush_at.is_some() => {
                connector.flush_pending().await;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match connector.handle_text(&text) {
                    CycleOutcome::Processed => {
                        connector.complete_cycle().await;
                        if connector.needs_snapshot() {
                            match connector.bootstrap().await {
                                CycleOutcome::Processed => connector.complete_cycle().await,
                                CycleOutcome::Resync => return Ok(SessionEnd::Restart),
                                CycleOutcome::Rejected | CycleOutcome::SnapshotRejected => {}
                            }
                        }
                    }
                    CycleOutcome::Resync => return Ok(SessionEnd::Restart),
                    CycleOutcome::Rejected | CycleOutcome::SnapshotRejected => {}
                },
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(exchange = %connector.exchange, frame = ?frame, "Stream closed by exchange");
                    return Err(FeedError::StreamClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(FeedError::StreamClosed),
            }
        }
    }
}
