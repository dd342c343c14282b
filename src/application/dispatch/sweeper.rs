//! Pending request sweeper
//!
//! Fails requests whose charge point never answered, so their waiters and
//! queues do not leak when a response is lost.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::queue::{RequestError, SharedActionMessageQueue};
use crate::support::shutdown::ShutdownSignal;

/// Run `sweep_once` every `interval` until shutdown.
pub fn spawn_sweeper(
    queue: SharedActionMessageQueue,
    max_age: Duration,
    interval: Duration,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            max_age_secs = max_age.as_secs(),
            interval_secs = interval.as_secs(),
            "Pending request sweeper started"
        );
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&queue, max_age);
                }
                _ = shutdown.notified().wait() => {
                    debug!("Pending request sweeper shutting down");
                    break;
                }
            }
        }

        info!("Pending request sweeper stopped");
    })
}

/// Fail every pending request older than `max_age`. Returns how many
/// were dropped.
pub fn sweep_once(queue: &SharedActionMessageQueue, max_age: Duration) -> usize {
    let expired = queue.purge_expired(max_age);
    let count = expired.len();

    for pending in expired {
        warn!(
            charge_point_id = pending.client.charge_point_id(),
            message_id = pending.message_id.as_str(),
            action = pending.action.name(),
            "Pending request expired"
        );
        pending.complete(Err(RequestError::Timeout));
    }
    if count > 0 {
        metrics::counter!("ocpp_pending_expired_total").increment(count as u64);
    }
    count
}
