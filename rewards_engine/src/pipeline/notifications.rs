use std::{sync::Arc, time::Duration};

use log::{debug, error, info, trace};
use sqlx::{postgres::PgListener, PgPool};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{job::Job, worker_pool::WorkerPool};

const CHANNEL: &str = "new_orders";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Listens on the `new_orders` PostgreSQL channel and feeds decoded jobs into the pool.
///
/// The listener holds its own connection, separate from the query pool. Any fatal subscription error tears the
/// connection down and the loop reconnects from scratch after a short delay. Notifications emitted while
/// disconnected are simply missed: the orders they announced are still `NEW` and the next startup backfill picks
/// them up.
pub(crate) async fn run(db_url: String, ping_pool: PgPool, pool: Arc<WorkerPool>, token: CancellationToken) {
    info!("📡️ Starting order notification listener");
    loop {
        if token.is_cancelled() {
            info!("📡️ Notification listener stopped");
            return;
        }
        match listen(&db_url, &ping_pool, &pool, &token).await {
            Ok(()) => {
                info!("📡️ Notification listener stopped");
                return;
            },
            Err(e) => {
                error!("📡️ Notification listener error: {e}");
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("📡️ Notification listener stopped");
                        return;
                    },
                    _ = time::sleep(RECONNECT_DELAY) => {},
                }
            },
        }
    }
}

/// One subscription lifetime. Returns `Ok(())` only on cancellation.
async fn listen(
    db_url: &str,
    ping_pool: &PgPool,
    pool: &WorkerPool,
    token: &CancellationToken,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect(db_url).await?;
    listener.listen(CHANNEL).await?;
    info!("📡️ Listening for notifications on channel '{CHANNEL}'");
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            received = time::timeout(KEEPALIVE_INTERVAL, listener.recv()) => match received {
                Ok(Ok(notification)) => handle_notification(notification.payload(), pool),
                Ok(Err(e)) => return Err(e),
                // Quiet channel. Ping the database in the background so a dead link surfaces in the logs;
                // the listener connection itself reconnects inside `recv`.
                Err(_elapsed) => {
                    let ping_pool = ping_pool.clone();
                    tokio::spawn(async move {
                        if let Err(e) = sqlx::query("SELECT 1").execute(&ping_pool).await {
                            error!("📡️ Database ping failed: {e}");
                        }
                    });
                },
            },
        }
    }
}

/// Decodes one notification payload and stages it. A payload that does not parse is dropped for good: it will
/// never parse differently on a retry.
fn handle_notification(payload: &str, pool: &WorkerPool) {
    debug!("📡️ Received notification: {payload}");
    let job: Job = match serde_json::from_str(payload) {
        Ok(job) => job,
        Err(e) => {
            error!("📡️ Could not decode notification payload '{payload}': {e}");
            return;
        },
    };
    pool.submit(job);
    trace!("📡️ Notification job staged, buffer size now {}", pool.buffer_size());
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;
    use crate::pipeline::worker_pool::{WorkerFn, WorkerFuture};

    fn counting_pool(counter: Arc<AtomicU32>) -> WorkerPool {
        let worker_fn: WorkerFn = Arc::new(move |_token, _job| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }) as WorkerFuture
        });
        WorkerPool::new(1, 1, 10, worker_fn)
    }

    #[tokio::test(start_paused = true)]
    async fn well_formed_payloads_are_staged() {
        let counter = Arc::new(AtomicU32::new(0));
        let pool = counting_pool(Arc::clone(&counter));
        let token = CancellationToken::new();
        pool.start(token.clone());

        handle_notification(r#"{"order_id": 1, "user_id": 2, "number": "79927398713", "status": "NEW"}"#, &pool);
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payloads_are_dropped_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let pool = counting_pool(Arc::clone(&counter));
        let token = CancellationToken::new();
        pool.start(token.clone());

        handle_notification("not json at all", &pool);
        handle_notification(r#"{"order_id": true}"#, &pool);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.buffer_size(), 0);

        token.cancel();
        pool.stop().await;
    }
}
