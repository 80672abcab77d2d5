use std::{sync::Arc, time::Duration};

use log::{debug, error, info};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    pg::PgDatabase,
    pipeline::{job::Job, worker_pool::WorkerPool},
    traits::OrderManagement,
};

const PAGE_SIZE: i64 = 100;
const PAGE_DELAY: Duration = Duration::from_millis(100);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Resubmits orders that were already `NEW` when the process started.
///
/// Pages through the table oldest-first and hands each page to the pool as a batch. The short pause between pages
/// keeps a large backlog from pinning the staging buffer at its cap on a cold start; it is pacing, not
/// correctness, since anything dropped under pressure is rediscovered on the next start.
pub(crate) async fn run(db: PgDatabase, pool: Arc<WorkerPool>, token: CancellationToken) {
    info!("🔎️ Scanning for unprocessed orders");
    let mut offset = 0i64;
    loop {
        if token.is_cancelled() {
            info!("🔎️ Backfill scan stopped");
            return;
        }
        match db.fetch_new_orders(PAGE_SIZE, offset).await {
            Err(e) => {
                error!("🔎️ Could not fetch a backfill page: {e}");
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("🔎️ Backfill scan stopped");
                        return;
                    },
                    _ = time::sleep(RETRY_DELAY) => {},
                }
            },
            Ok(orders) if orders.is_empty() => {
                info!("🔎️ Backfill scan complete, {offset} orders resubmitted");
                return;
            },
            Ok(orders) => {
                let count = orders.len() as i64;
                pool.submit_batch(orders.iter().map(Job::from_order).collect());
                offset += count;
                debug!("🔎️ Resubmitted a page of {count} orders (total {offset})");
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("🔎️ Backfill scan stopped");
                        return;
                    },
                    _ = time::sleep(PAGE_DELAY) => {},
                }
            },
        }
    }
}
