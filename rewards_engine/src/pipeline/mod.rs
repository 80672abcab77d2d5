//! The asynchronous order-processing pipeline.
//!
//! Every order uploaded in status `NEW` must eventually reach `PROCESSED` or `INVALID`. Two sources feed the
//! pipeline: a PostgreSQL `NOTIFY` channel announcing fresh uploads in near-real-time, and a startup scan that
//! resubmits whatever was already waiting. Both stage jobs into a bounded [`WorkerPool`]; each worker drives one
//! order at a time against the external accrual service, writing every authoritative status back to the store and
//! looping until the order terminates. Failures re-enter the pool with a quadratic back-off and a hard attempt cap.
//!
//! [`OrderPipeline`] owns the lot and propagates cancellation into every suspension point.

use std::{sync::Arc, time::Duration};

use log::{error, info, trace};
use tokio::time;
use tokio_util::sync::CancellationToken;

mod accrual;
mod backfill;
mod job;
mod notifications;
mod worker_pool;

pub use accrual::{AccrualClient, AccrualOutcome};
pub use job::Job;
pub use worker_pool::{JobError, WorkerFn, WorkerFuture, WorkerPool};

use crate::{
    db_types::OrderStatusType,
    pg::PgDatabase,
    traits::{OrderApiError, OrderManagement},
};

const WORKERS: usize = 10;
const BATCH_SIZE: usize = 100;
const MAX_BUFFER: usize = 1000;

/// Supervisor for the order-processing pipeline. Owns the worker pool, the notification listener and the backfill
/// scan, and ties their lifetimes to a single cancellation token.
pub struct OrderPipeline {
    db: PgDatabase,
    token: CancellationToken,
    pool: Arc<WorkerPool>,
}

impl OrderPipeline {
    pub fn new(db: PgDatabase, accrual: AccrualClient) -> Self {
        let token = CancellationToken::new();
        let worker_fn = processing_fn(db.clone(), accrual);
        let pool = Arc::new(WorkerPool::new(WORKERS, BATCH_SIZE, MAX_BUFFER, worker_fn));
        Self { db, token, pool }
    }

    /// Starts the workers, the notification listener and the backfill scan. Call at most once.
    pub fn start(&self) {
        self.pool.start(self.token.clone());
        tokio::spawn(notifications::run(
            self.db.url().to_string(),
            self.db.pool().clone(),
            Arc::clone(&self.pool),
            self.token.clone(),
        ));
        tokio::spawn(backfill::run(self.db.clone(), Arc::clone(&self.pool), self.token.clone()));
        info!("⚙️ Order pipeline started with {WORKERS} workers");
    }

    /// The root token for the pipeline. Cancelling it stops all pipeline work; [`OrderPipeline::shutdown`] still
    /// has to run to drain the pool.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels all pipeline work and waits for the pool to drain and exit.
    pub async fn shutdown(&self) {
        info!("⚙️ Shutting down the order pipeline");
        self.token.cancel();
        self.pool.stop().await;
    }
}

fn processing_fn(db: PgDatabase, accrual: AccrualClient) -> WorkerFn {
    Arc::new(move |token, job| {
        let db = db.clone();
        let accrual = accrual.clone();
        Box::pin(async move { process_order(db, accrual, token, job).await }) as WorkerFuture
    })
}

/// Drives a single order until it terminates or the attempt fails.
///
/// A non-terminal status does not return: the loop keeps this job on its worker, sleeping between polls, until the
/// accrual service settles the order. Every returned error re-enters the pool's retry path.
async fn process_order(
    db: PgDatabase,
    accrual: AccrualClient,
    token: CancellationToken,
    job: Job,
) -> Result<(), JobError> {
    info!("⚙️ Processing order {} (number {}, attempt {})", job.order_id, job.number, job.attempt);
    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                return Err(JobError(format!("processing cancelled for order {}", job.number)));
            },
            outcome = accrual.poll(&job.number) => outcome,
        };
        match outcome {
            AccrualOutcome::Update { status, accrual } => {
                if let Err(e) = db.update_order_progress(job.order_id, status, accrual).await {
                    if matches!(e, OrderApiError::OrderNotFound(_)) {
                        // A job always refers to a persisted row; this is a logic bug somewhere upstream.
                        error!("⚙️ Order {} vanished from the store: {e}", job.order_id);
                    }
                    return Err(JobError(format!("could not update order status: {e}")));
                }
                info!("⚙️ Order {} status updated to {status}", job.number);
                if status.is_terminal() {
                    info!("⚙️ Order {} processing completed with status {status}", job.number);
                    return Ok(());
                }
                let wait = wait_time(status);
                trace!("⚙️ Order {} is {status}, polling again in {wait:?}", job.number);
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(JobError(format!("processing cancelled while waiting for order {}", job.number)));
                    },
                    _ = time::sleep(wait) => {},
                }
            },
            AccrualOutcome::NotRegistered => {
                return Err(JobError(format!("order {} not registered in accrual system", job.number)));
            },
            AccrualOutcome::RateLimited { retry_after_secs } => {
                return Err(JobError(format!("rate limited; service asked for {retry_after_secs}s of backoff")));
            },
            AccrualOutcome::Transient(e) => return Err(JobError(e)),
            AccrualOutcome::Permanent(e) => {
                error!("⚙️ Order {}: likely-fatal accrual error: {e}", job.number);
                return Err(JobError(e));
            },
        }
    }
}

/// How long to wait before re-polling a non-terminal order.
fn wait_time(status: OrderStatusType) -> Duration {
    match status {
        OrderStatusType::Registered => Duration::from_secs(1),
        _ => Duration::from_secs(5),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registered_polls_faster_than_the_rest() {
        assert_eq!(wait_time(OrderStatusType::Registered), Duration::from_secs(1));
        assert_eq!(wait_time(OrderStatusType::Processing), Duration::from_secs(5));
        assert_eq!(wait_time(OrderStatusType::New), Duration::from_secs(5));
    }
}
