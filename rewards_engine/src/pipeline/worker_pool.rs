use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use thiserror::Error;
use tokio::{
    sync::{
        mpsc,
        mpsc::{error::TrySendError, Receiver, Sender},
        Mutex, Notify,
    },
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::pipeline::job::Job;

/// Error returned by a worker function. Feeds the retry path and its logging; carries no structure beyond the
/// message because the pool treats all failures alike.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct JobError(pub String);

pub type WorkerFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;
pub type WorkerFn = Arc<dyn Fn(CancellationToken, Job) -> WorkerFuture + Send + Sync>;

/// A failed job is retried up to this many times (so the worker function runs at most `MAX_ATTEMPTS + 1` times per
/// job instance), with a back-off of `attempt²` seconds: 1 s, 4 s, 9 s.
const MAX_ATTEMPTS: u32 = 3;
const FLUSH_TICK: Duration = Duration::from_millis(500);

/// Bounded buffered worker pool.
///
/// Producers append to a staging buffer; a flusher task moves staged jobs into a small egress channel that a fixed
/// set of workers consume from. The staging buffer absorbs bursts (notification storms, backfill pages) without
/// letting producers observe backpressure, while `max_buffer` caps memory: reaching it forces a flush on the
/// producer's call, and anything the egress channel cannot take is dropped with a warning. Dropped jobs are not
/// lost for good: their orders are still `NEW` and the next startup backfill resubmits them.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
}

struct PoolShared {
    workers: usize,
    batch_size: usize,
    max_buffer: usize,
    staging: RwLock<Vec<Job>>,
    /// Coalesced wakeup for the flusher. `notify_one` holds at most one permit, so a burst of submits produces a
    /// single flush.
    flush_signal: Notify,
    /// `None` once the pool has been stopped; taking the sender is what closes the egress channel.
    egress_tx: StdMutex<Option<Sender<Job>>>,
    egress_rx: Mutex<Receiver<Job>>,
    worker_fn: WorkerFn,
    stopped: AtomicBool,
}

impl WorkerPool {
    pub fn new(workers: usize, batch_size: usize, max_buffer: usize, worker_fn: WorkerFn) -> Self {
        let (tx, rx) = mpsc::channel(workers * 10);
        let shared = PoolShared {
            workers,
            batch_size,
            max_buffer,
            staging: RwLock::new(Vec::with_capacity(batch_size)),
            flush_signal: Notify::new(),
            egress_tx: StdMutex::new(Some(tx)),
            egress_rx: Mutex::new(rx),
            worker_fn,
            stopped: AtomicBool::new(false),
        };
        Self { shared: Arc::new(shared), handles: StdMutex::new(Vec::new()) }
    }

    /// Spawns the worker tasks and the flusher. Call at most once.
    pub fn start(&self, token: CancellationToken) {
        let mut handles = lock(&self.handles);
        for id in 0..self.shared.workers {
            handles.push(tokio::spawn(run_worker(Arc::clone(&self.shared), token.clone(), id)));
        }
        handles.push(tokio::spawn(run_flusher(Arc::clone(&self.shared), token)));
    }

    /// Stages one job. Jobs submitted after [`WorkerPool::stop`] are dropped with a warning.
    pub fn submit(&self, job: Job) {
        self.shared.submit(job);
    }

    /// Stages a batch of jobs atomically.
    pub fn submit_batch(&self, jobs: Vec<Job>) {
        self.shared.submit_batch(jobs);
    }

    /// Closes the egress channel and waits for the workers and the flusher to drain and exit.
    ///
    /// The flusher only exits on cancellation, so cancel the token passed to [`WorkerPool::start`] before calling
    /// this (the pipeline supervisor does).
    pub async fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        lock(&self.shared.egress_tx).take();
        let handles: Vec<_> = lock(&self.handles).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("📦️ Worker pool stopped");
    }

    /// Snapshot of the staging buffer size, for observability. A steadily rising value means the workers are
    /// stalled.
    pub fn buffer_size(&self) -> usize {
        self.shared.staging_read().len()
    }
}

impl PoolShared {
    fn submit(&self, job: Job) {
        if self.stopped.load(Ordering::SeqCst) {
            warn!("📦️ Order {} submitted after pool stop, dropping", job.order_id);
            return;
        }
        let mut staging = self.staging_write();
        if staging.len() >= self.max_buffer {
            warn!("📦️ Staging buffer at capacity, forcing flush");
            self.flush_locked(&mut staging);
        }
        staging.push(job);
        trace!("📦️ Job staged, buffer size now {}", staging.len());
        if staging.len() >= self.batch_size {
            self.flush_signal.notify_one();
        }
    }

    fn submit_batch(&self, jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }
        if self.stopped.load(Ordering::SeqCst) {
            warn!("📦️ Batch of {} jobs submitted after pool stop, dropping", jobs.len());
            return;
        }
        let mut staging = self.staging_write();
        if staging.len() + jobs.len() > self.max_buffer {
            warn!("📦️ Batch of {} jobs would overflow the staging buffer, flushing first", jobs.len());
            self.flush_locked(&mut staging);
        }
        let count = jobs.len();
        staging.extend(jobs);
        debug!("📦️ Batch of {count} jobs staged, buffer size now {}", staging.len());
        if staging.len() >= self.batch_size {
            self.flush_signal.notify_one();
        }
    }

    fn flush(&self) {
        let mut staging = self.staging_write();
        if !staging.is_empty() {
            self.flush_locked(&mut staging);
        }
    }

    /// Moves staged jobs to the egress channel. Never blocks: a full channel drops the remaining jobs, because the
    /// caller may be a producer holding the staging lock through its submit path.
    fn flush_locked(&self, staging: &mut Vec<Job>) {
        let tx = lock(&self.egress_tx).clone();
        let Some(tx) = tx else {
            warn!("📦️ Pool is stopped, discarding {} staged jobs", staging.len());
            staging.clear();
            return;
        };
        let drained = staging.len();
        for job in staging.drain(..) {
            if let Err(e) = tx.try_send(job) {
                match e {
                    TrySendError::Full(job) => {
                        warn!("📦️ Worker queue full, dropping order {} from staging", job.order_id);
                    },
                    TrySendError::Closed(job) => {
                        warn!("📦️ Worker queue closed, dropping order {} from staging", job.order_id);
                    },
                }
            }
        }
        trace!("📦️ Flushed staging buffer, handed {drained} jobs to the workers");
    }

    fn staging_read(&self) -> RwLockReadGuard<'_, Vec<Job>> {
        self.staging.read().expect("staging buffer lock poisoned")
    }

    fn staging_write(&self) -> RwLockWriteGuard<'_, Vec<Job>> {
        self.staging.write().expect("staging buffer lock poisoned")
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("worker pool lock poisoned")
}

/// Arms a timer that re-enters `submit` after the back-off. The deferred submission selects against the token, so
/// a stopped pool does not receive late retries (and tolerates them with a warning if it ever does).
fn schedule_retry(pool: Arc<PoolShared>, mut job: Job, token: &CancellationToken) {
    if job.attempt >= MAX_ATTEMPTS {
        error!("📦️ Giving up on order {} after {} attempts", job.order_id, job.attempt + 1);
        return;
    }
    job.attempt += 1;
    let delay = Duration::from_secs(u64::from(job.attempt * job.attempt));
    info!("📦️ Retrying order {} in {delay:?} (attempt {})", job.order_id, job.attempt);
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {},
            _ = time::sleep(delay) => pool.submit(job),
        }
    });
}

async fn run_flusher(shared: Arc<PoolShared>, token: CancellationToken) {
    let mut tick = time::interval(FLUSH_TICK);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                shared.flush();
                debug!("📦️ Flusher stopping: cancelled");
                return;
            },
            _ = shared.flush_signal.notified() => shared.flush(),
            _ = tick.tick() => shared.flush(),
        }
    }
}

async fn run_worker(shared: Arc<PoolShared>, token: CancellationToken, id: usize) {
    info!("📦️ Worker {id} started");
    loop {
        let job = {
            let mut rx = shared.egress_rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => {
                    info!("📦️ Worker {id} stopping: cancelled");
                    return;
                },
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => {
                        info!("📦️ Worker {id} stopping: queue closed");
                        return;
                    },
                },
            }
        };
        debug!("📦️ Worker {id} processing order {} (number {}, attempt {})", job.order_id, job.number, job.attempt);
        match (shared.worker_fn)(token.clone(), job.clone()).await {
            Ok(()) => debug!("📦️ Worker {id} finished order {}", job.order_id),
            Err(e) => {
                error!("📦️ Worker {id} failed to process order {}: {e}", job.order_id);
                schedule_retry(Arc::clone(&shared), job, &token);
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU32;

    use tokio::sync::Semaphore;

    use super::*;

    fn job(order_id: i64) -> Job {
        Job {
            order_id,
            user_id: 1,
            number: format!("{order_id}"),
            status: crate::db_types::OrderStatusType::New,
            created_at: chrono::Utc::now(),
            attempt: 0,
        }
    }

    fn counting_worker(counter: Arc<AtomicU32>, result: Result<(), JobError>) -> WorkerFn {
        Arc::new(move |_token, _job| {
            let counter = Arc::clone(&counter);
            let result = result.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                result
            }) as WorkerFuture
        })
    }

    #[tokio::test(start_paused = true)]
    async fn processes_submitted_jobs() {
        let _ = env_logger::try_init();
        let processed = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(2, 3, 10, counting_worker(Arc::clone(&processed), Ok(())));
        let token = CancellationToken::new();
        pool.start(token.clone());

        for i in 0..5 {
            pool.submit(job(i));
        }
        // The periodic tick flushes the below-batch-size remainder.
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert_eq!(pool.buffer_size(), 0);

        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reaching_batch_size_flushes_without_waiting_for_the_tick() {
        let processed = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(2, 3, 10, counting_worker(Arc::clone(&processed), Ok(())));
        let token = CancellationToken::new();
        pool.start(token.clone());

        pool.submit_batch((0..3).map(job).collect());
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processed.load(Ordering::SeqCst), 3);

        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_jobs_are_retried_four_invocations_in_total() {
        let invocations = Arc::new(AtomicU32::new(0));
        let worker_fn = counting_worker(Arc::clone(&invocations), Err(JobError("accrual down".to_string())));
        let pool = WorkerPool::new(1, 1, 10, worker_fn);
        let token = CancellationToken::new();
        pool.start(token.clone());

        pool.submit(job(7));
        // Back-off schedule is 1 s, 4 s, 9 s; leave headroom beyond the 14 s total.
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 4);

        // The job was dropped for good: nothing further happens.
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 4);

        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backoff_is_quadratic() {
        let invocations = Arc::new(AtomicU32::new(0));
        let worker_fn = counting_worker(Arc::clone(&invocations), Err(JobError("nope".to_string())));
        let pool = WorkerPool::new(1, 1, 10, worker_fn);
        let token = CancellationToken::new();
        pool.start(token.clone());

        pool.submit(job(1));
        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1, "first attempt runs immediately");
        time::sleep(Duration::from_millis(1_000)).await; // t ≈ 1.6 s: retry 1 landed at ≈ 1 s
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        time::sleep(Duration::from_secs(4)).await; // t ≈ 5.6 s: retry 2 landed at ≈ 5 s
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        time::sleep(Duration::from_secs(9)).await; // t ≈ 14.6 s: retry 3 landed at ≈ 14 s
        assert_eq!(invocations.load(Ordering::SeqCst), 4);

        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn staging_buffer_never_exceeds_max_buffer() {
        // A gated worker keeps the egress channel full while we overfill staging.
        let gate = Arc::new(Semaphore::new(0));
        let gate2 = Arc::clone(&gate);
        let worker_fn: WorkerFn = Arc::new(move |_token, _job| {
            let gate = Arc::clone(&gate2);
            Box::pin(async move {
                let _permit = gate.acquire().await;
                Ok(())
            }) as WorkerFuture
        });
        let pool = WorkerPool::new(1, 100, 20, worker_fn);
        let token = CancellationToken::new();
        pool.start(token.clone());

        for i in 0..200 {
            pool.submit(job(i));
            assert!(pool.buffer_size() <= 20);
        }

        gate.close();
        token.cancel();
        pool.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_workers_and_flusher() {
        let processed = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::new(3, 10, 100, counting_worker(Arc::clone(&processed), Ok(())));
        let token = CancellationToken::new();
        pool.start(token.clone());

        token.cancel();
        pool.stop().await;

        // Submissions after stop are dropped without panicking.
        pool.submit(job(1));
        pool.submit_batch(vec![job(2), job(3)]);
        assert_eq!(pool.buffer_size(), 0);
        assert_eq!(processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_retry_after_stop_is_a_no_op() {
        let invocations = Arc::new(AtomicU32::new(0));
        let worker_fn = counting_worker(Arc::clone(&invocations), Err(JobError("flaky".to_string())));
        let pool = WorkerPool::new(1, 1, 10, worker_fn);
        let token = CancellationToken::new();
        pool.start(token.clone());

        pool.submit(job(9));
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        // Cancel while the 1 s retry timer is pending: the deferred submit must not fire.
        token.cancel();
        pool.stop().await;
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
