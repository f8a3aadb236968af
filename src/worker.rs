//! The worker runtime: dispatcher loop, delayed-job promoter loop,
//! bounded parallel execution, retry/backoff, and graceful shutdown.
//! Grounded on the teacher's `tokio::time::timeout` racing and
//! `Semaphore`-bounded concurrency in `worker.rs`, generalized from a
//! per-job-type handler registry down to a single-handler-per-worker
//! model.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{broadcast, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::backoff::backoff_delay_ms;
use crate::config::{ConnectionOptions, WorkerOptions};
use crate::error::{JetError, JetResult};
use crate::events::{CompletedPayload, EventEmitter, QueueEvent};
use crate::job::{Job, JobStatus};
use crate::keys::KeySpace;
use crate::{registry, scripts};

const DISPATCHER_IDLE: Duration = Duration::from_millis(100);
const PROMOTER_TICK: Duration = Duration::from_millis(1000);

/// Result of a handler invocation: the return value on success, or a
/// human-readable failure message.
pub type HandlerResult = Result<serde_json::Value, String>;

/// A handler function boxed for dynamic dispatch; only one handler may
/// be installed per worker — a second `process` call fails.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

struct Loops {
    dispatcher: JoinHandle<()>,
    promoter: JoinHandle<()>,
}

/// Shared state handed to the two background loops and every spawned
/// execution task.
struct Shared {
    connection: ConnectionOptions,
    options: WorkerOptions,
    keys: KeySpace,
    events: EventEmitter,
    running: AtomicBool,
    processed: AtomicU64,
    shutting_down: AtomicBool,
    handler: OnceCell<JobHandler>,
    semaphore: Arc<Semaphore>,
    loops: Mutex<Option<Loops>>,
}

impl Shared {
    /// Counts one more processed (dispatched or promoted) job toward
    /// `maxJobsPerWorker`. The dispatcher and promoter loops count
    /// independently: either alone may trigger shutdown.
    fn bump_and_check_cap(self: &Arc<Self>, count: u64) {
        let total = self.processed.fetch_add(count, Ordering::SeqCst) + count;
        let Some(max) = self.options.max_jobs_per_worker else {
            return;
        };
        if total < max {
            return;
        }
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        let shared = self.clone();
        tokio::spawn(async move {
            let concurrency = shared.options.concurrency.max(1) as u32;
            // Waits for every in-flight job to release its permit before
            // declaring the worker stopped.
            let _permits = shared.semaphore.acquire_many(concurrency).await;
            shared.events.emit(QueueEvent::Completed(CompletedPayload::Summary(format!(
                "worker reached maxJobsPerWorker ({total} jobs processed)"
            ))));
            info!(total, "worker stopping: maxJobsPerWorker reached");
            shared.close().await;
        });
    }

    /// Emits `closed`, briefly quiesces, and joins the dispatcher and
    /// promoter loop handles. Safe to call more than once.
    async fn close(self: &Arc<Self>) {
        self.running.store(false, Ordering::SeqCst);
        self.events.emit(QueueEvent::Closed);
        tokio::time::sleep(Duration::from_millis(50)).await;

        if let Some(loops) = self.loops.lock().await.take() {
            let _ = loops.dispatcher.await;
            let _ = loops.promoter.await;
        }
    }
}

pub struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    /// On construction the worker obtains a client from the registry and
    /// emits `ready`, or `error` then aborts.
    pub async fn new(
        queue_name: impl Into<String>,
        prefix: impl Into<String>,
        connection: ConnectionOptions,
        options: WorkerOptions,
    ) -> JetResult<Self> {
        let keys = KeySpace::new(prefix.into(), queue_name.into());
        let events = EventEmitter::new();

        if let Err(err) = registry::get(&connection).await {
            events.emit(QueueEvent::Error(err.to_string()));
            return Err(err);
        }
        events.emit(QueueEvent::Ready);
        info!(queue = %keys.waiting(), "worker ready");

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

        let shared = Arc::new(Shared {
            connection,
            options,
            keys,
            events,
            running: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            handler: OnceCell::new(),
            semaphore,
            loops: Mutex::new(None),
        });

        Ok(Self { shared })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Installs the handler and starts the dispatcher and promoter
    /// loops. Fails if a handler is already installed.
    pub async fn process<F, Fut>(&self, handler: F) -> JetResult<()>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.shared
            .handler
            .set(boxed)
            .map_err(|_| JetError::DuplicateHandler)?;

        self.start_loops().await
    }

    async fn start_loops(&self) -> JetResult<()> {
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.shutting_down.store(false, Ordering::SeqCst);

        let conn = registry::get(&self.shared.connection).await?;

        let dispatcher = tokio::spawn(dispatcher_loop(self.shared.clone(), conn.clone()));
        let promoter = tokio::spawn(promoter_loop(self.shared.clone(), conn));

        *self.shared.loops.lock().await = Some(Loops {
            dispatcher,
            promoter,
        });
        Ok(())
    }

    /// Clears `isRunning` and emits `paused`. In-flight jobs continue to
    /// completion; this only stops new dispatch by this worker instance.
    pub fn pause(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.events.emit(QueueEvent::Paused);
    }

    /// If not running, sets `isRunning`, emits `resumed`, and restarts
    /// the dispatcher and promoter loops.
    pub async fn resume(&self) -> JetResult<()> {
        if self.shared.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.events.emit(QueueEvent::Resumed);
        self.start_loops().await
    }

    /// Clears `isRunning`, emits `closed`, briefly quiesces, and lets
    /// the loops exit. Safe to call multiple times. The shared registry
    /// client is left open — it may still back other `Queue`/`Worker`
    /// instances in this process; only the registry's `close_all` tears
    /// it down.
    pub async fn close(&self) {
        self.shared.close().await;
    }
}

async fn is_paused(conn: &mut ConnectionManager, keys: &KeySpace) -> JetResult<bool> {
    let exists: bool = conn
        .exists(keys.paused())
        .await
        .map_err(JetError::Connection)?;
    Ok(exists)
}

async fn dispatcher_loop(shared: Arc<Shared>, mut conn: ConnectionManager) {
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        let permit = match shared.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        match is_paused(&mut conn, &shared.keys).await {
            Ok(true) => {
                drop(permit);
                tokio::time::sleep(DISPATCHER_IDLE).await;
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                drop(permit);
                shared.events.emit(QueueEvent::Error(err.to_string()));
                tokio::time::sleep(DISPATCHER_IDLE).await;
                continue;
            }
        }

        let now_ms = Utc::now().timestamp_millis();
        let popped = scripts::move_to_active(
            &mut conn,
            &shared.keys.waiting(),
            &shared.keys.active(),
            &shared.keys.job_prefix(),
            now_ms,
        )
        .await;

        match popped {
            Ok(Some(id)) => {
                shared.bump_and_check_cap(1);
                let shared = shared.clone();
                let conn = conn.clone();
                tokio::spawn(async move {
                    execute_job(shared, conn, id, permit).await;
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::time::sleep(DISPATCHER_IDLE).await;
            }
            Err(err) => {
                drop(permit);
                error!(error = %err, "dispatcher failed to move job to active");
                shared.events.emit(QueueEvent::Error(err.to_string()));
                tokio::time::sleep(DISPATCHER_IDLE).await;
            }
        }
    }
}

async fn promoter_loop(shared: Arc<Shared>, mut conn: ConnectionManager) {
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        let now_ms = Utc::now().timestamp_millis();
        match scripts::promote_delayed(&mut conn, &shared.keys.delayed(), &shared.keys.waiting(), now_ms).await {
            Ok(ids) if !ids.is_empty() => {
                debug!(count = ids.len(), "promoted delayed jobs to waiting");
                shared.bump_and_check_cap(ids.len() as u64);
            }
            Ok(_) => {}
            Err(err) => {
                shared.events.emit(QueueEvent::Error(err.to_string()));
                tokio::time::sleep(PROMOTER_TICK).await;
                continue;
            }
        }

        tokio::time::sleep(PROMOTER_TICK).await;
    }
}

/// One job's full execution: invoke the handler (racing an optional
/// timeout) and persist the success or failure outcome.
async fn execute_job(
    shared: Arc<Shared>,
    mut conn: ConnectionManager,
    id: String,
    _permit: OwnedSemaphorePermit,
) {
    let Ok(job_id) = Uuid::parse_str(&id) else {
        shared
            .events
            .emit(QueueEvent::Error(format!("corrupted job id: {id}")));
        return;
    };
    let job_key = shared.keys.job(job_id);

    let data: Option<String> = match conn.hget(&job_key, "data").await {
        Ok(data) => data,
        Err(err) => {
            shared.events.emit(QueueEvent::Error(err.to_string()));
            return;
        }
    };

    // The id was removed while in flight; drop it silently.
    let Some(data) = data else {
        return;
    };

    let mut job = match Job::from_json(&data) {
        Ok(job) => job,
        Err(err) => {
            shared.events.emit(QueueEvent::Error(err.to_string()));
            return;
        }
    };

    job.status = JobStatus::Active;
    shared.events.emit(QueueEvent::Processing(job.clone()));

    let Some(handler) = shared.handler.get().cloned() else {
        shared
            .events
            .emit(QueueEvent::Error("no handler installed".to_string()));
        return;
    };

    let timeout_ms = job.options.timeout;
    let invocation = handler(job.clone());
    let outcome = if timeout_ms > 0 {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), invocation).await {
            Ok(result) => result,
            Err(_) => Err("Job timeout".to_string()),
        }
    } else {
        invocation.await
    };

    match outcome {
        Ok(return_value) => complete_success(&shared, &mut conn, job, return_value).await,
        Err(message) => complete_failure(&shared, &mut conn, job, message).await,
    }
}

async fn complete_success(
    shared: &Arc<Shared>,
    conn: &mut ConnectionManager,
    mut job: Job,
    return_value: serde_json::Value,
) {
    job.status = JobStatus::Completed;
    job.return_value = Some(return_value);

    let active_key = shared.keys.active();
    let job_key = shared.keys.job(job.id);
    let id = job.id.to_string();

    let result = if job.options.remove_on_complete {
        redis::pipe()
            .atomic()
            .lrem(&active_key, 0, &id)
            .ignore()
            .del(&job_key)
            .ignore()
            .query_async(conn)
            .await
    } else {
        let serialized = match job.to_json() {
            Ok(data) => data,
            Err(err) => {
                shared.events.emit(QueueEvent::Error(err.to_string()));
                return;
            }
        };
        redis::pipe()
            .atomic()
            .lrem(&active_key, 0, &id)
            .ignore()
            .hset(&job_key, "data", serialized)
            .ignore()
            .query_async(conn)
            .await
    };

    if let Err(err) = result.map_err(JetError::Connection) {
        shared.events.emit(QueueEvent::Error(err.to_string()));
        return;
    }

    shared
        .events
        .emit(QueueEvent::Completed(CompletedPayload::Job(job)));
}

async fn complete_failure(
    shared: &Arc<Shared>,
    conn: &mut ConnectionManager,
    mut job: Job,
    message: String,
) {
    job.attempts_made += 1;
    job.stack_trace.push(message.clone());
    job.failed_reason = Some(message.clone());

    let active_key = shared.keys.active();
    let job_key = shared.keys.job(job.id);
    let id = job.id.to_string();

    if job.attempts_made < job.options.attempts {
        job.status = JobStatus::Delayed;
        let delay_ms = backoff_delay_ms(job.attempts_made, &job.options.backoff);
        let score = Utc::now().timestamp_millis() + delay_ms as i64;

        let serialized = match job.to_json() {
            Ok(data) => data,
            Err(err) => {
                shared.events.emit(QueueEvent::Error(err.to_string()));
                return;
            }
        };

        let result = redis::pipe()
            .atomic()
            .zadd(shared.keys.delayed(), &id, score)
            .ignore()
            .hset(&job_key, "data", serialized)
            .ignore()
            .lrem(&active_key, 0, &id)
            .ignore()
            .query_async(conn)
            .await
            .map_err(JetError::Connection);

        if let Err(err) = result {
            shared.events.emit(QueueEvent::Error(err.to_string()));
            return;
        }

        shared
            .events
            .emit(QueueEvent::Failed(job.clone(), message));
        shared.events.emit(QueueEvent::Retrying(job));
    } else {
        job.status = JobStatus::Failed;

        let result = if job.options.remove_on_fail {
            redis::pipe()
                .atomic()
                .lrem(&active_key, 0, &id)
                .ignore()
                .del(&job_key)
                .ignore()
                .query_async(conn)
                .await
        } else {
            let serialized = match job.to_json() {
                Ok(data) => data,
                Err(err) => {
                    shared.events.emit(QueueEvent::Error(err.to_string()));
                    return;
                }
            };
            redis::pipe()
                .atomic()
                .lrem(&active_key, 0, &id)
                .ignore()
                .hset(&job_key, "data", serialized)
                .ignore()
                .query_async(conn)
                .await
        };

        if let Err(err) = result.map_err(JetError::Connection) {
            shared.events.emit(QueueEvent::Error(err.to_string()));
            return;
        }

        shared.events.emit(QueueEvent::Failed(job, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueOptions, WorkerOptionsBuilder};

    #[test]
    fn worker_options_default_concurrency_is_one() {
        let options = WorkerOptions::default();
        assert_eq!(options.concurrency, 1);
        assert!(options.max_jobs_per_worker.is_none());
    }

    #[test]
    fn worker_options_builder_sets_cap() {
        let options = WorkerOptionsBuilder::new()
            .max_jobs_per_worker(Some(10))
            .build()
            .expect("failed to build config");
        assert_eq!(*options.get_max_jobs_per_worker(), Some(10));
    }

    #[test]
    fn queue_options_default_prefix_is_jet() {
        assert_eq!(QueueOptions::default().prefix, "jet");
    }
}
