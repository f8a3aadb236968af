//! The producer, generalized from the teacher's `RedisBackend`
//! enqueue/get/remove/stats operations into the waiting/active/delayed
//! key-space.

use std::sync::atomic::{AtomicBool, Ordering};

use redis::AsyncCommands;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{ConnectionOptions, QueueOptions};
use crate::error::{JetError, JetResult};
use crate::events::{EventEmitter, QueueEvent};
use crate::job::{Job, JobId, JobOptions, JobStatus};
use crate::keys::KeySpace;
use crate::{registry, scripts};

pub struct Queue {
    connection: ConnectionOptions,
    options: QueueOptions,
    keys: KeySpace,
    events: EventEmitter,
    ready: AtomicBool,
}

impl Queue {
    /// Obtains a client from the registry and emits `ready`, or raises a
    /// connection-category error.
    pub async fn new(
        name: impl Into<String>,
        connection: ConnectionOptions,
        options: QueueOptions,
    ) -> JetResult<Self> {
        let keys = KeySpace::new(options.prefix.clone(), name.into());
        registry::get(&connection).await?;

        let events = EventEmitter::new();
        events.emit(QueueEvent::Ready);
        info!(queue = %keys.waiting(), "queue ready");

        Ok(Self {
            connection,
            options,
            keys,
            events,
            ready: AtomicBool::new(true),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    async fn conn(&self) -> JetResult<redis::aio::ConnectionManager> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(JetError::NotReady);
        }
        registry::get(&self.connection).await
    }

    /// Uses `options` if given, else `defaultJobOptions`. Assigns a fresh
    /// id and `createdAt`, and writes the job hash plus
    /// its collection membership in one transaction. Fails if the
    /// producer is closed.
    pub async fn add(
        &self,
        name: impl Into<String>,
        data: serde_json::Value,
        options: Option<JobOptions>,
    ) -> JetResult<Job> {
        let mut conn = self.conn().await?;
        let options = options.unwrap_or_else(|| self.options.default_job_options.clone());
        let job = Job::new(name, data, options);
        let serialized = job.to_json().map_err(JetError::MalformedRecord)?;
        let job_key = self.keys.job(job.id);
        let id = job.id.to_string();

        if job.status == JobStatus::Delayed {
            let score = job.created_at + job.options.delay as i64;
            let _: () = redis::pipe()
                .atomic()
                .hset(&job_key, "data", &serialized)
                .ignore()
                .zadd(self.keys.delayed(), &id, score)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(JetError::Connection)?;
        } else {
            let _: () = redis::pipe()
                .atomic()
                .hset(&job_key, "data", &serialized)
                .ignore()
                .lpush(self.keys.waiting(), &id)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(JetError::Connection)?;
        }

        self.events.emit(QueueEvent::Added(job.clone()));
        Ok(job)
    }

    /// Returns `None` on absence, reserving errors for malformed records.
    pub async fn get_job(&self, id: JobId) -> JetResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn
            .hget(self.keys.job(id), "data")
            .await
            .map_err(JetError::Connection)?;

        match data {
            Some(data) => Ok(Some(
                Job::from_json(&data).map_err(JetError::MalformedRecord)?,
            )),
            None => Ok(None),
        }
    }

    /// Removes the id from every collection plus its hash. Idempotent.
    pub async fn remove_job(&self, id: JobId) -> JetResult<()> {
        let mut conn = self.conn().await?;
        scripts::remove_everywhere(
            &mut conn,
            &self.keys.waiting(),
            &self.keys.active(),
            &self.keys.delayed(),
            &self.keys.job(id),
            &id.to_string(),
        )
        .await?;
        self.events.emit(QueueEvent::Removed(id));
        Ok(())
    }

    pub async fn pause(&self) -> JetResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set(self.keys.paused(), 1)
            .await
            .map_err(JetError::Connection)?;
        self.events.emit(QueueEvent::Paused);
        Ok(())
    }

    pub async fn resume(&self) -> JetResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(self.keys.paused())
            .await
            .map_err(JetError::Connection)?;
        self.events.emit(QueueEvent::Resumed);
        Ok(())
    }

    pub async fn is_paused(&self) -> JetResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn
            .exists(self.keys.paused())
            .await
            .map_err(JetError::Connection)?;
        Ok(exists)
    }

    /// Sum of waiting-list length, active-list length, and delayed-set
    /// cardinality observed in one pipelined (non-atomic-across-time)
    /// snapshot.
    pub async fn count(&self) -> JetResult<u64> {
        let mut conn = self.conn().await?;
        let (waiting, active, delayed): (u64, u64, u64) = redis::pipe()
            .llen(self.keys.waiting())
            .llen(self.keys.active())
            .zcard(self.keys.delayed())
            .query_async(&mut conn)
            .await
            .map_err(JetError::Connection)?;
        Ok(waiting + active + delayed)
    }

    /// Marks the producer not-ready and emits `closed`. Does not close
    /// the shared client, which belongs to the registry.
    pub fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.events.emit(QueueEvent::Closed);
    }

    pub(crate) fn keys(&self) -> &KeySpace {
        &self.keys
    }
}

